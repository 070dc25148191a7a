//! Shared fixtures for integration tests.
#![allow(dead_code)]

use ai_relay::config::{ApiStyle, ModelConfig, ProviderConfig};
use ai_relay::{
    Candidate, CandidateExecutor, ErrorClassification, Outcome, RelayConfig, UsageRecord,
};
use ai_relay::client::ExecuteOptions;
use async_trait::async_trait;
use mockito::{Server, ServerGuard};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Executor that replays scripted outcomes per model and records every call.
#[derive(Default)]
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<String, VecDeque<Outcome>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, model: &str, outcome: Outcome) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(model.to_string())
            .or_default()
            .push_back(outcome);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CandidateExecutor for ScriptedExecutor {
    async fn execute(&self, candidate: &Candidate, _prompt: &str, _options: &ExecuteOptions) -> Outcome {
        self.calls.lock().unwrap().push(candidate.model_id.clone());
        self.scripts
            .lock()
            .unwrap()
            .get_mut(&candidate.model_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Outcome::failure(ErrorClassification::Unknown, "unscripted call"))
    }
}

pub fn success(text: &str) -> Outcome {
    Outcome::Success {
        text: text.to_string(),
        usage: UsageRecord::new(10, 5, 42),
        generation_time_ms: 42,
    }
}

pub fn quota(message: &str) -> Outcome {
    Outcome::failure(ErrorClassification::Quota, message)
}

/// Two hosted providers and one local one, all with zero base delay so
/// tests never sleep on pacing.
pub fn three_provider_config(base_url: &str) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.defaults.default_delay_ms = 0;
    config.providers.insert(
        "alpha".into(),
        ProviderConfig::new(ApiStyle::OpenAiCompatible, base_url)
            .with_models(["alpha-1", "alpha-2"])
            .with_api_key_env("AI_RELAY_TEST_ALPHA_KEY"),
    );
    config.providers.insert(
        "beta".into(),
        ProviderConfig::new(ApiStyle::AnthropicMessages, base_url)
            .with_models(["beta-1"])
            .with_api_key_env("AI_RELAY_TEST_BETA_KEY"),
    );
    config.providers.insert(
        "local".into(),
        ProviderConfig::new(ApiStyle::OllamaChat, base_url)
            .with_models(["local-1"])
            .local(),
    );
    config.provider_priority = vec!["alpha".into(), "beta".into(), "local".into()];
    for model in ["alpha-1", "alpha-2", "beta-1", "local-1"] {
        config
            .models
            .insert(model.to_string(), ModelConfig::default().with_base_delay_ms(0));
    }
    config
}

/// Mock HTTP server shared by one test.
pub struct MockServerFixture {
    pub server: ServerGuard,
    pub base_url: String,
}

impl MockServerFixture {
    pub async fn new() -> Self {
        let server = Server::new_async().await;
        let base_url = server.url();
        Self { server, base_url }
    }
}
