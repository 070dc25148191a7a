//! Relay configuration: providers, models, pacing constants.
//!
//! Configuration is plain YAML (or built in code) and is immutable once the
//! relay is constructed. Everything the scheduler treats as an empirical
//! constant (backoff multiplier, delay cap, success streak threshold) lives in
//! [`Defaults`] so it can be tuned without code changes.
//!
//! ```yaml
//! defaults:
//!   default_delay_ms: 1000
//!   backoff_multiplier: 2
//!   max_delay_multiplier: 5
//! provider_priority: [gemini, openai]
//! providers:
//!   gemini:
//!     api_style: gemini_generate
//!     base_url: https://generativelanguage.googleapis.com
//!     models: [gemini-2.0-flash, gemini-2.0-flash-lite]
//! models:
//!   gemini-2.0-flash:
//!     requests_per_minute: 15
//! ```

mod defaults;

use crate::tokens::ModelPricing;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Env var holding the path of a YAML configuration file.
pub const CONFIG_PATH_ENV: &str = "AI_RELAY_CONFIG";

/// Wire format family a provider speaks. Selects the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiStyle {
    /// OpenAI chat completions format (also Mistral, Groq, DeepSeek, ...)
    #[serde(rename = "openai_compatible")]
    OpenAiCompatible,
    /// Anthropic messages format (block-based content)
    AnthropicMessages,
    /// Google Gemini generateContent format
    GeminiGenerate,
    /// Ollama `/api/chat`, usually self-hosted
    OllamaChat,
}

impl std::fmt::Display for ApiStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAiCompatible => write!(f, "openai_compatible"),
            Self::AnthropicMessages => write!(f, "anthropic_messages"),
            Self::GeminiGenerate => write!(f, "gemini_generate"),
            Self::OllamaChat => write!(f, "ollama_chat"),
        }
    }
}

/// Global pacing and timeout constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    /// Delay used for models with no configuration at all.
    pub default_delay_ms: u64,
    /// Assumed generation time per item, used by time estimates.
    pub generation_estimate_ms: u64,
    /// Consecutive successes needed before the delay moves back toward base.
    pub success_streak_threshold: u32,
    /// Factor applied to the current delay on a quota error.
    pub backoff_multiplier: u64,
    /// Cap on adaptation, as a multiple of the base delay.
    pub max_delay_multiplier: u64,
    /// Per-attempt timeout for hosted APIs.
    pub timeout_secs: u64,
    /// Per-attempt timeout for local/self-hosted models.
    pub local_timeout_secs: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            default_delay_ms: 1000,
            generation_estimate_ms: 2000,
            success_streak_threshold: 3,
            backoff_multiplier: 2,
            max_delay_multiplier: 5,
            timeout_secs: 30,
            local_timeout_secs: 120,
        }
    }
}

/// One provider: how to reach it and which models it serves, in priority order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_style: ApiStyle,
    pub base_url: String,
    #[serde(default)]
    pub models: Vec<String>,
    /// Env var holding the API key. Defaults to `<PROVIDER_ID>_API_KEY`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Self-hosted providers need no credential and get the longer timeout.
    #[serde(default)]
    pub local: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl ProviderConfig {
    pub fn new(api_style: ApiStyle, base_url: impl Into<String>) -> Self {
        Self {
            api_style,
            base_url: base_url.into(),
            models: Vec::new(),
            api_key_env: None,
            local: false,
            timeout_secs: None,
        }
    }

    pub fn with_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.models = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_api_key_env(mut self, name: impl Into<String>) -> Self {
        self.api_key_env = Some(name.into());
        self
    }

    pub fn local(mut self) -> Self {
        self.local = true;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

/// Per-model pacing and pricing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_per_minute: Option<u32>,
    #[serde(default)]
    pub input_cost_per_1k: f64,
    #[serde(default)]
    pub output_cost_per_1k: f64,
}

impl ModelConfig {
    pub fn with_base_delay_ms(mut self, ms: u64) -> Self {
        self.base_delay_ms = Some(ms);
        self
    }

    pub fn with_requests_per_minute(mut self, rpm: u32) -> Self {
        self.requests_per_minute = Some(rpm);
        self
    }

    pub fn with_costs(mut self, input_per_1k: f64, output_per_1k: f64) -> Self {
        self.input_cost_per_1k = input_per_1k;
        self.output_cost_per_1k = output_per_1k;
        self
    }

    /// Explicit base delay wins; otherwise spacing derived from the RPM budget.
    pub fn base_delay_ms(&self) -> Option<u64> {
        self.base_delay_ms.or_else(|| {
            self.requests_per_minute
                .filter(|rpm| *rpm > 0)
                .map(|rpm| 60_000u64.div_ceil(rpm as u64))
        })
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
    #[serde(default)]
    pub models: HashMap<String, ModelConfig>,
    /// Order in which other providers are tried after the selected one.
    #[serde(default)]
    pub provider_priority: Vec<String>,
}

impl RelayConfig {
    /// Built-in provider table (Gemini, OpenAI, Mistral, Anthropic, local Ollama).
    pub fn builtin() -> Self {
        defaults::builtin()
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: RelayConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration_with_context(
                format!("cannot read config file: {}", e),
                ErrorContext::new()
                    .with_details(path.display().to_string())
                    .with_source("config_loader"),
            )
        })?;
        debug!(path = %path.display(), "loading relay config");
        Self::from_yaml_str(&raw)
    }

    /// Load from `AI_RELAY_CONFIG` when set, else the built-in table, then
    /// apply env overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = match env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::load(path)?,
            _ => Self::builtin(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        fn env_u64(name: &str) -> Option<u64> {
            env::var(name).ok().and_then(|s| s.trim().parse::<u64>().ok())
        }
        if let Some(v) = env_u64("AI_RELAY_TIMEOUT_SECS") {
            self.defaults.timeout_secs = v;
        }
        if let Some(v) = env_u64("AI_RELAY_LOCAL_TIMEOUT_SECS") {
            self.defaults.local_timeout_secs = v;
        }
        if let Some(v) = env_u64("AI_RELAY_DEFAULT_DELAY_MS") {
            self.defaults.default_delay_ms = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let d = &self.defaults;
        let checks: [(&str, bool); 4] = [
            ("defaults.backoff_multiplier", d.backoff_multiplier >= 1),
            ("defaults.max_delay_multiplier", d.max_delay_multiplier >= 1),
            ("defaults.success_streak_threshold", d.success_streak_threshold >= 1),
            ("defaults.timeout_secs", d.timeout_secs >= 1 && d.local_timeout_secs >= 1),
        ];
        for (field, ok) in checks {
            if !ok {
                return Err(Error::configuration_with_context(
                    "value must be at least 1",
                    ErrorContext::new()
                        .with_field_path(field)
                        .with_source("config_validator"),
                ));
            }
        }

        for (id, provider) in &self.providers {
            if let Err(e) = url::Url::parse(&provider.base_url) {
                return Err(Error::configuration_with_context(
                    format!("invalid base_url: {}", e),
                    ErrorContext::new()
                        .with_field_path(format!("providers.{}.base_url", id))
                        .with_source("config_validator"),
                ));
            }
        }

        for id in &self.provider_priority {
            if !self.providers.contains_key(id) {
                return Err(Error::configuration_with_context(
                    format!("unknown provider '{}'", id),
                    ErrorContext::new()
                        .with_field_path("provider_priority")
                        .with_source("config_validator"),
                ));
            }
        }
        Ok(())
    }

    pub fn provider(&self, id: &str) -> Option<&ProviderConfig> {
        self.providers.get(id)
    }

    /// Provider serving `model`. Prioritized providers are searched first.
    pub fn provider_of(&self, model: &str) -> Option<&str> {
        self.provider_order()
            .into_iter()
            .find(|id| {
                self.providers
                    .get(*id)
                    .is_some_and(|p| p.models.iter().any(|m| m == model))
            })
    }

    /// `provider_priority` first, then any remaining providers in name order.
    pub fn provider_order(&self) -> Vec<&str> {
        let mut order: Vec<&str> = self.provider_priority.iter().map(String::as_str).collect();
        for id in self.providers.keys() {
            if !order.contains(&id.as_str()) {
                order.push(id);
            }
        }
        order
    }

    /// Configured base delay for a model, `None` when the model is unknown.
    pub fn configured_base_delay_ms(&self, model: &str) -> Option<u64> {
        self.models.get(model).and_then(ModelConfig::base_delay_ms)
    }

    pub fn base_delay_ms(&self, model: &str) -> u64 {
        self.configured_base_delay_ms(model)
            .unwrap_or(self.defaults.default_delay_ms)
    }

    pub fn timeout_for(&self, provider_id: &str) -> Duration {
        let secs = match self.providers.get(provider_id) {
            Some(p) => p.timeout_secs.unwrap_or(if p.local {
                self.defaults.local_timeout_secs
            } else {
                self.defaults.timeout_secs
            }),
            None => self.defaults.timeout_secs,
        };
        Duration::from_secs(secs)
    }

    pub fn pricing_for(&self, model: &str) -> Option<ModelPricing> {
        self.models
            .get(model)
            .map(|m| ModelPricing::new(model, m.input_cost_per_1k, m.output_cost_per_1k))
    }
}
