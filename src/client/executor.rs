//! Single-attempt execution against one candidate.
//!
//! No retry or fallback happens here; the orchestrator owns the policy loop.

use super::types::{Candidate, ExecuteOptions, Outcome};
use crate::config::RelayConfig;
use crate::drivers::{create_adapter, ProviderAdapter};
use crate::error_code::ErrorClassification;
use crate::resilience::extract_retry_after;
use crate::tokens::{CharacterEstimator, ModelPricing, SessionUsage, TokenCounter, UsageRecord};
use crate::transport::{CredentialSource, HttpResponse, HttpTransport, TransportError};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

static REASONING_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<think>.*?</think>|<thinking>.*?</thinking>|<reasoning>.*?</reasoning>")
        .expect("reasoning block regex")
});

/// Seam between the orchestrator and the network.
#[async_trait]
pub trait CandidateExecutor: Send + Sync {
    /// Perform exactly one call. Never returns an error: every failure is an
    /// [`Outcome::Failure`] with a classification.
    async fn execute(&self, candidate: &Candidate, prompt: &str, options: &ExecuteOptions)
        -> Outcome;
}

/// HTTP-backed executor: adapter lookup, timeout/cancel race, classification
/// and usage accounting.
pub struct RequestExecutor {
    config: Arc<RelayConfig>,
    adapters: HashMap<String, Box<dyn ProviderAdapter>>,
    transport: HttpTransport,
    credentials: Arc<dyn CredentialSource>,
    usage: Arc<SessionUsage>,
    counter: Box<dyn TokenCounter>,
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("adapters", &self.adapters.keys().collect::<Vec<_>>())
            .field("transport", &self.transport)
            .finish()
    }
}

impl RequestExecutor {
    pub fn new(
        config: Arc<RelayConfig>,
        transport: HttpTransport,
        credentials: Arc<dyn CredentialSource>,
        usage: Arc<SessionUsage>,
    ) -> Self {
        let adapters = config
            .providers
            .iter()
            .map(|(id, provider)| (id.clone(), create_adapter(id, provider)))
            .collect();
        Self {
            config,
            adapters,
            transport,
            credentials,
            usage,
            counter: Box::new(CharacterEstimator::new()),
        }
    }

    /// Replace the estimator used when a vendor omits usage counters.
    pub fn with_token_counter(mut self, counter: Box<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    pub fn usage(&self) -> &Arc<SessionUsage> {
        &self.usage
    }

    fn on_failure(&self, adapter: &dyn ProviderAdapter, response: &HttpResponse) -> Outcome {
        let classification = adapter.classify_failure(response.status, &response.body);
        let mut message = adapter.failure_message(response.status, &response.body);
        // Surface a Retry-After header in the wording the tracker understands.
        if classification == ErrorClassification::Quota && extract_retry_after(&message).is_none() {
            if let Some(secs) = response
                .headers
                .get("retry-after")
                .and_then(|v| v.trim().parse::<f64>().ok())
            {
                message = format!("{} (retry in {}s)", message, secs);
            }
        }
        Outcome::failure(classification, message)
    }

    fn on_success(
        &self,
        candidate: &Candidate,
        adapter: &dyn ProviderAdapter,
        prompt: &str,
        response: &HttpResponse,
        generation_time_ms: u64,
    ) -> Outcome {
        let body: serde_json::Value = match serde_json::from_str(&response.body) {
            Ok(v) => v,
            Err(e) => {
                return Outcome::failure(
                    ErrorClassification::Unknown,
                    format!("response is not JSON: {}", e),
                )
            }
        };
        let parsed = match adapter.parse_response(&body) {
            Ok(p) => p,
            Err(e) => return Outcome::failure(ErrorClassification::Unknown, e.to_string()),
        };

        let text = strip_reasoning(&parsed.text);
        if text.is_empty() {
            return Outcome::failure(
                ErrorClassification::EmptyResponse,
                "provider returned no text",
            );
        }

        let usage = UsageRecord::new(
            parsed.tokens_in.unwrap_or_else(|| self.counter.count(prompt)),
            parsed.tokens_out.unwrap_or_else(|| self.counter.count(&text)),
            generation_time_ms,
        );
        let pricing = self
            .config
            .pricing_for(&candidate.model_id)
            .unwrap_or_else(|| ModelPricing::free(&candidate.model_id));
        let cost = self.usage.record(&usage, &pricing);
        debug!(
            model = %candidate.model_id,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            cost = %cost.format(),
            "usage recorded"
        );

        Outcome::Success {
            text,
            usage,
            generation_time_ms,
        }
    }
}

#[async_trait]
impl CandidateExecutor for RequestExecutor {
    async fn execute(
        &self,
        candidate: &Candidate,
        prompt: &str,
        options: &ExecuteOptions,
    ) -> Outcome {
        let (Some(adapter), Some(provider)) = (
            self.adapters.get(&candidate.provider_id),
            self.config.provider(&candidate.provider_id),
        ) else {
            return Outcome::failure(
                ErrorClassification::Unknown,
                format!("no adapter for provider {}", candidate.provider_id),
            );
        };

        let api_key = self.credentials.api_key(&candidate.provider_id, provider);
        let request = adapter.build_request(&candidate.model_id, prompt, api_key.as_deref());
        let request_id = Uuid::new_v4().to_string();
        let cancel = options.cancel.clone().unwrap_or_else(CancellationToken::new);

        debug!(
            model = %candidate.model_id,
            provider = %candidate.provider_id,
            request_id = %request_id,
            timeout_ms = options.timeout.as_millis() as u64,
            "dispatching"
        );
        let start = Instant::now();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Outcome::failure(ErrorClassification::Cancelled, "cancelled by caller");
            }
            _ = tokio::time::sleep(options.timeout) => {
                return Outcome::failure(
                    ErrorClassification::Timeout,
                    format!("no response within {} ms", options.timeout.as_millis()),
                );
            }
            r = self.transport.send(&request, &request_id) => r,
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        let outcome = match result {
            Err(TransportError::Http(e)) if e.is_timeout() => {
                Outcome::failure(ErrorClassification::Timeout, e.to_string())
            }
            Err(e) => Outcome::failure(ErrorClassification::Unknown, format!("network error: {}", e)),
            Ok(response) if response.is_success() => {
                self.on_success(candidate, adapter.as_ref(), prompt, &response, duration_ms)
            }
            Ok(response) => self.on_failure(adapter.as_ref(), &response),
        };

        match &outcome {
            Outcome::Success { .. } => info!(
                model = %candidate.model_id,
                request_id = %request_id,
                duration_ms,
                "generation succeeded"
            ),
            Outcome::Failure {
                classification,
                message,
            } => warn!(
                model = %candidate.model_id,
                request_id = %request_id,
                classification = %classification,
                duration_ms,
                detail = %message,
                "attempt failed"
            ),
        }
        outcome
    }
}

/// Remove `<think>`, `<thinking>` and `<reasoning>` blocks and trim.
///
/// Some models drop the opening tag; anything before a stray closing
/// `</think>` is treated as reasoning too.
pub fn strip_reasoning(text: &str) -> String {
    let stripped = REASONING_BLOCK.replace_all(text, "");
    let visible = match stripped.rfind("</think>") {
        Some(idx) => &stripped[idx + "</think>".len()..],
        None => &stripped[..],
    };
    visible.trim().to_string()
}
