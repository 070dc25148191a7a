//! Provider adapters: one per vendor API style.
//!
//! An adapter is a pure mapping between the relay's `(model, prompt)` call
//! shape and a vendor wire format. It never performs I/O; the executor owns
//! transport, timing and cancellation.
//!
//! | Style | Adapter | Endpoint |
//! |-------|---------|----------|
//! | `openai_compatible` | [`OpenAiAdapter`] | `POST {base}/v1/chat/completions` |
//! | `anthropic_messages` | [`AnthropicAdapter`] | `POST {base}/v1/messages` |
//! | `gemini_generate` | [`GeminiAdapter`] | `POST {base}/v1beta/models/{model}:generateContent` |
//! | `ollama_chat` | [`OllamaAdapter`] | `POST {base}/api/chat` |

pub mod anthropic;
pub mod gemini;
pub mod ollama;

use crate::config::{ApiStyle, ProviderConfig};
use crate::error_code::ErrorClassification;
use crate::{Error, ErrorContext, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;

pub use anthropic::AnthropicAdapter;
pub use gemini::GeminiAdapter;
pub use ollama::OllamaAdapter;

/// Longest slice of a raw failure body kept as a failure message.
const MAX_FAILURE_MESSAGE_CHARS: usize = 500;

/// Provider-agnostic HTTP request descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterRequest {
    pub url: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub body: Value,
}

/// Text and token counters extracted from a successful response.
///
/// Counters are `None` when the vendor omitted them; the executor fills the
/// gap with a character-based estimate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCompletion {
    pub text: String,
    pub tokens_in: Option<u64>,
    pub tokens_out: Option<u64>,
}

/// Core trait for vendor API adapters.
///
/// Implementations map the relay's single-prompt call into the vendor's
/// wire format and classify vendor failures into [`ErrorClassification`].
/// Classification happens here so that everything downstream matches on the
/// closed enum only.
pub trait ProviderAdapter: Send + Sync + Debug {
    /// Provider identifier (e.g., "openai", "mistral").
    fn provider_id(&self) -> &str;

    fn api_style(&self) -> ApiStyle;

    /// Build the request for one prompt. `api_key` is `None` for providers
    /// that need no credential.
    fn build_request(&self, model: &str, prompt: &str, api_key: Option<&str>) -> AdapterRequest;

    /// Extract text and token counters from a 2xx response body.
    fn parse_response(&self, body: &Value) -> Result<ParsedCompletion>;

    /// Map a non-2xx status and its body into the closed taxonomy.
    fn classify_failure(&self, status: u16, body: &str) -> ErrorClassification {
        let payload = ErrorPayload::parse(body);
        if payload.mentions_quota() {
            return ErrorClassification::Quota;
        }
        match ErrorClassification::from_http_status(status) {
            ErrorClassification::Unknown if payload.mentions_not_found() => {
                ErrorClassification::NotFound
            }
            other => other,
        }
    }

    /// Human-readable message for a failure, preferring the vendor's own
    /// `error.message` over the raw body.
    fn failure_message(&self, status: u16, body: &str) -> String {
        if let Some(message) = ErrorPayload::parse(body).message {
            return message;
        }
        let trimmed = body.trim();
        if trimmed.is_empty() {
            format!("HTTP {}", status)
        } else {
            trimmed.chars().take(MAX_FAILURE_MESSAGE_CHARS).collect()
        }
    }
}

/// Fields common to vendor error bodies.
///
/// Covers `{"error": {"message", "type", "code", "status"}}` (OpenAI,
/// Anthropic, Gemini) and `{"error": "..."}` (Ollama).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorPayload {
    pub message: Option<String>,
    /// Machine-readable code such as `insufficient_quota`.
    pub code: Option<String>,
    /// Error type or status such as `rate_limit_error` or `RESOURCE_EXHAUSTED`.
    pub kind: Option<String>,
}

impl ErrorPayload {
    pub fn parse(body: &str) -> Self {
        let Ok(value) = serde_json::from_str::<Value>(body) else {
            return Self::default();
        };
        match value.get("error") {
            Some(Value::String(message)) => Self {
                message: Some(message.clone()),
                ..Self::default()
            },
            Some(err @ Value::Object(_)) => Self {
                message: err["message"].as_str().map(String::from),
                code: err["code"].as_str().map(String::from),
                kind: err["type"]
                    .as_str()
                    .or_else(|| err["status"].as_str())
                    .map(String::from),
            },
            _ => Self {
                message: value["message"].as_str().map(String::from),
                ..Self::default()
            },
        }
    }

    fn markers(&self) -> impl Iterator<Item = String> + '_ {
        [&self.code, &self.kind, &self.message]
            .into_iter()
            .flatten()
            .map(|s| s.to_ascii_lowercase())
    }

    pub fn mentions_quota(&self) -> bool {
        self.markers().any(|m| {
            m.contains("insufficient_quota")
                || m.contains("rate_limit")
                || m.contains("resource_exhausted")
                || m.contains("quota")
        })
    }

    pub fn mentions_not_found(&self) -> bool {
        self.markers()
            .any(|m| m.contains("not found") || m.contains("not_found"))
    }
}

pub(crate) fn malformed_response(provider_id: &str, details: impl Into<String>) -> Error {
    Error::configuration_with_context(
        "unexpected response shape",
        ErrorContext::new()
            .with_details(details)
            .with_source(provider_id.to_string()),
    )
}

/// OpenAI-compatible chat completions adapter.
///
/// Used for OpenAI itself and the many vendors that mirror its API
/// (Mistral, DeepSeek, Groq, ...).
#[derive(Debug, Clone)]
pub struct OpenAiAdapter {
    provider_id: String,
    base_url: String,
}

impl OpenAiAdapter {
    pub fn new(provider_id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            base_url: base_url.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
}

impl ProviderAdapter for OpenAiAdapter {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn api_style(&self) -> ApiStyle {
        ApiStyle::OpenAiCompatible
    }

    fn build_request(&self, model: &str, prompt: &str, api_key: Option<&str>) -> AdapterRequest {
        let mut headers = HashMap::new();
        if let Some(key) = api_key {
            headers.insert("Authorization".to_string(), format!("Bearer {}", key));
        }
        AdapterRequest {
            url: join_url(&self.base_url, "/v1/chat/completions"),
            method: "POST".into(),
            headers,
            body: serde_json::json!({
                "model": model,
                "messages": [{"role": "user", "content": prompt}],
                "temperature": 0.7,
            }),
        }
    }

    fn parse_response(&self, body: &Value) -> Result<ParsedCompletion> {
        let completion: ChatCompletion = serde_json::from_value(body.clone())
            .map_err(|e| malformed_response(&self.provider_id, e.to_string()))?;
        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        let (tokens_in, tokens_out) = completion
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((None, None));
        Ok(ParsedCompletion {
            text,
            tokens_in,
            tokens_out,
        })
    }

    fn classify_failure(&self, status: u16, body: &str) -> ErrorClassification {
        let payload = ErrorPayload::parse(body);
        match payload.code.as_deref() {
            Some("insufficient_quota") | Some("rate_limit_exceeded") => {
                return ErrorClassification::Quota
            }
            Some("invalid_api_key") => return ErrorClassification::Auth,
            Some("model_not_found") => return ErrorClassification::NotFound,
            _ => {}
        }
        match status {
            401 | 403 => ErrorClassification::Auth,
            429 => ErrorClassification::Quota,
            404 => ErrorClassification::NotFound,
            _ if payload.mentions_quota() => ErrorClassification::Quota,
            _ if payload.mentions_not_found() => ErrorClassification::NotFound,
            _ => ErrorClassification::from_http_status(status),
        }
    }
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

/// Create the adapter for a configured provider.
pub fn create_adapter(provider_id: &str, provider: &ProviderConfig) -> Box<dyn ProviderAdapter> {
    let base = provider.base_url.as_str();
    match provider.api_style {
        ApiStyle::OpenAiCompatible => Box::new(OpenAiAdapter::new(provider_id, base)),
        ApiStyle::AnthropicMessages => Box::new(AnthropicAdapter::new(provider_id, base)),
        ApiStyle::GeminiGenerate => Box::new(GeminiAdapter::new(provider_id, base)),
        ApiStyle::OllamaChat => Box::new(OllamaAdapter::new(provider_id, base)),
    }
}
