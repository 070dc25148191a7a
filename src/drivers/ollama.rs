//! Ollama `/api/chat` adapter for self-hosted models.

use super::{join_url, malformed_response, AdapterRequest, ErrorPayload, ParsedCompletion, ProviderAdapter};
use crate::config::ApiStyle;
use crate::error_code::ErrorClassification;
use crate::Result;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct OllamaAdapter {
    provider_id: String,
    base_url: String,
}

impl OllamaAdapter {
    pub fn new(provider_id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            base_url: base_url.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
    prompt_eval_count: Option<u64>,
    eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

impl ProviderAdapter for OllamaAdapter {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn api_style(&self) -> ApiStyle {
        ApiStyle::OllamaChat
    }

    fn build_request(&self, model: &str, prompt: &str, api_key: Option<&str>) -> AdapterRequest {
        // Reverse proxies in front of Ollama sometimes require a bearer token.
        let mut headers = HashMap::new();
        if let Some(key) = api_key {
            headers.insert("Authorization".to_string(), format!("Bearer {}", key));
        }
        AdapterRequest {
            url: join_url(&self.base_url, "/api/chat"),
            method: "POST".into(),
            headers,
            body: serde_json::json!({
                "model": model,
                "messages": [{"role": "user", "content": prompt}],
                "stream": false,
            }),
        }
    }

    fn parse_response(&self, body: &Value) -> Result<ParsedCompletion> {
        let response: ChatResponse = serde_json::from_value(body.clone())
            .map_err(|e| malformed_response(&self.provider_id, e.to_string()))?;
        Ok(ParsedCompletion {
            text: response.message.content,
            tokens_in: response.prompt_eval_count,
            tokens_out: response.eval_count,
        })
    }

    fn classify_failure(&self, status: u16, body: &str) -> ErrorClassification {
        let payload = ErrorPayload::parse(body);
        if status == 404 || payload.mentions_not_found() {
            return ErrorClassification::NotFound;
        }
        ErrorClassification::from_http_status(status)
    }
}
