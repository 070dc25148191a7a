//! Anthropic Messages API adapter.
//!
//! Responses carry a list of typed content blocks; every `text` block is
//! concatenated in order and any other block kind (`thinking`, `tool_use`)
//! is ignored.

use super::{join_url, malformed_response, AdapterRequest, ErrorPayload, ParsedCompletion, ProviderAdapter};
use crate::config::ApiStyle;
use crate::error_code::ErrorClassification;
use crate::Result;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Clone)]
pub struct AnthropicAdapter {
    provider_id: String,
    base_url: String,
}

impl AnthropicAdapter {
    pub fn new(provider_id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            base_url: base_url.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Option<MessagesUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessagesUsage {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
}

impl ProviderAdapter for AnthropicAdapter {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn api_style(&self) -> ApiStyle {
        ApiStyle::AnthropicMessages
    }

    fn build_request(&self, model: &str, prompt: &str, api_key: Option<&str>) -> AdapterRequest {
        let mut headers = HashMap::new();
        headers.insert("anthropic-version".to_string(), ANTHROPIC_VERSION.to_string());
        if let Some(key) = api_key {
            headers.insert("x-api-key".to_string(), key.to_string());
        }
        AdapterRequest {
            url: join_url(&self.base_url, "/v1/messages"),
            method: "POST".into(),
            headers,
            body: serde_json::json!({
                "model": model,
                "max_tokens": DEFAULT_MAX_TOKENS,
                "messages": [{"role": "user", "content": prompt}],
            }),
        }
    }

    fn parse_response(&self, body: &Value) -> Result<ParsedCompletion> {
        let response: MessagesResponse = serde_json::from_value(body.clone())
            .map_err(|e| malformed_response(&self.provider_id, e.to_string()))?;
        let text = response
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect::<String>();
        let (tokens_in, tokens_out) = response
            .usage
            .map(|u| (u.input_tokens, u.output_tokens))
            .unwrap_or((None, None));
        Ok(ParsedCompletion {
            text,
            tokens_in,
            tokens_out,
        })
    }

    fn classify_failure(&self, status: u16, body: &str) -> ErrorClassification {
        let payload = ErrorPayload::parse(body);
        match payload.kind.as_deref() {
            Some("authentication_error") | Some("permission_error") => ErrorClassification::Auth,
            Some("rate_limit_error") => ErrorClassification::Quota,
            Some("not_found_error") => ErrorClassification::NotFound,
            // 529 overloaded: transient, let the queue advance
            Some("overloaded_error") => ErrorClassification::Unknown,
            _ if payload.mentions_quota() => ErrorClassification::Quota,
            _ => ErrorClassification::from_http_status(status),
        }
    }
}
