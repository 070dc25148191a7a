//! Google Gemini `generateContent` adapter.

use super::{join_url, malformed_response, AdapterRequest, ErrorPayload, ParsedCompletion, ProviderAdapter};
use crate::config::ApiStyle;
use crate::error_code::ErrorClassification;
use crate::Result;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct GeminiAdapter {
    provider_id: String,
    base_url: String,
}

impl GeminiAdapter {
    pub fn new(provider_id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            base_url: base_url.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<GenerateCandidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct GenerateCandidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    text: Option<String>,
    /// Thinking models flag their reasoning parts.
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u64>,
    candidates_token_count: Option<u64>,
}

impl ProviderAdapter for GeminiAdapter {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn api_style(&self) -> ApiStyle {
        ApiStyle::GeminiGenerate
    }

    fn build_request(&self, model: &str, prompt: &str, api_key: Option<&str>) -> AdapterRequest {
        let mut headers = HashMap::new();
        if let Some(key) = api_key {
            headers.insert("x-goog-api-key".to_string(), key.to_string());
        }
        AdapterRequest {
            url: join_url(
                &self.base_url,
                &format!("/v1beta/models/{}:generateContent", model),
            ),
            method: "POST".into(),
            headers,
            body: serde_json::json!({
                "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            }),
        }
    }

    fn parse_response(&self, body: &Value) -> Result<ParsedCompletion> {
        let response: GenerateResponse = serde_json::from_value(body.clone())
            .map_err(|e| malformed_response(&self.provider_id, e.to_string()))?;
        // A blocked prompt comes back with no candidates; that surfaces as an
        // empty text rather than a parse error.
        let text = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter(|p| !p.thought)
                    .filter_map(|p| p.text)
                    .collect::<String>()
            })
            .unwrap_or_default();
        let (tokens_in, tokens_out) = response
            .usage_metadata
            .map(|u| (u.prompt_token_count, u.candidates_token_count))
            .unwrap_or((None, None));
        Ok(ParsedCompletion {
            text,
            tokens_in,
            tokens_out,
        })
    }

    fn classify_failure(&self, status: u16, body: &str) -> ErrorClassification {
        if invalid_api_key(body) {
            return ErrorClassification::Auth;
        }
        let payload = ErrorPayload::parse(body);
        match payload.kind.as_deref() {
            Some("RESOURCE_EXHAUSTED") => ErrorClassification::Quota,
            Some("UNAUTHENTICATED") | Some("PERMISSION_DENIED") => ErrorClassification::Auth,
            Some("NOT_FOUND") => ErrorClassification::NotFound,
            Some("DEADLINE_EXCEEDED") => ErrorClassification::Timeout,
            _ if payload.mentions_quota() => ErrorClassification::Quota,
            _ => ErrorClassification::from_http_status(status),
        }
    }
}

/// Gemini reports a bad key as 400 INVALID_ARGUMENT with an `ErrorInfo`
/// detail whose reason is `API_KEY_INVALID`.
fn invalid_api_key(body: &str) -> bool {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return false;
    };
    value
        .pointer("/error/details")
        .and_then(Value::as_array)
        .is_some_and(|details| {
            details
                .iter()
                .any(|d| d["reason"].as_str() == Some("API_KEY_INVALID"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> GeminiAdapter {
        GeminiAdapter::new("gemini", "https://generativelanguage.googleapis.com")
    }

    #[test]
    fn test_build_request_puts_model_in_path() {
        let req = adapter().build_request("gemini-2.0-flash", "Hello", Some("AIza"));
        assert_eq!(
            req.url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
        assert_eq!(req.headers["x-goog-api-key"], "AIza");
        assert_eq!(req.body["contents"][0]["parts"][0]["text"], "Hello");
    }

    #[test]
    fn test_parse_joins_parts_and_skips_thoughts() {
        let body = serde_json::json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "planning...", "thought": true},
                    {"text": "A curious "},
                    {"text": "and helpful student."}
                ], "role": "model"},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 8, "candidatesTokenCount": 6, "totalTokenCount": 14}
        });
        let parsed = adapter().parse_response(&body).unwrap();
        assert_eq!(parsed.text, "A curious and helpful student.");
        assert_eq!(parsed.tokens_in, Some(8));
        assert_eq!(parsed.tokens_out, Some(6));
    }

    #[test]
    fn test_parse_blocked_prompt_is_empty() {
        let body = serde_json::json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let parsed = adapter().parse_response(&body).unwrap();
        assert_eq!(parsed.text, "");
        assert_eq!(parsed.tokens_in, None);
    }

    #[test]
    fn test_classify_failure() {
        let quota = r#"{"error":{"code":429,"message":"You exceeded your current quota. Please retry in 27.5s.","status":"RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(adapter().classify_failure(429, quota), ErrorClassification::Quota);

        let bad_key = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT","details":[{"@type":"type.googleapis.com/google.rpc.ErrorInfo","reason":"API_KEY_INVALID"}]}}"#;
        assert_eq!(adapter().classify_failure(400, bad_key), ErrorClassification::Auth);

        let missing = r#"{"error":{"code":404,"message":"models/gemini-9 is not found","status":"NOT_FOUND"}}"#;
        assert_eq!(adapter().classify_failure(404, missing), ErrorClassification::NotFound);

        assert_eq!(adapter().classify_failure(500, "{}"), ErrorClassification::Unknown);
    }
}
