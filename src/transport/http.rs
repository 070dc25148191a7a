use crate::drivers::AdapterRequest;
use reqwest::Proxy;
use std::collections::HashMap;
use std::env;
use std::time::Duration;

/// Header carrying the relay's own correlation id. Providers ignore it, but
/// it links relay logs to proxy/gateway logs.
pub const REQUEST_ID_HEADER: &str = "x-ai-relay-request-id";

/// Status, body and headers of a completed HTTP exchange.
///
/// Non-2xx responses are not errors at this layer; the executor classifies
/// them through the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    /// Lower-cased header names.
    pub headers: HashMap<String, String>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Shared HTTP client. One instance serves every provider.
///
/// No whole-request timeout is configured here: the executor races each call
/// against its own per-provider timer and the caller's cancel token.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        // Minimal production-friendly defaults (env-overridable).
        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(env_u64("AI_RELAY_CONNECT_TIMEOUT_SECS", 10)))
            .pool_max_idle_per_host(env_u64("AI_RELAY_POOL_MAX_IDLE_PER_HOST", 8) as usize)
            .pool_idle_timeout(Some(Duration::from_secs(env_u64(
                "AI_RELAY_POOL_IDLE_TIMEOUT_SECS",
                90,
            ))));

        if let Ok(proxy_url) = env::var("AI_RELAY_PROXY_URL") {
            let proxy = Proxy::all(&proxy_url)
                .map_err(|e| TransportError::Other(format!("invalid proxy url: {}", e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build()?;
        Ok(Self { client })
    }

    /// Wrap an existing client (custom TLS roots, test harnesses).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub async fn send(
        &self,
        request: &AdapterRequest,
        request_id: &str,
    ) -> Result<HttpResponse, TransportError> {
        let mut req = match request.method.to_uppercase().as_str() {
            "POST" => self.client.post(&request.url).json(&request.body),
            "PUT" => self.client.put(&request.url).json(&request.body),
            "GET" => self.client.get(&request.url),
            other => {
                return Err(TransportError::Other(format!(
                    "unsupported method: {}",
                    other
                )))
            }
        };
        for (k, v) in &request.headers {
            req = req.header(k, v);
        }
        req = req.header(REQUEST_ID_HEADER, request_id);

        let response = req.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (k.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.text().await?;

        Ok(HttpResponse {
            status,
            body,
            headers,
        })
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(default)
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_returns_non_success_without_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header(REQUEST_ID_HEADER, "req-1")
            .match_header("authorization", "Bearer k")
            .with_status(429)
            .with_header("retry-after", "3")
            .with_body(r#"{"error":{"message":"slow down"}}"#)
            .create_async()
            .await;

        let transport = HttpTransport::new().unwrap();
        let request = AdapterRequest {
            url: format!("{}/v1/chat/completions", server.url()),
            method: "POST".into(),
            headers: HashMap::from([("Authorization".to_string(), "Bearer k".to_string())]),
            body: serde_json::json!({"model": "m"}),
        };
        let response = transport.send(&request, "req-1").await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.status, 429);
        assert!(!response.is_success());
        assert_eq!(response.headers.get("retry-after").map(String::as_str), Some("3"));
        assert!(response.body.contains("slow down"));
    }

    #[tokio::test]
    async fn test_unsupported_method() {
        let transport = HttpTransport::new().unwrap();
        let request = AdapterRequest {
            url: "http://127.0.0.1:9/".into(),
            method: "PATCH".into(),
            headers: HashMap::new(),
            body: serde_json::Value::Null,
        };
        let err = transport.send(&request, "req-2").await.unwrap_err();
        assert!(matches!(err, TransportError::Other(_)));
    }
}
