//! RequestExecutor and end-to-end relay runs against a mock HTTP server.

mod common;

use ai_relay::client::ExecuteOptions;
use ai_relay::resilience::MemoryStore;
use ai_relay::tokens::SessionUsage;
use ai_relay::transport::{HttpTransport, StaticCredentials};
use ai_relay::{
    Candidate, CancellationToken, CandidateExecutor, ErrorClassification, GenerateOptions,
    Outcome, RelayBuilder, RelayConfig, RequestExecutor,
};
use common::{three_provider_config, MockServerFixture};
use mockito::Matcher;
use std::sync::Arc;
use std::time::Duration;

fn executor(config: RelayConfig, usage: Arc<SessionUsage>) -> RequestExecutor {
    let credentials = StaticCredentials::new()
        .with_key("alpha", "alpha-key")
        .with_key("beta", "beta-key");
    RequestExecutor::new(
        Arc::new(config),
        HttpTransport::new().unwrap(),
        Arc::new(credentials),
        usage,
    )
}

fn options() -> ExecuteOptions {
    ExecuteOptions::new(Duration::from_secs(5))
}

#[tokio::test]
async fn test_openai_compatible_success_records_usage() {
    let mut fixture = MockServerFixture::new().await;
    let mock = fixture
        .server
        .mock("POST", "/v1/chat/completions")
        .match_header("authorization", "Bearer alpha-key")
        .match_body(Matcher::PartialJson(serde_json::json!({"model": "alpha-1"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"choices":[{"message":{"role":"assistant","content":"<think>draft</think>Bright and kind."}}],
                "usage":{"prompt_tokens":12,"completion_tokens":4,"total_tokens":16}}"#,
        )
        .create_async()
        .await;

    let mut config = three_provider_config(&fixture.base_url);
    config.models.insert(
        "alpha-1".into(),
        ai_relay::config::ModelConfig::default()
            .with_base_delay_ms(0)
            .with_costs(1.0, 2.0),
    );
    let usage = Arc::new(SessionUsage::new());
    let executor = executor(config, usage.clone());

    let outcome = executor
        .execute(&Candidate::new("alpha-1", "alpha"), "Describe Bob.", &options())
        .await;

    mock.assert_async().await;
    match outcome {
        Outcome::Success { text, usage: record, .. } => {
            assert_eq!(text, "Bright and kind.");
            assert_eq!(record.prompt_tokens, 12);
            assert_eq!(record.completion_tokens, 4);
            assert_eq!(record.total_tokens, 16);
        }
        other => panic!("expected success, got {:?}", other),
    }
    let snapshot = usage.snapshot();
    assert_eq!(snapshot.requests, 1);
    assert_eq!(snapshot.total_tokens, 16);
    // 12/1000 * 1.0 + 4/1000 * 2.0
    assert!((snapshot.estimated_cost - 0.02).abs() < 1e-9);
}

#[tokio::test]
async fn test_anthropic_quota_keeps_vendor_message() {
    let mut fixture = MockServerFixture::new().await;
    fixture
        .server
        .mock("POST", "/v1/messages")
        .match_header("x-api-key", "beta-key")
        .with_status(429)
        .with_body(
            r#"{"type":"error","error":{"type":"rate_limit_error","message":"Rate limited. Please retry in 2.5s"}}"#,
        )
        .create_async()
        .await;

    let executor = executor(three_provider_config(&fixture.base_url), Arc::new(SessionUsage::new()));
    let outcome = executor
        .execute(&Candidate::new("beta-1", "beta"), "p", &options())
        .await;

    assert_eq!(
        outcome,
        Outcome::failure(ErrorClassification::Quota, "Rate limited. Please retry in 2.5s")
    );
}

#[tokio::test]
async fn test_retry_after_header_becomes_hint() {
    let mut fixture = MockServerFixture::new().await;
    fixture
        .server
        .mock("POST", "/v1/chat/completions")
        .with_status(429)
        .with_header("retry-after", "7")
        .with_body(r#"{"error":{"message":"Too many requests","code":"rate_limit_exceeded"}}"#)
        .create_async()
        .await;

    let executor = executor(three_provider_config(&fixture.base_url), Arc::new(SessionUsage::new()));
    let outcome = executor
        .execute(&Candidate::new("alpha-1", "alpha"), "p", &options())
        .await;

    match outcome {
        Outcome::Failure {
            classification,
            message,
        } => {
            assert_eq!(classification, ErrorClassification::Quota);
            assert_eq!(ai_relay::resilience::extract_retry_after(&message), Some(7500));
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_whitespace_reply_is_empty_response() {
    let mut fixture = MockServerFixture::new().await;
    fixture
        .server
        .mock("POST", "/api/chat")
        .with_status(200)
        .with_body(r#"{"message":{"role":"assistant","content":"  \n "},"done":true}"#)
        .create_async()
        .await;

    let usage = Arc::new(SessionUsage::new());
    let executor = executor(three_provider_config(&fixture.base_url), usage.clone());
    let outcome = executor
        .execute(&Candidate::new("local-1", "local"), "p", &options())
        .await;

    assert_eq!(outcome.classification(), Some(ErrorClassification::EmptyResponse));
    assert_eq!(usage.snapshot().requests, 0);
}

#[tokio::test]
async fn test_missing_usage_is_estimated() {
    let mut fixture = MockServerFixture::new().await;
    fixture
        .server
        .mock("POST", "/api/chat")
        .with_status(200)
        .with_body(r#"{"message":{"role":"assistant","content":"12345678"},"done":true}"#)
        .create_async()
        .await;

    let executor = executor(three_provider_config(&fixture.base_url), Arc::new(SessionUsage::new()));
    let outcome = executor
        .execute(&Candidate::new("local-1", "local"), "abcd", &options())
        .await;

    match outcome {
        Outcome::Success { usage, .. } => {
            assert_eq!(usage.prompt_tokens, 1);
            assert_eq!(usage.completion_tokens, 2);
        }
        other => panic!("expected success, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unauthorized_is_auth() {
    let mut fixture = MockServerFixture::new().await;
    fixture
        .server
        .mock("POST", "/v1/chat/completions")
        .with_status(401)
        .with_body(r#"{"error":{"message":"Incorrect API key provided","code":"invalid_api_key"}}"#)
        .create_async()
        .await;

    let executor = executor(three_provider_config(&fixture.base_url), Arc::new(SessionUsage::new()));
    let outcome = executor
        .execute(&Candidate::new("alpha-1", "alpha"), "p", &options())
        .await;
    assert_eq!(outcome.classification(), Some(ErrorClassification::Auth));
}

#[tokio::test]
async fn test_slow_provider_times_out() {
    // Accepts connections but never answers.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _server = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let executor = executor(
        three_provider_config(&format!("http://{}", addr)),
        Arc::new(SessionUsage::new()),
    );
    let outcome = executor
        .execute(
            &Candidate::new("alpha-1", "alpha"),
            "p",
            &ExecuteOptions::new(Duration::from_millis(150)),
        )
        .await;
    assert_eq!(outcome.classification(), Some(ErrorClassification::Timeout));
}

#[tokio::test]
async fn test_cancel_token_interrupts_call() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _server = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let executor = executor(
        three_provider_config(&format!("http://{}", addr)),
        Arc::new(SessionUsage::new()),
    );
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let outcome = executor
        .execute(
            &Candidate::new("alpha-1", "alpha"),
            "p",
            &ExecuteOptions::new(Duration::from_secs(10)).with_cancel(Some(token)),
        )
        .await;
    assert_eq!(outcome.classification(), Some(ErrorClassification::Cancelled));
}

#[tokio::test]
async fn test_relay_falls_back_across_providers_over_http() {
    let mut fixture = MockServerFixture::new().await;
    let quota = fixture
        .server
        .mock("POST", "/v1/chat/completions")
        .match_body(Matcher::PartialJson(serde_json::json!({"model": "alpha-1"})))
        .with_status(429)
        .with_body(r#"{"error":{"message":"You exceeded your current quota","code":"insufficient_quota"}}"#)
        .expect(1)
        .create_async()
        .await;
    let missing = fixture
        .server
        .mock("POST", "/v1/chat/completions")
        .match_body(Matcher::PartialJson(serde_json::json!({"model": "alpha-2"})))
        .with_status(404)
        .with_body(r#"{"error":{"message":"The model does not exist","code":"model_not_found"}}"#)
        .expect(1)
        .create_async()
        .await;
    let anthropic = fixture
        .server
        .mock("POST", "/v1/messages")
        .with_status(200)
        .with_body(
            r#"{"content":[{"type":"text","text":"Carol helps "},{"type":"text","text":"her classmates."}],
                "usage":{"input_tokens":9,"output_tokens":5}}"#,
        )
        .expect(1)
        .create_async()
        .await;

    let relay = RelayBuilder::new()
        .with_config(three_provider_config(&fixture.base_url))
        .with_store(Arc::new(MemoryStore::new()))
        .with_credentials(Arc::new(
            StaticCredentials::new()
                .with_key("alpha", "a")
                .with_key("beta", "b"),
        ))
        .with_selected_model("alpha-1")
        .build()
        .unwrap();

    let generation = relay
        .generate("Describe Carol.", GenerateOptions::new().with_name_hint("Carol"))
        .await
        .unwrap();

    quota.assert_async().await;
    missing.assert_async().await;
    anthropic.assert_async().await;
    assert_eq!(generation.model_used, "beta-1");
    assert_eq!(generation.text, "Carol helps her classmates.");
    assert_eq!(generation.usage.total_tokens, 14);
    assert_eq!(relay.usage().requests, 1);
}
