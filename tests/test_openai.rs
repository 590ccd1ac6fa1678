//! Integration tests for the OpenAI-compatible provider
//!
//! Exercises the HTTP contract against a mock server:
//! - batched completions and their error paths
//! - SSE streaming, including keep-alive chunks and `[DONE]`
//! - mid-stream error payloads

use futures::StreamExt;
use persona_agent::llm::provider::{
    CompletionRequest, FinishReason, LlmError, LlmProvider, StreamDelta,
};
use persona_agent::llm::providers::openai::{OpenAiConfig, OpenAiProvider};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(base_url: &str) -> OpenAiConfig {
    OpenAiConfig {
        api_key: "test-api-key".to_string(),
        base_url: base_url.to_string(),
        timeout: Duration::from_secs(5),
    }
}

fn test_request() -> CompletionRequest {
    CompletionRequest::with_system_prompt("gpt-4o-mini", "You are XiaoMei.", "Hello")
}

fn sse_body(events: &[&str]) -> String {
    events.iter().map(|e| format!("data: {e}\n\n")).collect()
}

async fn collect_stream(provider: &OpenAiProvider) -> Vec<Result<StreamDelta, LlmError>> {
    provider
        .complete_stream(test_request())
        .await
        .unwrap()
        .collect()
        .await
}

#[tokio::test]
async fn test_completion_returns_first_choice() {
    let mock_server = MockServer::start().await;

    let response_body = serde_json::json!({
        "id": "chatcmpl-123",
        "object": "chat.completion",
        "model": "gpt-4o-mini",
        "choices": [
            {
                "index": 0,
                "message": {"role": "assistant", "content": "XiaoShuai"},
                "finish_reason": "stop"
            }
        ],
        "usage": {"prompt_tokens": 10, "completion_tokens": 2, "total_tokens": 12}
    });

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer test-api-key"))
        .and(body_partial_json(serde_json::json!({
            "model": "gpt-4o-mini",
            "messages": [
                {"role": "system", "content": "You are XiaoMei."},
                {"role": "user", "content": "Hello"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(response_body))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();
    let response = provider.complete(test_request()).await.unwrap();

    assert_eq!(response.content.as_deref(), Some("XiaoShuai"));
    assert_eq!(response.usage.total_tokens, 12);
    assert_eq!(response.finish_reason, FinishReason::Stop);
}

#[tokio::test]
async fn test_completion_without_choices_is_no_choices_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "model": "gpt-4o-mini",
            "choices": [],
            "usage": {"prompt_tokens": 10, "completion_tokens": 0, "total_tokens": 10}
        })))
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();
    let result = provider.complete(test_request()).await;

    assert!(matches!(result, Err(LlmError::NoChoices)));
}

#[tokio::test]
async fn test_http_errors_are_api_errors_without_retry() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();
    let result = provider.complete(test_request()).await;

    match result {
        Err(LlmError::ApiError(message)) => assert!(message.contains("503")),
        other => panic!("expected ApiError, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unauthorized_is_api_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
        })))
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();

    assert!(matches!(
        provider.complete(test_request()).await,
        Err(LlmError::ApiError(_))
    ));
}

#[tokio::test]
async fn test_network_failure_is_network_error() {
    // Nothing listens on port 9 of localhost.
    let provider = OpenAiProvider::new(test_config("http://127.0.0.1:9/v1")).unwrap();

    assert!(matches!(
        provider.complete(test_request()).await,
        Err(LlmError::NetworkError(_))
    ));
}

#[tokio::test]
async fn test_stream_yields_deltas_until_done() {
    let mock_server = MockServer::start().await;

    let body = sse_body(&[
        r#"{"choices":[{"index":0,"delta":{"role":"assistant"},"finish_reason":null}]}"#,
        r#"{"choices":[{"index":0,"delta":{"content":"Hel"},"finish_reason":null}]}"#,
        r#"{"choices":[{"index":0,"delta":{"content":"lo"},"finish_reason":null}]}"#,
        r#"{"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
        "[DONE]",
        r#"{"choices":[{"index":0,"delta":{"content":"after done"}}]}"#,
    ]);

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(serde_json::json!({"stream": true})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "text/event-stream")
                .set_body_string(body),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();
    let deltas: Vec<StreamDelta> = collect_stream(&provider)
        .await
        .into_iter()
        .collect::<Result<_, _>>()
        .unwrap();

    let text: String = deltas.iter().map(|d| d.content.as_str()).collect();
    assert_eq!(text, "Hello");
    assert!(deltas.iter().any(|d| d.content.is_empty()));
    assert_eq!(
        deltas.last().and_then(|d| d.finish_reason.clone()),
        Some(FinishReason::Stop)
    );
}

#[tokio::test]
async fn test_stream_error_payload_is_surfaced() {
    let mock_server = MockServer::start().await;

    let body = sse_body(&[
        r#"{"choices":[{"index":0,"delta":{"content":"partial"}}]}"#,
        r#"{"error":{"message":"model overloaded","type":"server_error"}}"#,
    ]);

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "text/event-stream")
                .set_body_string(body),
        )
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();
    let items = collect_stream(&provider).await;

    assert_eq!(items[0].as_ref().unwrap().content, "partial");
    assert!(items.iter().any(|item| matches!(item, Err(LlmError::ApiError(_)))));
}

#[tokio::test]
async fn test_stream_open_failure_is_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new(test_config(&mock_server.uri())).unwrap();

    assert!(matches!(
        provider.complete_stream(test_request()).await,
        Err(LlmError::ApiError(_))
    ));
}
