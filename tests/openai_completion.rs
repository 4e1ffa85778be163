//! HTTP-level tests for the OpenAI-compatible completion client.

use httpmock::prelude::*;
use serde_json::json;

use ragforge::completion::{CompletionProvider, OpenAiChatCompletion};
use ragforge::types::RagError;

#[tokio::test]
async fn completes_against_a_chat_completions_endpoint() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/chat/completions")
            .json_body_partial(r#"{"model": "test-model"}"#);
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "choices": [
                    {"message": {"role": "assistant", "content": "a grounded answer"}}
                ]
            }));
    });

    let client = OpenAiChatCompletion::new(&server.base_url(), "test-model")
        .unwrap()
        .with_api_key("test-key");
    let answer = client.complete("question with context").await.unwrap();
    assert_eq!(answer, "a grounded answer");
    mock.assert();
}

#[tokio::test]
async fn server_errors_are_retryable_model_unavailable() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(503).body("upstream overloaded");
    });

    let client = OpenAiChatCompletion::new(&server.base_url(), "test-model").unwrap();
    let err = client.complete("prompt").await.unwrap_err();
    assert!(matches!(err, RagError::ModelUnavailable(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn client_errors_are_not_retryable() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(400).body("bad request");
    });

    let client = OpenAiChatCompletion::new(&server.base_url(), "test-model").unwrap();
    let err = client.complete("prompt").await.unwrap_err();
    assert!(matches!(err, RagError::InvalidInput(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn empty_prompt_never_reaches_the_wire() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(200).json_body(json!({"choices": []}));
    });

    let client = OpenAiChatCompletion::new(&server.base_url(), "test-model").unwrap();
    let err = client.complete("").await.unwrap_err();
    assert!(matches!(err, RagError::InvalidInput(_)));
    assert_eq!(mock.hits(), 0);
}

#[tokio::test]
async fn missing_content_yields_an_empty_answer() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({"choices": []}));
    });

    let client = OpenAiChatCompletion::new(&server.base_url(), "test-model").unwrap();
    let answer = client.complete("prompt").await.unwrap();
    assert_eq!(answer, "");
}
