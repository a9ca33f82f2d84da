//! Integration tests for the OpenAI package generation adapter
//!
//! These tests verify against a mock chat-completions endpoint that:
//! 1. Model output is normalized into a valid package
//! 2. Upstream failures and timeouts surface as generation errors
//! 3. Unusable output surfaces as a schema validation error

use async_openai::{config::OpenAIConfig, Client};
use conversation_package_core::ports::{
    GenerationRequest, PackageGenerationService, PortError,
};
use package_generator_lib::adapters::generation_llm::{GenerationSettings, OpenAiPackageAdapter};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn create_test_adapter(mock_server: &MockServer, timeout: Duration) -> OpenAiPackageAdapter {
    let config = OpenAIConfig::new()
        .with_api_key("test-api-key")
        .with_api_base(mock_server.uri());
    OpenAiPackageAdapter::new(
        Client::with_config(config),
        GenerationSettings {
            model: "gpt-4o".to_string(),
            temperature: 0.4,
            timeout,
        },
    )
}

fn mock_completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1767225600,
        "model": "gpt-4o",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop",
            "logprobs": null
        }],
        "usage": { "prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30 }
    })
}

fn new_learner_request() -> GenerationRequest<'static> {
    GenerationRequest {
        target_language: "spanish",
        existing_package: None,
        analysis_records: &[],
        user_context: None,
    }
}

#[tokio::test]
async fn test_generated_package_is_normalized() {
    let mock_server = MockServer::start().await;
    let model_output = json!({
        "name": "Spanish basics",
        "category": "language",
        "tags": ["spanish", "speaking"],
        "conversations": [{
            "name": "Greetings",
            "instruction": "Start the conversation by saying 'hola'.",
            "targets": [{ "key": "hola", "description": "Say hello", "check": "Did the user say hola?" }]
        }],
        "language": "spanish"
    })
    .to_string();

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "model": "gpt-4o",
            "response_format": { "type": "json_object" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(mock_completion(&model_output)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let adapter = create_test_adapter(&mock_server, Duration::from_secs(5));
    let package = adapter
        .generate(new_learner_request())
        .await
        .expect("generation succeeds");

    assert_eq!(package.name, "Spanish basics");
    assert_eq!(package.description, "");
    let keys: Vec<&str> = package.conversations[0]
        .targets
        .iter()
        .map(|t| t.key.as_str())
        .collect();
    assert_eq!(keys, vec!["hola", "c1-review-1", "c1-review-2"]);
}

#[tokio::test]
async fn test_upstream_error_is_generation_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "message": "Invalid request",
                "type": "invalid_request_error",
                "param": null,
                "code": null
            }
        })))
        .mount(&mock_server)
        .await;

    let adapter = create_test_adapter(&mock_server, Duration::from_secs(5));
    let result = adapter.generate(new_learner_request()).await;

    assert!(
        matches!(result, Err(PortError::Generation(_))),
        "Expected generation error, got: {:?}",
        result
    );
}

#[tokio::test]
async fn test_slow_upstream_times_out() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(mock_completion("{}"))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&mock_server)
        .await;

    let adapter = create_test_adapter(&mock_server, Duration::from_millis(100));
    let result = adapter.generate(new_learner_request()).await;

    match result {
        Err(PortError::Generation(message)) => assert!(message.contains("timed out")),
        other => panic!("Expected timeout, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_unusable_output_is_schema_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(mock_completion(r#"{"name": "No lessons", "conversations": []}"#)),
        )
        .mount(&mock_server)
        .await;

    let adapter = create_test_adapter(&mock_server, Duration::from_secs(5));
    let result = adapter.generate(new_learner_request()).await;

    assert!(
        matches!(result, Err(PortError::SchemaValidation(_))),
        "Expected schema validation error, got: {:?}",
        result
    );
}

#[tokio::test]
async fn test_empty_choices_is_generation_error() {
    let mock_server = MockServer::start().await;
    let mut body = mock_completion("");
    body["choices"] = json!([]);
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&mock_server)
        .await;

    let adapter = create_test_adapter(&mock_server, Duration::from_secs(5));
    let result = adapter.generate(new_learner_request()).await;

    assert!(matches!(result, Err(PortError::Generation(_))));
}
