//! End-to-end orchestrator tests over wiremock-backed adapters: real wire
//! translation and error mapping, scripted backends.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use switchboard::config::Settings;
use switchboard::errors::{OrchestratorError, ToolError};
use switchboard::limiter::RateLimiter;
use switchboard::models::request::IncomingRequest;
use switchboard::models::tool::ToolDefinition;
use switchboard::orchestrator::{Orchestrator, ToolExecutor};
use switchboard::parser::Intent;
use switchboard::providers::configs::{GeminiConfig, GroqConfig, ProviderConfig};
use switchboard::providers::registry::ProviderRegistry;

fn orchestrator(settings: Settings) -> Orchestrator {
    let registry = ProviderRegistry::from_settings(&settings).unwrap();
    let limiter = RateLimiter::new(settings.rate_limits.clone());
    Orchestrator::new(registry, limiter, settings)
}

fn groq_only_settings(host: String) -> Settings {
    Settings {
        default_provider: "groq".to_string(),
        providers: vec![ProviderConfig::Groq(GroqConfig {
            host,
            api_key: Some("test_api_key".to_string()),
            ..Default::default()
        })],
        ..Default::default()
    }
}

/// An OpenAI-style completion body whose assistant content is `content`.
fn completion_body(content: &str) -> Value {
    json!({
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 20, "completion_tokens": 10, "total_tokens": 30}
    })
}

struct CannedSearch;

#[async_trait]
impl ToolExecutor for CannedSearch {
    async fn execute(&self, arguments: Value) -> Result<String, ToolError> {
        let query = arguments["query"].as_str().unwrap_or_default();
        Ok(format!("Top result for '{}': Rust 1.80 released.", query))
    }
}

fn search_tool() -> ToolDefinition {
    ToolDefinition::new(
        "web_search",
        "Search the web for current information",
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "The search query"}
            },
            "required": ["query"]
        }),
    )
}

#[tokio::test]
async fn structured_reply_round_trip() {
    let server = MockServer::start().await;
    let reply = r#"{"response": "Good morning to you!", "classification": "question", "stateChanges": []}"#;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(reply)))
        .mount(&server)
        .await;

    let orchestrator = orchestrator(groq_only_settings(server.uri()));
    let result = orchestrator
        .process_message(IncomingRequest::text("good morning"))
        .await
        .unwrap();

    assert_eq!(result.provider, "groq");
    assert_eq!(result.response, "Good morning to you!");
    assert_eq!(result.intent, Intent::Question);
    assert_eq!(result.agent_steps, 0);
    assert_eq!(result.usage.total_tokens, Some(30));
}

#[tokio::test]
async fn plain_text_reply_is_preserved_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(completion_body("Sure, here you go!")),
        )
        .mount(&server)
        .await;

    let orchestrator = orchestrator(groq_only_settings(server.uri()));
    let result = orchestrator
        .process_message(IncomingRequest::text("hi there"))
        .await
        .unwrap();

    assert_eq!(result.response, "Sure, here you go!");
    assert_eq!(result.intent, Intent::Question);
    assert!(result.state_changes.is_empty());
}

#[tokio::test]
async fn rate_limited_primary_falls_back_then_gets_skipped() {
    let gemini_server = MockServer::start().await;
    // The 429 mock must only ever be hit once: after the trip, routing
    // skips gemini outright.
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&gemini_server)
        .await;

    let groq_server = MockServer::start().await;
    let reply = r#"{"response": "Considered both options.", "classification": "question", "stateChanges": []}"#;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(reply)))
        .expect(2)
        .mount(&groq_server)
        .await;

    let settings = Settings {
        default_provider: "groq".to_string(),
        providers: vec![
            ProviderConfig::Gemini(GeminiConfig {
                host: gemini_server.uri(),
                api_key: Some("test_api_key".to_string()),
                ..Default::default()
            }),
            ProviderConfig::Groq(GroqConfig {
                host: groq_server.uri(),
                api_key: Some("test_api_key".to_string()),
                ..Default::default()
            }),
        ],
        ..Default::default()
    };
    let orchestrator = orchestrator(settings);

    // Complex reasoning prefers gemini; its 429 pushes us to groq.
    let request = || IncomingRequest::text("help me decide between these two job offers");
    let result = orchestrator.process_message(request()).await.unwrap();
    assert_eq!(result.provider, "groq");

    let snapshot = orchestrator.rate_limit_snapshot();
    assert!(snapshot["gemini"].backed_off);

    // Next request for the same category routes straight to the fallback.
    let result = orchestrator.process_message(request()).await.unwrap();
    assert_eq!(result.provider, "groq");
}

#[tokio::test]
async fn two_step_tool_loop_over_the_wire() {
    let server = MockServer::start().await;

    // First call: the model asks for a search.
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": "web_search",
                            "arguments": "{\"query\":\"latest rust release\"}"
                        }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 30, "completion_tokens": 10, "total_tokens": 40}
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    // Second call: final structured answer.
    let reply =
        r#"{"response": "Rust 1.80 is the latest release.", "classification": "question", "stateChanges": []}"#;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(reply)))
        .mount(&server)
        .await;

    let mut orchestrator = orchestrator(groq_only_settings(server.uri()));
    orchestrator
        .register_tool(search_tool(), Arc::new(CannedSearch))
        .unwrap();

    let result = orchestrator
        .process_message(IncomingRequest::text("search for the latest rust release"))
        .await
        .unwrap();

    assert_eq!(result.tools_used, vec!["web_search"]);
    assert_eq!(result.agent_steps, 2);
    assert_eq!(result.response, "Rust 1.80 is the latest release.");
    assert_eq!(result.usage.total_tokens, Some(70));
}

#[tokio::test]
async fn missing_credentials_mean_no_usable_provider() {
    let settings = Settings {
        default_provider: "groq".to_string(),
        providers: vec![ProviderConfig::Groq(GroqConfig::default())],
        ..Default::default()
    };
    let orchestrator = orchestrator(settings);

    let error = orchestrator
        .process_message(IncomingRequest::text("hello"))
        .await
        .unwrap_err();
    assert!(matches!(error, OrchestratorError::NoUsableProvider(_)));

    assert!(orchestrator.available_providers().is_empty());
    assert_eq!(orchestrator.default_provider(), "groq");
}
