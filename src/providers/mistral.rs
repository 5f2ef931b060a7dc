//! Mistral adapter. OpenAI-compatible dialect; text-only with solid tool
//! calling, which makes it the preferred backend for code tasks.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::base::{Capabilities, CompletionRequest, Provider, ProviderResponse};
use super::configs::MistralConfig;
use super::groq::tool_choice_to_openai_spec;
use super::utils::{
    handle_response, map_send_error, messages_to_openai_spec, openai_response_to_provider_response,
    tools_to_openai_spec,
};
use crate::errors::ProviderError;

pub struct MistralProvider {
    client: Client,
    config: MistralConfig,
    capabilities: Capabilities,
}

impl MistralProvider {
    pub fn new(config: MistralConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            config,
            capabilities: Capabilities {
                chat: true,
                vision: false,
                tool_use: true,
                json_output: true,
                web_search: false,
                max_context_tokens: 131_072,
                max_output_tokens: 8_192,
            },
        })
    }

    fn build_payload(
        &self,
        request: &CompletionRequest,
        with_tools: bool,
    ) -> Result<Value, ProviderError> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.extend(messages_to_openai_spec(&request.messages, false));

        let mut payload = json!({
            "model": self.config.model,
            "messages": messages,
        });
        let body = payload.as_object_mut().unwrap();

        if let Some(temperature) = request.temperature.or(self.config.temperature) {
            body.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(max_tokens) = request.max_tokens.or(self.config.max_tokens) {
            body.insert("max_tokens".to_string(), json!(max_tokens));
        }
        if request.json_output {
            body.insert(
                "response_format".to_string(),
                json!({"type": "json_object"}),
            );
        }
        if with_tools && !request.tools.is_empty() {
            body.insert(
                "tools".to_string(),
                json!(tools_to_openai_spec(&request.tools)?),
            );
            body.insert(
                "tool_choice".to_string(),
                tool_choice_to_openai_spec(&request.tool_choice),
            );
        }

        Ok(payload)
    }

    async fn post(&self, payload: Value) -> Result<Value, ProviderError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Api("Mistral API key is not configured".to_string()))?;

        let url = format!(
            "{}/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&payload)
            .send()
            .await
            .map_err(map_send_error)?;

        handle_response(response).await
    }
}

#[async_trait]
impl Provider for MistralProvider {
    fn name(&self) -> &str {
        "mistral"
    }

    fn display_name(&self) -> &str {
        "Mistral"
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn is_available(&self) -> bool {
        self.config.api_key.is_some()
    }

    async fn chat(
        &self,
        request: &CompletionRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        let payload = self.build_payload(request, false)?;
        let response = self.post(payload).await?;
        openai_response_to_provider_response(response)
    }

    async fn chat_with_tools(
        &self,
        request: &CompletionRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        self.ensure_tool_support()?;
        let payload = self.build_payload(request, true)?;
        let response = self.post(payload).await?;
        openai_response_to_provider_response(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::Message;
    use crate::providers::base::FinishReason;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup_mock_server(template: ResponseTemplate) -> (MockServer, MistralProvider) {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(template)
            .mount(&mock_server)
            .await;

        let config = MistralConfig {
            host: mock_server.uri(),
            api_key: Some("test_api_key".to_string()),
            ..Default::default()
        };

        let provider = MistralProvider::new(config).unwrap();
        (mock_server, provider)
    }

    #[tokio::test]
    async fn test_chat_basic() -> Result<()> {
        let response_body = json!({
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Bonjour!"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 8, "completion_tokens": 4, "total_tokens": 12}
        });
        let (_, provider) =
            setup_mock_server(ResponseTemplate::new(200).set_body_json(response_body)).await;

        let request = CompletionRequest::new(vec![Message::user().with_text("Hello?")]);
        let response = provider.chat(&request).await?;

        assert_eq!(response.text, "Bonjour!");
        assert_eq!(response.finish_reason, FinishReason::Stop);
        assert_eq!(response.usage.input_tokens, Some(8));
        Ok(())
    }

    #[tokio::test]
    async fn test_image_parts_are_stripped() -> Result<()> {
        // Text-only backend: the request must not carry multimodal content
        // arrays, only the flattened text.
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(wiremock::matchers::body_partial_json(json!({
                "messages": [{"role": "user", "content": "What is in this picture?"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "I cannot see images."},
                    "finish_reason": "stop"
                }]
            })))
            .mount(&mock_server)
            .await;

        let config = MistralConfig {
            host: mock_server.uri(),
            api_key: Some("test_api_key".to_string()),
            ..Default::default()
        };
        let provider = MistralProvider::new(config).unwrap();

        let message = Message::user()
            .with_text("What is in this picture?")
            .with_image("aGVsbG8=", "image/png");
        let response = provider.chat(&CompletionRequest::new(vec![message])).await?;
        assert_eq!(response.text, "I cannot see images.");
        Ok(())
    }

    #[tokio::test]
    async fn test_429_maps_to_rate_limit() {
        let (_, provider) = setup_mock_server(ResponseTemplate::new(429)).await;
        let request = CompletionRequest::new(vec![Message::user().with_text("hi")]);
        let result = provider.chat(&request).await;
        assert!(matches!(
            result,
            Err(ProviderError::RateLimit { retry_after: None })
        ));
    }

    #[tokio::test]
    async fn test_502_maps_to_unavailable() {
        let (_, provider) = setup_mock_server(ResponseTemplate::new(502)).await;
        let request = CompletionRequest::new(vec![Message::user().with_text("hi")]);
        assert!(matches!(
            provider.chat(&request).await,
            Err(ProviderError::Unavailable(_))
        ));
    }
}
