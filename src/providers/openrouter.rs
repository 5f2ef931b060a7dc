//! OpenRouter adapter. OpenAI-compatible dialect fronting many upstream
//! models; carries vision support and the ranking headers OpenRouter asks
//! clients to send.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::base::{Capabilities, CompletionRequest, Provider, ProviderResponse};
use super::configs::OpenRouterConfig;
use super::groq::tool_choice_to_openai_spec;
use super::utils::{
    handle_response, map_send_error, messages_to_openai_spec, openai_response_to_provider_response,
    tools_to_openai_spec,
};
use crate::errors::ProviderError;

const REFERER: &str = "https://github.com/switchboard";
const TITLE: &str = "switchboard";

pub struct OpenRouterProvider {
    client: Client,
    config: OpenRouterConfig,
    capabilities: Capabilities,
}

impl OpenRouterProvider {
    pub fn new(config: OpenRouterConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            config,
            capabilities: Capabilities {
                chat: true,
                vision: true,
                tool_use: true,
                json_output: true,
                web_search: false,
                max_context_tokens: 1_048_576,
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
        messages.extend(messages_to_openai_spec(&request.messages, true));

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
        let api_key = self.config.api_key.as_deref().ok_or_else(|| {
            ProviderError::Api("OpenRouter API key is not configured".to_string())
        })?;

        let url = format!(
            "{}/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("HTTP-Referer", REFERER)
            .header("X-Title", TITLE)
            .json(&payload)
            .send()
            .await
            .map_err(map_send_error)?;

        handle_response(response).await
    }
}

#[async_trait]
impl Provider for OpenRouterProvider {
    fn name(&self) -> &str {
        "openrouter"
    }

    fn display_name(&self) -> &str {
        "OpenRouter"
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
