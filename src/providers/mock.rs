//! A scripted provider for orchestrator tests: plays back a pre-programmed
//! sequence of responses and errors, and records every request it receives.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::base::{
    Capabilities, CompletionRequest, FinishReason, Provider, ProviderResponse, Usage,
};
use crate::errors::ProviderError;

type Scripted = Result<ProviderResponse, ProviderError>;

pub struct MockProvider {
    name: String,
    capabilities: Capabilities,
    available: bool,
    responses: Arc<Mutex<Vec<Scripted>>>,
    calls: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl MockProvider {
    /// Create a mock with a sequence of scripted outcomes. Once the script
    /// runs out, further calls return an empty successful response.
    pub fn new(name: &str, responses: Vec<Scripted>) -> Self {
        Self {
            name: name.to_string(),
            capabilities: Capabilities {
                chat: true,
                vision: true,
                tool_use: true,
                json_output: true,
                web_search: false,
                max_context_tokens: 128_000,
                max_output_tokens: 8_192,
            },
            available: true,
            responses: Arc::new(Mutex::new(responses)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Shared handle to the recorded requests, usable after the provider is
    /// boxed into a registry.
    pub fn calls(&self) -> Arc<Mutex<Vec<CompletionRequest>>> {
        Arc::clone(&self.calls)
    }

    pub fn text_response(text: &str) -> ProviderResponse {
        ProviderResponse {
            text: text.to_string(),
            tool_calls: Vec::new(),
            usage: Usage::new(Some(10), Some(10), Some(20)),
            finish_reason: FinishReason::Stop,
        }
    }

    fn next(&self, request: &CompletionRequest) -> Scripted {
        self.calls.lock().unwrap().push(request.clone());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(Self::text_response(""))
        } else {
            responses.remove(0)
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn is_available(&self) -> bool {
        self.available
    }

    async fn chat(
        &self,
        request: &CompletionRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        self.next(request)
    }

    async fn chat_with_tools(
        &self,
        request: &CompletionRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        self.next(request)
    }
}
