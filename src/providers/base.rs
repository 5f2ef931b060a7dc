//! Provider abstraction: the canonical request/response shapes every backend
//! adapter translates to and from, and the trait they all implement.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ProviderError;
use crate::models::message::Message;
use crate::models::tool::{ToolCall, ToolDefinition};

/// Token accounting for one model call. Backends that omit a field leave it
/// `None` rather than guessing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }

    pub fn empty() -> Self {
        Self::new(None, None, None)
    }

    /// Fold another call's usage into this one. Missing fields on either
    /// side are treated as absent, not zero.
    pub fn accumulate(&mut self, other: &Usage) {
        fn add(a: Option<i32>, b: Option<i32>) -> Option<i32> {
            match (a, b) {
                (Some(a), Some(b)) => Some(a + b),
                (Some(a), None) => Some(a),
                (None, Some(b)) => Some(b),
                (None, None) => None,
            }
        }
        self.input_tokens = add(self.input_tokens, other.input_tokens);
        self.output_tokens = add(self.output_tokens, other.output_tokens);
        self.total_tokens = add(self.total_tokens, other.total_tokens);
    }

    /// Best available total: the reported one, or the sum of the parts.
    pub fn total(&self) -> Option<i32> {
        self.total_tokens
            .or_else(|| match (self.input_tokens, self.output_tokens) {
                (Some(input), Some(output)) => Some(input + output),
                _ => None,
            })
    }
}

/// Why the model stopped, normalized across wire dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    Error,
}

/// How the backend may use the supplied tool catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolChoice {
    Auto,
    None,
    Named(String),
}

impl Default for ToolChoice {
    fn default() -> Self {
        ToolChoice::Auto
    }
}

/// What a backend can do, fixed at adapter construction. Routing consults
/// these instead of probing the wire.
#[derive(Debug, Clone, Serialize)]
pub struct Capabilities {
    pub chat: bool,
    pub vision: bool,
    pub tool_use: bool,
    pub json_output: bool,
    pub web_search: bool,
    pub max_context_tokens: u32,
    pub max_output_tokens: u32,
}

/// One canonical completion request. Adapters translate this into their
/// wire dialect; callers never see vendor payloads.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub json_output: bool,
    /// Ask the backend to ground the answer with its built-in web search.
    /// Only honored by backends whose capabilities advertise `web_search`.
    pub web_search: bool,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: ToolChoice,
}

impl CompletionRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_system<S: Into<String>>(mut self, system: S) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_json_output(mut self) -> Self {
        self.json_output = true;
        self
    }

    pub fn with_web_search(mut self) -> Self {
        self.web_search = true;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

/// One canonical completion reply.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
    pub finish_reason: FinishReason,
}

impl ProviderResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Base trait for LLM backends (Gemini, Groq, Mistral, OpenRouter).
///
/// Adapters are stateless beyond their HTTP client and config: they never
/// retry, never consult quota, and map vendor failures onto
/// [`ProviderError`] so the orchestrator can decide what happens next.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable lowercase identifier used in routing tables and quota state.
    fn name(&self) -> &str;

    /// Human-readable name for logs and status output.
    fn display_name(&self) -> &str;

    fn capabilities(&self) -> &Capabilities;

    /// Whether credentials are configured. Unavailable providers stay
    /// registered so status surfaces can report them.
    fn is_available(&self) -> bool;

    /// Guard for `chat_with_tools` implementations: a clear error instead
    /// of a confusing vendor rejection when tool use is unsupported.
    fn ensure_tool_support(&self) -> Result<(), ProviderError> {
        if self.capabilities().tool_use {
            Ok(())
        } else {
            Err(ProviderError::Api(format!(
                "{} does not support tool calling",
                self.display_name()
            )))
        }
    }

    /// Plain completion; any tools on the request are ignored.
    async fn chat(&self, request: &CompletionRequest)
        -> Result<ProviderResponse, ProviderError>;

    /// Completion with the tool catalog attached. Backends whose
    /// capabilities say `tool_use: false` fail fast with an `Api` error.
    async fn chat_with_tools(
        &self,
        request: &CompletionRequest,
    ) -> Result<ProviderResponse, ProviderError>;
}
