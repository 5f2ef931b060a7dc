//! The control component: classify, resolve a routing chain, execute with
//! typed-error fallback, and drive the bounded tool loop when a request
//! needs external actions before it can be answered.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::classifier::{classify, ClassificationResult, RequestCategory};
use crate::config::Settings;
use crate::errors::{OrchestratorError, ProviderError, ToolError};
use crate::limiter::{RateLimitState, RateLimiter};
use crate::models::message::Message;
use crate::models::request::IncomingRequest;
use crate::models::tool::{ToolCall, ToolDefinition};
use crate::parser::{parse_structured, Intent, StateChange};
use crate::prompt::{build_system_prompt, ContextSource};
use crate::providers::base::{CompletionRequest, Provider, Usage};
use crate::providers::registry::ProviderRegistry;
use crate::routing::resolve_routing;

/// Executes one registered tool. Must be safe to call concurrently; failures
/// are reported to the model as inline error strings, never rethrown.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, arguments: Value) -> Result<String, ToolError>;
}

/// The final product of `process_message`.
#[derive(Debug, Clone)]
pub struct OrchestratorResult {
    pub response: String,
    pub intent: Intent,
    pub state_changes: Vec<StateChange>,
    /// The provider that ultimately produced the answer.
    pub provider: String,
    pub usage: Usage,
    /// Tools invoked during the agent loop, in first-use order.
    pub tools_used: Vec<String>,
    /// Model calls made by the agent loop; 0 when the plain chat path ran.
    pub agent_steps: u32,
}

struct RegisteredTool {
    definition: ToolDefinition,
    executor: Arc<dyn ToolExecutor>,
}

/// Why a single provider attempt failed.
enum AttemptError {
    /// Recoverable through the fallback chain.
    Provider(ProviderError),
    /// Terminal: another backend would re-run the same runaway task.
    LoopExceeded(usize),
}

pub struct Orchestrator {
    registry: ProviderRegistry,
    limiter: RateLimiter,
    settings: Settings,
    tools: Vec<RegisteredTool>,
    context: Option<Arc<dyn ContextSource>>,
}

impl Orchestrator {
    pub fn new(registry: ProviderRegistry, limiter: RateLimiter, settings: Settings) -> Self {
        Self {
            registry,
            limiter,
            settings,
            tools: Vec::new(),
            context: None,
        }
    }

    /// Install the external state collaborator whose text blocks are folded
    /// into the system prompt.
    pub fn with_context(mut self, context: Arc<dyn ContextSource>) -> Self {
        self.context = Some(context);
        self
    }

    /// Register a tool at startup. The schema is validated here; duplicate
    /// names are rejected. Tools are immutable for a request's lifetime.
    pub fn register_tool(
        &mut self,
        definition: ToolDefinition,
        executor: Arc<dyn ToolExecutor>,
    ) -> Result<(), ToolError> {
        definition.validate_schema()?;
        if self.tools.iter().any(|t| t.definition.name == definition.name) {
            return Err(ToolError::AlreadyRegistered(definition.name));
        }
        self.tools.push(RegisteredTool {
            definition,
            executor,
        });
        Ok(())
    }

    pub fn available_providers(&self) -> Vec<String> {
        self.registry
            .available_names()
            .into_iter()
            .map(String::from)
            .collect()
    }

    pub fn default_provider(&self) -> &str {
        &self.settings.default_provider
    }

    pub fn rate_limit_snapshot(&self) -> HashMap<String, RateLimitState> {
        self.limiter.all_states()
    }

    /// Process one request end to end.
    ///
    /// Classification and routing are synchronous and free; the chain is
    /// then attempted in order, feeding every failure into the rate limiter
    /// before moving on. Callers see either a result or a single terminal
    /// error.
    pub async fn process_message(
        &self,
        request: IncomingRequest,
    ) -> Result<OrchestratorResult, OrchestratorError> {
        let classification = classify(&request);
        debug!(
            category = %classification.category,
            confidence = classification.confidence,
            requires_tools = classification.requires_tools,
            "request classified"
        );

        let routing = resolve_routing(
            &request,
            classification.category,
            &self.registry,
            &self.limiter,
            &self.settings,
        );

        let system = build_system_prompt(self.context.as_deref()).await;
        let mut messages = request.history.clone();
        messages.push(build_user_message(&request));

        let mut attempted: Vec<String> = Vec::new();
        let mut last_error: Option<ProviderError> = None;

        for name in routing.chain() {
            let Some(provider) = self.registry.get(name) else {
                continue;
            };
            if !provider.is_available() {
                debug!(provider = name, "skipping: no credentials configured");
                continue;
            }
            let is_override = request.provider_override.as_deref() == Some(name);
            if !is_override && !self.limiter.can_use(name) {
                debug!(provider = name, "skipping: rate limited");
                continue;
            }

            attempted.push(name.to_string());
            match self
                .attempt(provider, &classification, &system, &messages)
                .await
            {
                Ok(result) => {
                    info!(provider = name, steps = result.agent_steps, "request completed");
                    return Ok(result);
                }
                Err(AttemptError::LoopExceeded(steps)) => {
                    return Err(OrchestratorError::AgentLoopExceeded(steps));
                }
                Err(AttemptError::Provider(provider_error)) => {
                    match &provider_error {
                        ProviderError::RateLimit { retry_after } => {
                            self.limiter.record_rate_limit(name, *retry_after);
                            warn!(provider = name, "rate limited, trying next candidate");
                        }
                        ProviderError::Unavailable(message) => {
                            self.limiter.record_error(name, "unavailable");
                            warn!(provider = name, %message, "unavailable, trying next candidate");
                        }
                        ProviderError::Api(message) => {
                            self.limiter.record_error(name, "api");
                            error!(provider = name, %message, "provider error, trying next candidate");
                        }
                    }
                    last_error = Some(provider_error);
                }
            }
        }

        match last_error {
            Some(last) => {
                error!(attempted = ?attempted, "all providers exhausted");
                Err(OrchestratorError::AllProvidersExhausted { attempted, last })
            }
            None => Err(OrchestratorError::NoUsableProvider(
                classification.category.to_string(),
            )),
        }
    }

    async fn attempt(
        &self,
        provider: &dyn Provider,
        classification: &ClassificationResult,
        system: &str,
        messages: &[Message],
    ) -> Result<OrchestratorResult, AttemptError> {
        let capabilities = provider.capabilities();
        let use_tool_loop =
            classification.requires_tools && capabilities.tool_use && !self.tools.is_empty();

        if use_tool_loop {
            return self.run_agent_loop(provider, system, messages).await;
        }

        let mut request =
            CompletionRequest::new(messages.to_vec()).with_system(system.to_string());
        if capabilities.json_output {
            request = request.with_json_output();
        }
        if classification.category == RequestCategory::WebSearch && capabilities.web_search {
            // No registered tools (or none needed): lean on the backend's
            // built-in grounding instead.
            request = request.with_web_search();
        }

        let response = provider
            .chat(&request)
            .await
            .map_err(AttemptError::Provider)?;
        self.record_usage(provider.name(), &response.usage);

        let parsed = parse_structured(&response.text);
        Ok(OrchestratorResult {
            response: parsed.response,
            intent: parsed.intent,
            state_changes: parsed.state_changes,
            provider: provider.name().to_string(),
            usage: response.usage,
            tools_used: Vec::new(),
            agent_steps: 0,
        })
    }

    /// The bounded agent loop: model call, tool execution, repeat. A reply
    /// without tool calls is the final answer; hitting the step ceiling is a
    /// hard failure, never a silently truncated result.
    async fn run_agent_loop(
        &self,
        provider: &dyn Provider,
        system: &str,
        messages: &[Message],
    ) -> Result<OrchestratorResult, AttemptError> {
        let catalog: Vec<ToolDefinition> =
            self.tools.iter().map(|t| t.definition.clone()).collect();
        let mut messages = messages.to_vec();
        let mut usage = Usage::empty();
        let mut tools_used: Vec<String> = Vec::new();

        for step in 1..=self.settings.max_agent_steps {
            let request = CompletionRequest::new(messages.clone())
                .with_system(system.to_string())
                .with_tools(catalog.clone());

            let response = provider
                .chat_with_tools(&request)
                .await
                .map_err(AttemptError::Provider)?;
            self.record_usage(provider.name(), &response.usage);
            usage.accumulate(&response.usage);

            if response.tool_calls.is_empty() {
                let parsed = parse_structured(&response.text);
                return Ok(OrchestratorResult {
                    response: parsed.response,
                    intent: parsed.intent,
                    state_changes: parsed.state_changes,
                    provider: provider.name().to_string(),
                    usage,
                    tools_used,
                    agent_steps: step as u32,
                });
            }

            debug!(
                provider = provider.name(),
                step,
                calls = response.tool_calls.len(),
                "executing tool calls"
            );

            let mut echo = Message::assistant();
            if !response.text.is_empty() {
                echo = echo.with_text(&response.text);
            }
            for call in &response.tool_calls {
                echo = echo.with_tool_call(call.clone());
            }
            messages.push(echo);

            let executions = response.tool_calls.iter().map(|call| self.execute_tool(call));
            let outputs = join_all(executions).await;

            for (call, output) in response.tool_calls.iter().zip(outputs) {
                if !tools_used.contains(&call.name) {
                    tools_used.push(call.name.clone());
                }
                messages.push(Message::tool(&call.id, &call.name).with_text(output));
            }
        }

        Err(AttemptError::LoopExceeded(self.settings.max_agent_steps))
    }

    /// Run one tool call. Every failure mode (unknown tool, bad arguments,
    /// executor error, timeout) becomes an inline string the model can react
    /// to on the next step.
    async fn execute_tool(&self, call: &ToolCall) -> String {
        let Some(tool) = self.tools.iter().find(|t| t.definition.name == call.name) else {
            warn!(tool = %call.name, "model requested unknown tool");
            return format!("Error: unknown tool '{}'", call.name);
        };

        if let Err(invalid) = tool.definition.check_arguments(&call.arguments) {
            warn!(tool = %call.name, %invalid, "rejecting tool call arguments");
            return format!("Error: {}", invalid);
        }

        match tokio::time::timeout(
            self.settings.tool_timeout,
            tool.executor.execute(call.arguments.clone()),
        )
        .await
        {
            Ok(Ok(result)) => result,
            Ok(Err(failure)) => {
                warn!(tool = %call.name, %failure, "tool executor failed");
                format!("Error: {}", failure)
            }
            Err(_) => {
                let timeout = ToolError::Timeout(self.settings.tool_timeout);
                warn!(tool = %call.name, "tool executor timed out");
                format!("Error: {}", timeout)
            }
        }
    }

    fn record_usage(&self, provider: &str, usage: &Usage) {
        let tokens = usage.total().unwrap_or(0).max(0) as u32;
        self.limiter.record_usage(provider, tokens);
    }
}

/// Fold the request text, any shared page context, and the image attachment
/// into the canonical user turn.
fn build_user_message(request: &IncomingRequest) -> Message {
    let mut text = request.text.clone();
    if let Some(context) = &request.context {
        if let Some(url) = context.url.as_deref().filter(|u| !u.trim().is_empty()) {
            text.push_str("\n\nShared link: ");
            text.push_str(url);
            if let Some(title) = &context.title {
                text.push_str(&format!(" ({})", title));
            }
        }
        if let Some(summary) = context.summary.as_deref().filter(|s| !s.trim().is_empty()) {
            text.push_str(&format!("\nPage summary: {}", summary));
        }
    }

    let mut message = Message::user().with_text(text);
    if let Some(image) = &request.image {
        message = message.with_image(BASE64.encode(&image.data), image.mime_type.as_str());
    }
    message
}
