use std::time::Duration;

use thiserror::Error;

/// Failures surfaced by a single backend call.
///
/// All three kinds are recoverable through the fallback chain; they only
/// reach the caller wrapped in [`OrchestratorError::AllProvidersExhausted`].
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// The backend reported quota exhaustion (HTTP 429 or a vendor
    /// equivalent). Carries the backend's retry hint when it supplied one.
    #[error("rate limited (retry after: {retry_after:?})")]
    RateLimit { retry_after: Option<Duration> },

    /// Transient outage: 502/503/504, connect failures, timeouts.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// Anything else, including malformed or empty responses.
    #[error("provider error: {0}")]
    Api(String),
}

/// Failures raised by tool lookup, validation, or execution.
///
/// Inside the agent loop these are converted to inline `Error: ...` strings
/// fed back to the model; they never abort a request on their own.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {0}")]
    Execution(String),

    #[error("Tool timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

pub type ToolResult<T> = Result<T, ToolError>;

/// Terminal request-level failures returned by `process_message`.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// The tool loop hit its step ceiling without a final answer. This does
    /// not trigger fallback: another backend would re-run the same runaway
    /// task.
    #[error("agent loop exceeded {0} steps without a final answer")]
    AgentLoopExceeded(usize),

    /// Every candidate in the routing chain failed.
    #[error("all providers exhausted (tried: {}): {last}", .attempted.join(", "))]
    AllProvidersExhausted {
        attempted: Vec<String>,
        #[source]
        last: ProviderError,
    },

    /// The chain contained no provider we could even attempt.
    #[error("no usable provider for category {0}")]
    NoUsableProvider(String),
}
