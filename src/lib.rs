//! switchboard routes conversational requests across interchangeable LLM
//! backends: classify without spending a model call, pick a provider that
//! has quota left, fall back across a bounded chain on transient failure,
//! and run a bounded tool loop when a request needs external actions.

pub mod classifier;
pub mod config;
pub mod errors;
pub mod limiter;
pub mod models;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod providers;
pub mod routing;
