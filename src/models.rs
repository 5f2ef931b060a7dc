//! The canonical objects passed between the classifier, router and providers.
//!
//! Every backend speaks its own wire dialect (OpenAI-style chat completions,
//! Gemini's generateContent, ...). Adapters convert to and from these structs
//! at the wire boundary using to/from helpers, so the rest of the crate never
//! sees a vendor shape.

pub mod content;
pub mod message;
pub mod request;
pub mod tool;
