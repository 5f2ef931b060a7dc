pub mod base;
pub mod configs;
pub mod gemini;
pub mod groq;
pub mod mistral;
pub mod openrouter;
pub mod registry;
pub mod utils;

#[cfg(test)]
pub mod mock;
