//! Per-provider configuration structs, loaded from the environment.
//!
//! Every config carries an optional API key: a missing key leaves the
//! provider constructible (so it still shows up in status output) but
//! unavailable for routing. Hosts are overridable for tests.

use std::env;
use std::time::Duration;

use anyhow::Result;

const GEMINI_HOST: &str = "https://generativelanguage.googleapis.com";
const GROQ_HOST: &str = "https://api.groq.com/openai";
const MISTRAL_HOST: &str = "https://api.mistral.ai";
const OPENROUTER_HOST: &str = "https://openrouter.ai/api";

const GEMINI_DEFAULT_MODEL: &str = "gemini-2.0-flash";
const GROQ_DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
const MISTRAL_DEFAULT_MODEL: &str = "mistral-small-latest";
const OPENROUTER_DEFAULT_MODEL: &str = "google/gemini-2.0-flash-exp:free";

pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Environment loading for provider configs.
pub trait FromEnv {
    /// Load configuration from environment variables.
    fn from_env() -> Result<Self>
    where
        Self: Sized;

    /// Helper to read environment variables with a default.
    fn get_env(key: &str, required: bool, default: Option<String>) -> Result<Option<String>> {
        match env::var(key) {
            Ok(value) => Ok(Some(value)),
            Err(env::VarError::NotPresent) if !required => Ok(default),
            Err(env::VarError::NotPresent) => Err(anyhow::anyhow!(
                "Environment variable '{}' is required but not set.",
                key
            )),
            Err(e) => Err(e.into()),
        }
    }
}

/// The outbound HTTP deadline shared by all adapters.
fn request_timeout() -> Duration {
    let secs = env::var("SWITCHBOARD_REQUEST_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    Duration::from_secs(secs)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub host: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            host: GEMINI_HOST.to_string(),
            api_key: None,
            model: GEMINI_DEFAULT_MODEL.to_string(),
            temperature: None,
            max_tokens: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl FromEnv for GeminiConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            host: Self::get_env("GEMINI_HOST", false, Some(GEMINI_HOST.to_string()))?
                .unwrap_or_else(|| GEMINI_HOST.to_string()),
            api_key: non_empty(Self::get_env("GEMINI_API_KEY", false, None)?),
            model: Self::get_env("GEMINI_MODEL", false, None)?
                .unwrap_or_else(|| GEMINI_DEFAULT_MODEL.to_string()),
            temperature: None,
            max_tokens: None,
            timeout: request_timeout(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct GroqConfig {
    pub host: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
}

impl Default for GroqConfig {
    fn default() -> Self {
        Self {
            host: GROQ_HOST.to_string(),
            api_key: None,
            model: GROQ_DEFAULT_MODEL.to_string(),
            temperature: None,
            max_tokens: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl FromEnv for GroqConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            host: Self::get_env("GROQ_HOST", false, Some(GROQ_HOST.to_string()))?
                .unwrap_or_else(|| GROQ_HOST.to_string()),
            api_key: non_empty(Self::get_env("GROQ_API_KEY", false, None)?),
            model: Self::get_env("GROQ_MODEL", false, None)?
                .unwrap_or_else(|| GROQ_DEFAULT_MODEL.to_string()),
            temperature: None,
            max_tokens: None,
            timeout: request_timeout(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct MistralConfig {
    pub host: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
}

impl Default for MistralConfig {
    fn default() -> Self {
        Self {
            host: MISTRAL_HOST.to_string(),
            api_key: None,
            model: MISTRAL_DEFAULT_MODEL.to_string(),
            temperature: None,
            max_tokens: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl FromEnv for MistralConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            host: Self::get_env("MISTRAL_HOST", false, Some(MISTRAL_HOST.to_string()))?
                .unwrap_or_else(|| MISTRAL_HOST.to_string()),
            api_key: non_empty(Self::get_env("MISTRAL_API_KEY", false, None)?),
            model: Self::get_env("MISTRAL_MODEL", false, None)?
                .unwrap_or_else(|| MISTRAL_DEFAULT_MODEL.to_string()),
            temperature: None,
            max_tokens: None,
            timeout: request_timeout(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct OpenRouterConfig {
    pub host: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            host: OPENROUTER_HOST.to_string(),
            api_key: None,
            model: OPENROUTER_DEFAULT_MODEL.to_string(),
            temperature: None,
            max_tokens: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl FromEnv for OpenRouterConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            host: Self::get_env("OPENROUTER_HOST", false, Some(OPENROUTER_HOST.to_string()))?
                .unwrap_or_else(|| OPENROUTER_HOST.to_string()),
            api_key: non_empty(Self::get_env("OPENROUTER_API_KEY", false, None)?),
            model: Self::get_env("OPENROUTER_MODEL", false, None)?
                .unwrap_or_else(|| OPENROUTER_DEFAULT_MODEL.to_string()),
            temperature: None,
            max_tokens: None,
            timeout: request_timeout(),
        })
    }
}

/// Unified enum to wrap different provider configurations.
#[derive(Debug, Clone)]
pub enum ProviderConfig {
    Gemini(GeminiConfig),
    Groq(GroqConfig),
    Mistral(MistralConfig),
    OpenRouter(OpenRouterConfig),
}
