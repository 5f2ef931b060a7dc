//! Runtime configuration for the orchestrator.
//!
//! Everything loads from the environment so deployments and tests configure
//! the same way; tests usually skip `from_env` and build [`Settings`]
//! directly with mock-server hosts.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use anyhow::Result;

use crate::limiter::RateLimitConfig;
use crate::providers::configs::{
    FromEnv, GeminiConfig, GroqConfig, MistralConfig, OpenRouterConfig, ProviderConfig,
};

const DEFAULT_PROVIDER: &str = "gemini";
const DEFAULT_MAX_AGENT_STEPS: usize = 5;
const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;

/// Orchestrator knobs plus per-provider quota ceilings and wire configs.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Last-resort provider when routing finds nothing usable.
    pub default_provider: String,
    /// When false, every request goes to the default provider with all
    /// others as fallbacks instead of consulting the category table.
    pub smart_routing: bool,
    /// Hard ceiling on model calls inside one agent loop.
    pub max_agent_steps: usize,
    /// Deadline for a single tool executor invocation.
    pub tool_timeout: Duration,
    /// Wire configs for every adapter, in registration order.
    pub providers: Vec<ProviderConfig>,
    /// Quota ceilings keyed by provider name. Providers without an entry
    /// fall back to [`RateLimitConfig::default`].
    pub rate_limits: HashMap<String, RateLimitConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_provider: DEFAULT_PROVIDER.to_string(),
            smart_routing: true,
            max_agent_steps: DEFAULT_MAX_AGENT_STEPS,
            tool_timeout: Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS),
            providers: vec![
                ProviderConfig::Gemini(GeminiConfig::default()),
                ProviderConfig::Groq(GroqConfig::default()),
                ProviderConfig::Mistral(MistralConfig::default()),
                ProviderConfig::OpenRouter(OpenRouterConfig::default()),
            ],
            rate_limits: free_tier_limits(),
        }
    }
}

impl Settings {
    /// Load settings from the environment. `.env` files are honored for
    /// local runs; unset variables fall back to defaults.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        Ok(Self {
            default_provider: env::var("SWITCHBOARD_DEFAULT_PROVIDER")
                .unwrap_or_else(|_| DEFAULT_PROVIDER.to_string()),
            smart_routing: env_flag("SWITCHBOARD_SMART_ROUTING", true),
            max_agent_steps: env_parse("SWITCHBOARD_MAX_AGENT_STEPS", DEFAULT_MAX_AGENT_STEPS),
            tool_timeout: Duration::from_secs(env_parse(
                "SWITCHBOARD_TOOL_TIMEOUT_SECS",
                DEFAULT_TOOL_TIMEOUT_SECS,
            )),
            providers: vec![
                ProviderConfig::Gemini(GeminiConfig::from_env()?),
                ProviderConfig::Groq(GroqConfig::from_env()?),
                ProviderConfig::Mistral(MistralConfig::from_env()?),
                ProviderConfig::OpenRouter(OpenRouterConfig::from_env()?),
            ],
            rate_limits: free_tier_limits(),
        })
    }
}

/// Free-tier ceilings for the stock lineup. Backoff is a flat minute; the
/// limiter doubles it after repeated non-quota errors.
fn free_tier_limits() -> HashMap<String, RateLimitConfig> {
    let backoff = Duration::from_secs(60);
    HashMap::from([
        (
            "gemini".to_string(),
            RateLimitConfig {
                requests_per_minute: 15,
                tokens_per_minute: 1_000_000,
                backoff,
            },
        ),
        (
            "groq".to_string(),
            RateLimitConfig {
                requests_per_minute: 30,
                tokens_per_minute: 20_000,
                backoff,
            },
        ),
        (
            "mistral".to_string(),
            RateLimitConfig {
                requests_per_minute: 60,
                tokens_per_minute: 500_000,
                backoff,
            },
        ),
        (
            "openrouter".to_string(),
            RateLimitConfig {
                requests_per_minute: 20,
                tokens_per_minute: 200_000,
                backoff,
            },
        ),
    ])
}

fn env_flag(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.trim(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}
