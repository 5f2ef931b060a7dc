//! Category-based provider selection with quota-aware fallback chains.

use serde::Serialize;
use tracing::{info, warn};

use crate::classifier::RequestCategory;
use crate::config::Settings;
use crate::limiter::RateLimiter;
use crate::models::request::IncomingRequest;
use crate::providers::registry::ProviderRegistry;

/// Which provider to try first and in what order to fall back. Computed
/// fresh per request, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingDecision {
    pub provider: String,
    pub category: RequestCategory,
    pub fallbacks: Vec<String>,
    pub reason: String,
}

impl RoutingDecision {
    /// The primary followed by every fallback.
    pub fn chain(&self) -> Vec<&str> {
        std::iter::once(self.provider.as_str())
            .chain(self.fallbacks.iter().map(String::as_str))
            .collect()
    }
}

/// Preferred provider and fallbacks per category. Vision only lists
/// vision-capable backends; web search prefers the backend with built-in
/// grounding.
fn category_chain(category: RequestCategory) -> (&'static str, &'static [&'static str]) {
    match category {
        RequestCategory::SimpleChat => ("groq", &["gemini", "mistral", "openrouter"]),
        RequestCategory::ComplexReasoning => ("gemini", &["openrouter", "mistral", "groq"]),
        RequestCategory::WebSearch => ("gemini", &["openrouter", "groq", "mistral"]),
        RequestCategory::Vision => ("gemini", &["openrouter"]),
        RequestCategory::CodeTask => ("mistral", &["groq", "gemini", "openrouter"]),
        RequestCategory::StateUpdate => ("groq", &["gemini", "mistral", "openrouter"]),
    }
}

/// Resolve the routing chain for one request.
///
/// An explicit, registered provider override wins unconditionally and skips
/// quota filtering. With smart routing off, the default provider leads and
/// every other registered provider follows in registration order. Otherwise
/// the category table picks the first usable candidate, falling back to the
/// configured default regardless of its quota as a last resort.
pub fn resolve_routing(
    request: &IncomingRequest,
    category: RequestCategory,
    registry: &ProviderRegistry,
    limiter: &RateLimiter,
    settings: &Settings,
) -> RoutingDecision {
    if let Some(name) = &request.provider_override {
        if registry.contains(name) {
            let decision = RoutingDecision {
                provider: name.clone(),
                category,
                fallbacks: Vec::new(),
                reason: "explicit provider override".to_string(),
            };
            info!(provider = %name, ?category, "routing: caller override");
            return decision;
        }
        warn!(
            provider = %name,
            "ignoring override for unregistered provider"
        );
    }

    if !settings.smart_routing {
        let fallbacks: Vec<String> = registry
            .names()
            .into_iter()
            .filter(|name| *name != settings.default_provider)
            .map(String::from)
            .collect();
        return RoutingDecision {
            provider: settings.default_provider.clone(),
            category,
            fallbacks,
            reason: "smart routing disabled".to_string(),
        };
    }

    let (preferred, fallbacks) = category_chain(category);
    let table: Vec<&str> = std::iter::once(preferred)
        .chain(fallbacks.iter().copied())
        .filter(|name| registry.contains(name))
        .collect();

    let (chosen, reason) = match table
        .iter()
        .find(|name| {
            registry
                .get(name)
                .map_or(false, |p| p.is_available())
                && limiter.can_use(name)
        }) {
        Some(name) => (
            name.to_string(),
            format!("preferred for {} with quota remaining", category),
        ),
        // Last resort: the default, even if rate limited. The attempt will
        // surface the failure to the caller.
        None => (
            settings.default_provider.clone(),
            "all candidates exhausted, using default".to_string(),
        ),
    };

    let chain: Vec<String> = table
        .into_iter()
        .filter(|name| *name != chosen)
        .map(String::from)
        .collect();

    let decision = RoutingDecision {
        provider: chosen,
        category,
        fallbacks: chain,
        reason,
    };
    info!(
        provider = %decision.provider,
        ?category,
        fallbacks = ?decision.fallbacks,
        reason = %decision.reason,
        "routing resolved"
    );
    decision
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::MockProvider;
    use std::collections::HashMap;

    fn registry(names: &[&str]) -> ProviderRegistry {
        ProviderRegistry::with_providers(
            names
                .iter()
                .map(|name| Box::new(MockProvider::new(name, vec![])) as _)
                .collect(),
        )
    }

    fn settings() -> Settings {
        Settings::default()
    }

    #[test]
    fn override_wins_regardless_of_quota() {
        let registry = registry(&["gemini", "groq"]);
        let limiter = RateLimiter::new(HashMap::new());
        // Exhaust groq entirely.
        limiter.record_rate_limit("groq", None);

        let request = IncomingRequest::text("hello").with_provider("groq");
        let decision = resolve_routing(
            &request,
            RequestCategory::SimpleChat,
            &registry,
            &limiter,
            &settings(),
        );
        assert_eq!(decision.provider, "groq");
        assert!(decision.fallbacks.is_empty());
    }

    #[test]
    fn unregistered_override_falls_through_to_heuristics() {
        let registry = registry(&["gemini", "groq"]);
        let limiter = RateLimiter::new(HashMap::new());

        let request = IncomingRequest::text("hello").with_provider("acme");
        let decision = resolve_routing(
            &request,
            RequestCategory::SimpleChat,
            &registry,
            &limiter,
            &settings(),
        );
        assert_eq!(decision.provider, "groq");
    }

    #[test]
    fn smart_routing_disabled_uses_default_with_all_fallbacks() {
        let registry = registry(&["gemini", "groq", "mistral"]);
        let limiter = RateLimiter::new(HashMap::new());
        let mut settings = settings();
        settings.smart_routing = false;
        settings.default_provider = "groq".to_string();

        let decision = resolve_routing(
            &IncomingRequest::text("hello"),
            RequestCategory::CodeTask,
            &registry,
            &limiter,
            &settings,
        );
        assert_eq!(decision.provider, "groq");
        assert_eq!(decision.fallbacks, vec!["gemini", "mistral"]);
    }

    #[test]
    fn category_table_prefers_vision_capable_provider() {
        let registry = registry(&["gemini", "groq", "mistral", "openrouter"]);
        let limiter = RateLimiter::new(HashMap::new());

        let decision = resolve_routing(
            &IncomingRequest::text("what is this?"),
            RequestCategory::Vision,
            &registry,
            &limiter,
            &settings(),
        );
        assert_eq!(decision.provider, "gemini");
        assert_eq!(decision.fallbacks, vec!["openrouter"]);
    }

    #[test]
    fn rate_limited_preferred_is_skipped() {
        let registry = registry(&["gemini", "groq", "mistral", "openrouter"]);
        let limiter = RateLimiter::new(HashMap::new());
        limiter.record_rate_limit("gemini", None);

        let decision = resolve_routing(
            &IncomingRequest::text("compare options"),
            RequestCategory::ComplexReasoning,
            &registry,
            &limiter,
            &settings(),
        );
        assert_eq!(decision.provider, "openrouter");
        assert!(!decision.fallbacks.contains(&"openrouter".to_string()));
        // gemini stays in the chain; its backoff may expire before retry.
        assert!(decision.fallbacks.contains(&"gemini".to_string()));
    }

    #[test]
    fn never_returns_an_unregistered_provider() {
        let registry = registry(&["groq"]);
        let limiter = RateLimiter::new(HashMap::new());
        let mut settings = settings();
        settings.default_provider = "groq".to_string();

        let decision = resolve_routing(
            &IncomingRequest::text("what is this?"),
            RequestCategory::Vision,
            &registry,
            &limiter,
            &settings,
        );
        // Neither vision candidate is registered, so the chain is empty and
        // the registered default is the last resort.
        assert_eq!(decision.provider, "groq");
        assert!(decision.fallbacks.is_empty());
    }

    #[test]
    fn everyone_exhausted_falls_back_to_default() {
        let registry = registry(&["gemini", "groq", "mistral", "openrouter"]);
        let limiter = RateLimiter::new(HashMap::new());
        for name in ["gemini", "groq", "mistral", "openrouter"] {
            limiter.record_rate_limit(name, None);
        }

        let decision = resolve_routing(
            &IncomingRequest::text("hi"),
            RequestCategory::SimpleChat,
            &registry,
            &limiter,
            &settings(),
        );
        assert_eq!(decision.provider, "gemini");
        assert_eq!(decision.reason, "all candidates exhausted, using default");
    }
}
