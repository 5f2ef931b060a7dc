//! Per-provider quota windows and backoff.
//!
//! Pure in-memory state machine: a 60-second rolling window of remaining
//! requests and tokens per provider, plus a backoff timer armed by quota
//! trips or repeated errors. One instance is owned by one orchestrator;
//! nothing here is global. Every public method has an `*_at` twin taking an
//! explicit [`Instant`] so tests can drive a synthetic clock.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

/// Length of the rolling quota window.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Consecutive non-quota errors that force a backoff.
const ERROR_BACKOFF_THRESHOLD: u32 = 3;

/// Per-provider ceilings and the pause applied after a quota trip.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub tokens_per_minute: u32,
    pub backoff: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 15,
            tokens_per_minute: 100_000,
            backoff: Duration::from_secs(60),
        }
    }
}

/// Snapshot of one provider's quota state for status surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitState {
    pub requests_remaining: u32,
    pub tokens_remaining: u32,
    pub window_resets_in_secs: u64,
    pub backed_off: bool,
    pub backoff_remaining_secs: u64,
    pub consecutive_errors: u32,
    pub last_error: Option<String>,
}

#[derive(Debug)]
struct ProviderWindow {
    requests_remaining: u32,
    tokens_remaining: u32,
    window_started: Instant,
    backoff_until: Option<Instant>,
    consecutive_errors: u32,
    last_error: Option<String>,
}

impl ProviderWindow {
    fn fresh(config: &RateLimitConfig, now: Instant) -> Self {
        Self {
            requests_remaining: config.requests_per_minute,
            tokens_remaining: config.tokens_per_minute,
            window_started: now,
            backoff_until: None,
            consecutive_errors: 0,
            last_error: None,
        }
    }

    fn reset_window(&mut self, config: &RateLimitConfig, now: Instant) {
        self.requests_remaining = config.requests_per_minute;
        self.tokens_remaining = config.tokens_per_minute;
        self.window_started = now;
    }

    fn snapshot(&self, now: Instant) -> RateLimitState {
        let elapsed = now.duration_since(self.window_started);
        let backoff_remaining = self
            .backoff_until
            .map(|until| until.saturating_duration_since(now))
            .unwrap_or_default();

        RateLimitState {
            requests_remaining: self.requests_remaining,
            tokens_remaining: self.tokens_remaining,
            window_resets_in_secs: WINDOW.saturating_sub(elapsed).as_secs(),
            backed_off: !backoff_remaining.is_zero(),
            backoff_remaining_secs: backoff_remaining.as_secs(),
            consecutive_errors: self.consecutive_errors,
            last_error: self.last_error.clone(),
        }
    }
}

/// Tracks quota windows and backoff per provider name.
///
/// Concurrent requests share one limiter, so all bookkeeping happens under a
/// single mutex; every operation is a handful of integer updates.
pub struct RateLimiter {
    configs: HashMap<String, RateLimitConfig>,
    default_config: RateLimitConfig,
    windows: Mutex<HashMap<String, ProviderWindow>>,
}

impl RateLimiter {
    pub fn new(configs: HashMap<String, RateLimitConfig>) -> Self {
        Self {
            configs,
            default_config: RateLimitConfig::default(),
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn config_for(&self, provider: &str) -> &RateLimitConfig {
        self.configs.get(provider).unwrap_or(&self.default_config)
    }

    /// True when the provider is neither backed off nor out of quota.
    pub fn can_use(&self, provider: &str) -> bool {
        self.can_use_at(provider, Instant::now())
    }

    pub fn can_use_at(&self, provider: &str, now: Instant) -> bool {
        let config = self.config_for(provider);
        let mut windows = self.windows.lock().unwrap();
        let window = windows
            .entry(provider.to_string())
            .or_insert_with(|| ProviderWindow::fresh(config, now));

        if let Some(until) = window.backoff_until {
            if now < until {
                return false;
            }
            window.backoff_until = None;
        }

        if now.duration_since(window.window_started) >= WINDOW {
            debug!(provider, "quota window elapsed, resetting counters");
            window.reset_window(config, now);
        }

        window.requests_remaining > 0 && window.tokens_remaining > 0
    }

    /// Record one confirmed successful call. Clears the consecutive-error
    /// count; counters floor at zero.
    pub fn record_usage(&self, provider: &str, tokens_used: u32) {
        self.record_usage_at(provider, tokens_used, Instant::now());
    }

    pub fn record_usage_at(&self, provider: &str, tokens_used: u32, now: Instant) {
        let config = self.config_for(provider);
        let mut windows = self.windows.lock().unwrap();
        let window = windows
            .entry(provider.to_string())
            .or_insert_with(|| ProviderWindow::fresh(config, now));

        if now.duration_since(window.window_started) >= WINDOW {
            window.reset_window(config, now);
        }

        window.requests_remaining = window.requests_remaining.saturating_sub(1);
        window.tokens_remaining = window.tokens_remaining.saturating_sub(tokens_used);
        window.consecutive_errors = 0;
        window.last_error = None;

        debug!(
            provider,
            tokens_used,
            requests_remaining = window.requests_remaining,
            tokens_remaining = window.tokens_remaining,
            "recorded usage"
        );
    }

    /// The provider reported quota exhaustion: back off for its retry hint
    /// (when given) or the configured duration, and zero remaining requests.
    pub fn record_rate_limit(&self, provider: &str, retry_after: Option<Duration>) {
        self.record_rate_limit_at(provider, retry_after, Instant::now());
    }

    pub fn record_rate_limit_at(
        &self,
        provider: &str,
        retry_after: Option<Duration>,
        now: Instant,
    ) {
        let config = self.config_for(provider);
        let backoff = retry_after.unwrap_or(config.backoff);
        let mut windows = self.windows.lock().unwrap();
        let window = windows
            .entry(provider.to_string())
            .or_insert_with(|| ProviderWindow::fresh(config, now));

        window.backoff_until = Some(now + backoff);
        window.requests_remaining = 0;
        window.consecutive_errors += 1;
        window.last_error = Some("rate_limit".to_string());

        warn!(
            provider,
            backoff_secs = backoff.as_secs(),
            "provider rate limited, backing off"
        );
    }

    /// A non-quota failure (timeout, 5xx). Repeated failures indicate a
    /// sicker outage than a quota trip, so the third consecutive error forces
    /// a double-length backoff.
    pub fn record_error(&self, provider: &str, tag: &str) {
        self.record_error_at(provider, tag, Instant::now());
    }

    pub fn record_error_at(&self, provider: &str, tag: &str, now: Instant) {
        let config = self.config_for(provider);
        let backoff = config.backoff * 2;
        let mut windows = self.windows.lock().unwrap();
        let window = windows
            .entry(provider.to_string())
            .or_insert_with(|| ProviderWindow::fresh(config, now));

        window.consecutive_errors += 1;
        window.last_error = Some(tag.to_string());

        if window.consecutive_errors >= ERROR_BACKOFF_THRESHOLD {
            window.backoff_until = Some(now + backoff);
            warn!(
                provider,
                consecutive_errors = window.consecutive_errors,
                backoff_secs = backoff.as_secs(),
                "repeated provider errors, backing off"
            );
        }
    }

    /// Snapshot every provider seen so far. Providers appear after their
    /// first use (state initializes lazily).
    pub fn all_states(&self) -> HashMap<String, RateLimitState> {
        self.all_states_at(Instant::now())
    }

    pub fn all_states_at(&self, now: Instant) -> HashMap<String, RateLimitState> {
        let windows = self.windows.lock().unwrap();
        windows
            .iter()
            .map(|(name, window)| (name.clone(), window.snapshot(now)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(requests: u32, tokens: u32) -> RateLimiter {
        let mut configs = HashMap::new();
        configs.insert(
            "gemini".to_string(),
            RateLimitConfig {
                requests_per_minute: requests,
                tokens_per_minute: tokens,
                backoff: Duration::from_secs(60),
            },
        );
        RateLimiter::new(configs)
    }

    #[test]
    fn fresh_provider_is_usable() {
        let limiter = limiter(2, 1000);
        assert!(limiter.can_use("gemini"));
    }

    #[test]
    fn unknown_provider_falls_back_to_default_config() {
        let limiter = limiter(2, 1000);
        assert!(limiter.can_use("mystery"));
        let states = limiter.all_states();
        assert_eq!(states["mystery"].requests_remaining, 15);
    }

    #[test]
    fn exhausting_requests_blocks_until_window_reset() {
        let limiter = limiter(2, 1000);
        let now = Instant::now();

        limiter.record_usage_at("gemini", 10, now);
        limiter.record_usage_at("gemini", 10, now);
        assert!(!limiter.can_use_at("gemini", now));

        // 59s in: still the same window.
        assert!(!limiter.can_use_at("gemini", now + Duration::from_secs(59)));
        // 60s: window elapsed, counters reset.
        assert!(limiter.can_use_at("gemini", now + Duration::from_secs(60)));
    }

    #[test]
    fn exhausting_tokens_blocks_too() {
        let limiter = limiter(10, 100);
        let now = Instant::now();
        limiter.record_usage_at("gemini", 100, now);
        assert!(!limiter.can_use_at("gemini", now));
    }

    #[test]
    fn counters_floor_at_zero() {
        let limiter = limiter(1, 50);
        let now = Instant::now();
        limiter.record_usage_at("gemini", 10_000, now);
        limiter.record_usage_at("gemini", 10_000, now);

        let states = limiter.all_states_at(now);
        assert_eq!(states["gemini"].requests_remaining, 0);
        assert_eq!(states["gemini"].tokens_remaining, 0);
    }

    #[test]
    fn backoff_blocks_strictly_before_expiry() {
        let limiter = limiter(5, 1000);
        let now = Instant::now();
        limiter.record_rate_limit_at("gemini", Some(Duration::from_secs(30)), now);

        assert!(!limiter.can_use_at("gemini", now));
        assert!(!limiter.can_use_at("gemini", now + Duration::from_secs(29)));
        // Eligible at expiry. The backoff zeroed requests, but 30s of backoff
        // keeps us inside the original window, so the reset has not happened
        // yet; usable again once the window rolls over.
        assert!(!limiter.can_use_at("gemini", now + Duration::from_secs(30)));
        assert!(limiter.can_use_at("gemini", now + Duration::from_secs(60)));
    }

    #[test]
    fn backoff_expiry_at_window_boundary_is_usable() {
        let limiter = limiter(5, 1000);
        let now = Instant::now();
        limiter.record_rate_limit_at("gemini", Some(Duration::from_secs(60)), now);

        // At exactly the expiry instant the backoff is cleared and the
        // elapsed window resets the zeroed counters.
        assert!(limiter.can_use_at("gemini", now + Duration::from_secs(60)));
    }

    #[test]
    fn rate_limit_uses_configured_backoff_when_no_hint() {
        let limiter = limiter(5, 1000);
        let now = Instant::now();
        limiter.record_rate_limit_at("gemini", None, now);

        let states = limiter.all_states_at(now);
        assert!(states["gemini"].backed_off);
        assert_eq!(states["gemini"].backoff_remaining_secs, 60);
        assert_eq!(states["gemini"].requests_remaining, 0);
        assert_eq!(states["gemini"].last_error.as_deref(), Some("rate_limit"));
    }

    #[test]
    fn third_consecutive_error_forces_double_backoff() {
        let limiter = limiter(5, 1000);
        let now = Instant::now();

        limiter.record_error_at("gemini", "unavailable", now);
        limiter.record_error_at("gemini", "unavailable", now);
        assert!(limiter.can_use_at("gemini", now));

        limiter.record_error_at("gemini", "unavailable", now);
        assert!(!limiter.can_use_at("gemini", now));
        // Double the configured 60s backoff.
        assert!(!limiter.can_use_at("gemini", now + Duration::from_secs(119)));
        assert!(limiter.can_use_at("gemini", now + Duration::from_secs(120)));
    }

    #[test]
    fn usage_clears_consecutive_errors() {
        let limiter = limiter(5, 1000);
        let now = Instant::now();

        limiter.record_error_at("gemini", "unavailable", now);
        limiter.record_error_at("gemini", "unavailable", now);
        limiter.record_usage_at("gemini", 10, now);
        limiter.record_error_at("gemini", "unavailable", now);

        // The success reset the streak, so three-in-a-row never happened.
        assert!(limiter.can_use_at("gemini", now));
        let states = limiter.all_states_at(now);
        assert_eq!(states["gemini"].consecutive_errors, 1);
    }

    #[test]
    fn snapshot_reports_window_countdown() {
        let limiter = limiter(5, 1000);
        let now = Instant::now();
        limiter.record_usage_at("gemini", 100, now);

        let states = limiter.all_states_at(now + Duration::from_secs(20));
        assert_eq!(states["gemini"].window_resets_in_secs, 40);
        assert_eq!(states["gemini"].requests_remaining, 4);
        assert_eq!(states["gemini"].tokens_remaining, 900);
        assert!(!states["gemini"].backed_off);
    }
}
