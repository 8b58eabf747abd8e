//! Fixed-window rate limiter over the backend's atomic increment

use super::headers::rate_limit_headers;
use super::window;
use crate::backend::{BackendProvider, BackendResult, KeyValueBackend};
use crate::clock::SharedClock;
use crate::config::RateLimitConfig;
use crate::logging::log_degradation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of one rate-limit check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u64,
    /// `max(0, limit - count)`
    pub remaining: u64,
    /// When the current window closes
    pub reset_at: DateTime<Utc>,
    /// Requests seen in this window including this one; 0 when the backend
    /// was unavailable
    pub count: u64,
}

impl RateLimitDecision {
    pub fn reset_at_ms(&self) -> u64 {
        u64::try_from(self.reset_at.timestamp_millis()).unwrap_or(0)
    }
}

/// Per-request settings for `middleware`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitOptions {
    pub limit: u64,
    pub window_seconds: u64,
    pub key_prefix: String,
}

impl Default for RateLimitOptions {
    fn default() -> Self {
        Self::from(&RateLimitConfig::default())
    }
}

impl From<&RateLimitConfig> for RateLimitOptions {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            limit: config.limit,
            window_seconds: config.window_seconds,
            key_prefix: config.key_prefix.clone(),
        }
    }
}

/// What an HTTP layer needs to answer a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResponse {
    pub success: bool,
    pub decision: RateLimitDecision,
    pub headers: Vec<(&'static str, String)>,
}

/// Fixed-window request counter per identifier
///
/// Allows up to `2 * limit` requests across a window boundary. Fails open:
/// when the backend is unreachable every request is allowed.
pub struct RateLimiter<B: KeyValueBackend = BackendProvider> {
    backend: Arc<B>,
    clock: SharedClock,
    defaults: RateLimitOptions,
}

impl<B: KeyValueBackend> Clone for RateLimiter<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            clock: Arc::clone(&self.clock),
            defaults: self.defaults.clone(),
        }
    }
}

impl<B: KeyValueBackend> fmt::Debug for RateLimiter<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("backend", &self.backend.provider_name())
            .field("defaults", &self.defaults)
            .finish()
    }
}

impl<B: KeyValueBackend> RateLimiter<B> {
    pub fn new(backend: Arc<B>, clock: SharedClock) -> Self {
        Self {
            backend,
            clock,
            defaults: RateLimitOptions::default(),
        }
    }

    pub fn with_defaults(mut self, defaults: RateLimitOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// Options `middleware` callers use when they have no override
    pub fn defaults(&self) -> &RateLimitOptions {
        &self.defaults
    }

    /// Count this request against `identifier`'s current window
    pub async fn try_check_limit(
        &self,
        identifier: &str,
        limit: u64,
        window_seconds: u64,
    ) -> BackendResult<RateLimitDecision> {
        let window_seconds = window::clamp_window(window_seconds);
        let window_index = window::window_index(self.clock.now_ms(), window_seconds);
        let key = window::counter_key(identifier, window_index);

        let count = self.backend.increment(&key).await?;
        if count == 1 {
            self.start_window_expiry(&key, window_seconds).await;
        }

        let count = u64::try_from(count).unwrap_or(0);
        let decision = RateLimitDecision {
            allowed: count <= limit,
            limit,
            remaining: window::remaining(limit, count),
            reset_at: window::to_datetime(window::reset_at_ms(window_index, window_seconds)),
            count,
        };

        debug!(
            key = %key,
            count = count,
            limit = limit,
            allowed = decision.allowed,
            "Rate limit checked"
        );
        Ok(decision)
    }

    /// Like `try_check_limit`, but allows the request when the backend fails
    pub async fn check_limit(
        &self,
        identifier: &str,
        limit: u64,
        window_seconds: u64,
    ) -> RateLimitDecision {
        match self.try_check_limit(identifier, limit, window_seconds).await {
            Ok(decision) => decision,
            Err(e) => {
                log_degradation("rate_limiter", "check_limit", &e);
                let window_seconds = window::clamp_window(window_seconds);
                let window_index = window::window_index(self.clock.now_ms(), window_seconds);
                RateLimitDecision {
                    allowed: true,
                    limit,
                    remaining: limit,
                    reset_at: window::to_datetime(window::reset_at_ms(
                        window_index,
                        window_seconds,
                    )),
                    count: 0,
                }
            }
        }
    }

    /// Check `<key_prefix>:<identifier>` and build the response headers
    pub async fn middleware(&self, identifier: &str, options: &RateLimitOptions) -> RateLimitResponse {
        let scoped = format!("{}:{}", options.key_prefix, identifier);
        let decision = self
            .check_limit(&scoped, options.limit, options.window_seconds)
            .await;
        let headers = rate_limit_headers(&decision, self.clock.now_ms());

        RateLimitResponse {
            success: decision.allowed,
            decision,
            headers,
        }
    }

    // The counter was just created. If this fails the key outlives its
    // window, but later windows use a different key so throttling is
    // unaffected.
    async fn start_window_expiry(&self, key: &str, window_seconds: u64) {
        match self
            .backend
            .expire(key, Duration::from_secs(window_seconds))
            .await
        {
            Ok(true) => {}
            Ok(false) => warn!(key = key, "Rate counter vanished before its expiry was set"),
            Err(e) => warn!(key = key, error = %e, "Failed to set rate counter expiry"),
        }
    }
}
