//! Fixed-window rate limiting per client key

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{clock::Clock, config::RateLimitConfig};

/// Request counter for one client key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    pub count: u32,
    pub window_start: DateTime<Utc>,
}

/// Outcome of [`RateLimiter::admit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed {
        limit: u32,
        remaining: u32,
        reset_after_secs: u64,
    },
    Rejected {
        limit: u32,
        retry_after_secs: u64,
    },
}

impl RateDecision {
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Rate limiter for inbound proxy requests
pub struct RateLimiter {
    windows: DashMap<String, RateWindow>,
    window: Duration,
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        let window = i64::try_from(config.window_seconds.max(1))
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);

        Self {
            windows: DashMap::new(),
            window,
            config,
            clock,
        }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    #[must_use]
    pub const fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Count a request against `client_key`'s current window
    pub fn admit(&self, client_key: &str) -> RateDecision {
        let limit = self.config.max_requests;
        if !self.config.enabled {
            return RateDecision::Allowed {
                limit,
                remaining: limit,
                reset_after_secs: self.config.window_seconds,
            };
        }

        let now = self.clock.now();
        let mut window = self
            .windows
            .entry(client_key.to_string())
            .or_insert(RateWindow {
                count: 0,
                window_start: now,
            });

        if now >= self.window_end(window.window_start) {
            window.count = 0;
            window.window_start = now;
        }

        let reset_after_secs = secs_until(now, self.window_end(window.window_start));

        if window.count >= limit {
            warn!(
                "Rate limit exceeded for client {}: {} requests in current window",
                client_key, window.count
            );
            return RateDecision::Rejected {
                limit,
                retry_after_secs: reset_after_secs.max(1),
            };
        }

        window.count += 1;
        let remaining = limit - window.count;
        debug!(
            "Rate limit check passed for client {} ({} remaining)",
            client_key, remaining
        );

        RateDecision::Allowed {
            limit,
            remaining,
            reset_after_secs,
        }
    }

    /// Human-readable rejection message
    #[must_use]
    pub fn rejection_message(&self) -> String {
        let minutes = self.config.window_seconds.div_ceil(60);
        format!(
            "Too many requests from this client, please try again after {} minute{}",
            minutes,
            if minutes == 1 { "" } else { "s" }
        )
    }

    /// Drop windows that have fully elapsed; idle clients start fresh anyway
    pub fn cleanup_idle(&self) -> usize {
        let now = self.clock.now();
        let before = self.windows.len();
        self.windows
            .retain(|_, window| now < self.window_end(window.window_start));
        before.saturating_sub(self.windows.len())
    }

    fn window_end(&self, window_start: DateTime<Utc>) -> DateTime<Utc> {
        window_start
            .checked_add_signed(self.window)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Get current rate limiting statistics
    pub fn get_stats(&self) -> RateLimitStats {
        RateLimitStats {
            tracked_clients: self.windows.len(),
            max_requests: self.config.max_requests,
            window_seconds: self.config.window_seconds,
        }
    }
}

/// Rate limiting statistics
#[derive(Debug, serde::Serialize)]
pub struct RateLimitStats {
    pub tracked_clients: usize,
    pub max_requests: u32,
    pub window_seconds: u64,
}

fn secs_until(now: DateTime<Utc>, deadline: DateTime<Utc>) -> u64 {
    let millis = (deadline - now).num_milliseconds().max(0);
    u64::try_from(millis).unwrap_or(0).div_ceil(1000)
}
