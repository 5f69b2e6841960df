//! Advisory sliding-window rate limiting.
//!
//! Process-wide and in-memory: a map from rate-limit key to recent request
//! timestamps, pruned lazily on every check and periodically by `sweep`.
//! The clock is constructor-injected so tests control time, and the limiter
//! is an injected component rather than module-level state so a shared
//! backend can replace it for multi-instance deployments. Surfaces check it
//! before invoking the core; the core trusts the check already happened.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

/// Millisecond clock abstraction.
pub trait Clock: Send + Sync {
    /// Milliseconds since some fixed origin.
    fn now_ms(&self) -> i64;
}

/// Wall-clock implementation used outside tests.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// Limit applied to one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests allowed within one window.
    pub max_requests: usize,
    /// Window length in milliseconds.
    pub window_ms: i64,
}

/// Result of one limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Milliseconds until the oldest counted request falls out of the
    /// window. Zero when the request was allowed.
    pub reset_ms: i64,
}

/// Sliding-window limiter over an explicit per-key timestamp store.
pub struct SlidingWindowLimiter {
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, Vec<i64>>>,
}

impl SlidingWindowLimiter {
    /// Creates a limiter reading time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a limiter on the system clock.
    pub fn with_system_clock() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    /// Checks and records one request for `key`.
    ///
    /// Timestamps older than the window are pruned before counting. An
    /// allowed request is recorded immediately; a denied one is not, so
    /// hammering a denied key does not extend its penalty.
    pub fn check(&self, key: &str, config: &RateLimitConfig) -> Decision {
        let now = self.clock.now_ms();
        let mut entries = self.entries.lock().expect("limiter mutex poisoned");
        let timestamps = entries.entry(key.to_string()).or_default();

        timestamps.retain(|&t| now - t < config.window_ms);

        if timestamps.len() < config.max_requests {
            timestamps.push(now);
            return Decision {
                allowed: true,
                reset_ms: 0,
            };
        }

        let oldest = timestamps.first().copied().unwrap_or(now);
        let reset_ms = (config.window_ms - (now - oldest)).max(0);
        tracing::warn!(key, reset_ms, "rate limit exceeded");
        Decision {
            allowed: false,
            reset_ms,
        }
    }

    /// Drops keys whose every timestamp is older than `ttl_ms`.
    ///
    /// Lazy pruning in `check` only touches keys that stay active; this is
    /// the periodic cleanup for keys that went quiet. Returns the number of
    /// keys removed.
    pub fn sweep(&self, ttl_ms: i64) -> usize {
        let now = self.clock.now_ms();
        let mut entries = self.entries.lock().expect("limiter mutex poisoned");
        let before = entries.len();
        entries.retain(|_, timestamps| timestamps.iter().any(|&t| now - t < ttl_ms));
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(removed, "rate limiter sweep");
        }
        removed
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.entries.lock().expect("limiter mutex poisoned").len()
    }
}
