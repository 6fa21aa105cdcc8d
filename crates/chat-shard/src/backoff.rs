//! Reconnect backoff policy
//!
//! Grows the reconnect interval with a random factor on each failed attempt
//! and resets once a session fully establishes.

use rand::Rng;
use std::time::Duration;

/// Initial reconnect interval in milliseconds
const INITIAL_INTERVAL_MS: u64 = 1_000;

/// Ceiling for the reconnect interval in milliseconds
const MAX_INTERVAL_MS: u64 = 30_000;

/// Reconnect interval and attempt bookkeeping
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    interval_ms: u64,
    attempts: u32,
}

impl ReconnectPolicy {
    /// Create a policy at the initial interval
    #[must_use]
    pub fn new() -> Self {
        Self {
            interval_ms: INITIAL_INTERVAL_MS,
            attempts: 0,
        }
    }

    /// Current reconnect delay
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Connect attempts since the last fully established session
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Count a `connect()` call
    pub fn record_attempt(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }

    /// Grow the interval after a failed attempt
    ///
    /// Multiplies by a uniform random factor in `[1, 3)`, rounded, capped at
    /// 30 seconds.
    pub fn record_failure(&mut self) {
        let factor: f64 = rand::thread_rng().gen_range(1.0..3.0);
        let grown = (self.interval_ms as f64 * factor).round() as u64;
        self.interval_ms = grown.min(MAX_INTERVAL_MS);
    }

    /// Reset after a successful READY or RESUMED
    pub fn reset(&mut self) {
        self.interval_ms = INITIAL_INTERVAL_MS;
        self.attempts = 0;
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new()
    }
}
