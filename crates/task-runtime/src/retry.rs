//! # Retry Policy Module
//!
//! Fixed-delay retry policy for transient task failures.
//!
//! The provider-facing retry contract is a constant wait between attempts —
//! not exponential growth. Jitter exists as an opt-in knob and is never
//! enabled by default.

use rand::RngExt;
use std::time::Duration;

/// Retry policy configuration with a fixed inter-attempt delay
///
/// # Examples
///
/// ```rust
/// use task_runtime::RetryPolicy;
/// use std::time::Duration;
///
/// // Default policy: 3 total attempts, 30s fixed delay, no jitter
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.max_attempts, 3);
/// assert_eq!(policy.delay_for(2), Duration::from_secs(30));
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum total attempts per task (initial attempt included)
    pub max_attempts: u32,

    /// Fixed delay between attempts
    pub backoff: Duration,

    /// Whether to add jitter to delays.
    ///
    /// Off by default: the observed retry contract is a plain fixed delay.
    /// Enable only as a deliberate measure against synchronized retries.
    pub use_jitter: bool,

    /// Jitter range as a fraction of the delay (default 25% = ±25%)
    pub jitter_percent: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(30),
            use_jitter: false,
            jitter_percent: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Create a fixed-delay policy
    pub fn fixed(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
            use_jitter: false,
            jitter_percent: 0.25,
        }
    }

    /// Enable jitter (±`percent` of the delay, clamped to 0.0–1.0)
    pub fn with_jitter(mut self, percent: f64) -> Self {
        self.use_jitter = true;
        self.jitter_percent = percent.clamp(0.0, 1.0);
        self
    }

    /// Whether a task that just failed its `attempt`-th delivery may retry
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay to wait before the attempt following `attempt`.
    ///
    /// Uniform across attempts; jitter, when enabled, varies the result in
    /// `[backoff * (1 - jitter), backoff * (1 + jitter)]`.
    pub fn delay_for(&self, _attempt: u32) -> Duration {
        if !self.use_jitter {
            return self.backoff;
        }

        let base_secs = self.backoff.as_secs_f64();
        let jitter_range = base_secs * self.jitter_percent;
        let jitter = rand::rng().random_range(-jitter_range..=jitter_range);
        Duration::from_secs_f64((base_secs + jitter).max(0.0))
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
