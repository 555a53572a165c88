//! Retry policy for fetch attempts.

use std::time::Duration;

use tramline_core::RetryConfig;

use crate::error::FetchError;

/// Policy for re-attempting transient failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first. Never below 1.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy with the given attempt budget and default delays.
    pub fn new(max_attempts: u32) -> Self {
        Self::from(RetryConfig {
            max_attempts,
            ..RetryConfig::default()
        })
    }

    /// A single attempt, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Sets the base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the delay cap.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Delay after failed attempt number `attempt` (1-based).
    ///
    /// Doubles with every attempt and is capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Returns true if `error` may succeed on another attempt.
    pub fn should_retry(&self, error: &FetchError) -> bool {
        error.is_transient()
    }

    /// Returns true if another attempt fits in the budget after `attempt`.
    pub fn has_budget(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(RetryConfig::default())
    }
}
