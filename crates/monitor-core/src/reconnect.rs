//! Exponential reconnect backoff.
//!
//! The delay before retry `n` (1-indexed) is `base_delay * 2^(n-1)`. Once `n`
//! exceeds `max_attempts` the policy refuses further retries. No upper bound
//! is applied unless one is configured with [`ReconnectPolicy::with_max_delay`].

use std::time::Duration;

/// Default number of retries before the manager gives up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Pure backoff computation consulted by the connection manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Highest attempt number that is still allowed.
    pub max_attempts: u32,
    /// Optional ceiling applied to every computed delay.
    pub max_delay: Option<Duration>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS)
    }
}

impl ReconnectPolicy {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
            max_delay: None,
        }
    }

    /// Cap every delay at `max_delay`.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Delay before retry `attempt`, or `None` when the budget is spent.
    ///
    /// `attempt` is 1-indexed; `0` is treated as the first attempt. Delays
    /// that would overflow saturate at [`Duration::MAX`] before the cap is
    /// applied.
    ///
    /// ```
    /// use std::time::Duration;
    /// use monitor_core::reconnect::ReconnectPolicy;
    ///
    /// let policy = ReconnectPolicy::new(Duration::from_secs(1), 5);
    /// assert_eq!(policy.delay_for_attempt(3), Some(Duration::from_secs(4)));
    /// assert_eq!(policy.delay_for_attempt(6), None);
    /// ```
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if self.is_exhausted(attempt) {
            return None;
        }
        let exponent = attempt.saturating_sub(1);
        let delay = 2u32
            .checked_pow(exponent)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX);
        Some(match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        })
    }

    /// `true` when `attempt` is beyond the configured ceiling.
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        attempt > self.max_attempts
    }
}
