//! Backoff policy for transient controller failures
//!
//! Connection errors and 5xx responses are retried with exponential backoff;
//! everything else is surfaced immediately. The policy only computes delays,
//! the caller owns the loop so it can honour its own deadline.

use rand::Rng;
use std::time::Duration;

/// Exponential backoff configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry
    pub initial_interval: Duration,

    /// Multiplier applied to the delay after each retry
    pub backoff_factor: f64,

    /// Upper bound for any single delay
    pub max_interval: Duration,

    /// Spread delays by a random factor in `0.5..=1.5`
    pub jitter: bool,
}

impl RetryPolicy {
    /// Create a policy allowing `max_retries` retries after the first attempt
    ///
    /// Delays start at 500 ms, double each time and are capped at 8 s.
    ///
    /// ```rust
    /// use tooling::async_utils::retry::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::new(3);
    /// assert_eq!(policy.delay_for(0), Duration::from_millis(500));
    /// assert_eq!(policy.delay_for(5), Duration::from_secs(8));
    /// ```
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_interval: Duration::from_millis(500),
            backoff_factor: 2.0,
            max_interval: Duration::from_secs(8),
            jitter: false,
        }
    }

    /// Set the delay before the first retry
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    /// Set the backoff factor
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Set the delay cap
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Enable or disable jitter
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay to wait after the given failed attempt (0-indexed)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let base = self.initial_interval.as_secs_f64() * self.backoff_factor.powi(exponent);
        let capped = base.min(self.max_interval.as_secs_f64());

        let delay = if self.jitter {
            capped * rand::thread_rng().gen_range(0.5..=1.5)
        } else {
            capped
        };

        Duration::from_secs_f64(delay.max(0.0))
    }

    /// Whether another attempt is allowed after `attempt` failures
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Whether an HTTP status is worth retrying
///
/// Only server-side failures are transient; 4xx responses describe the
/// request itself and repeating it cannot help.
///
/// ```rust
/// use tooling::async_utils::retry::is_retryable_status;
///
/// assert!(is_retryable_status(503));
/// assert!(!is_retryable_status(404));
/// ```
pub fn is_retryable_status(status: u16) -> bool {
    (500..600).contains(&status)
}
