//! Cumulative task deadline
//!
//! One `Deadline` is created per task invocation and threaded through every
//! HTTP call, backoff sleep and poll of that task, so the budget is spent
//! across all of them rather than reset per call.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Returned when a deadline elapses before the wrapped future resolves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elapsed(pub Duration);

impl std::fmt::Display for Elapsed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task deadline of {:?} exceeded", self.0)
    }
}

impl std::error::Error for Elapsed {}

impl From<Elapsed> for crate::ToolingError {
    fn from(elapsed: Elapsed) -> Self {
        crate::ToolingError::DeadlineExceeded(elapsed.0)
    }
}

/// A point in time after which a task must stop issuing work
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires_at: Instant,
    budget: Duration,
}

impl Deadline {
    /// Start a deadline `budget` from now
    pub fn new(budget: Duration) -> Self {
        Self {
            expires_at: Instant::now() + budget,
            budget,
        }
    }

    /// Total budget this deadline was created with
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Whether the deadline has passed
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Time left, or `None` once expired
    pub fn remaining(&self) -> Option<Duration> {
        let now = Instant::now();
        if now >= self.expires_at {
            None
        } else {
            Some(self.expires_at - now)
        }
    }

    /// Drive `future` to completion unless the deadline passes first
    ///
    /// The future is dropped (and its in-flight I/O cancelled) on expiry.
    pub async fn run<F, T>(&self, future: F) -> Result<T, Elapsed>
    where
        F: Future<Output = T>,
    {
        let remaining = self.remaining().ok_or(Elapsed(self.budget))?;
        tokio::time::timeout(remaining, future)
            .await
            .map_err(|_| Elapsed(self.budget))
    }

    /// Sleep for `duration`, or until the deadline if that comes sooner
    ///
    /// Returns `false` when the deadline cut the sleep short, in which case
    /// the caller should give up rather than issue another request.
    pub async fn sleep(&self, duration: Duration) -> bool {
        match self.remaining() {
            Some(remaining) if remaining > duration => {
                tokio::time::sleep(duration).await;
                true
            }
            Some(remaining) => {
                tokio::time::sleep(remaining).await;
                false
            }
            None => false,
        }
    }
}
