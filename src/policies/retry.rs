//! # Retry policy for capability loads.
//!
//! [`RetryPolicy`] bounds how many times the loader re-attempts constructing a
//! capability after a retryable failure, and how long it waits in between.
//!
//! ```text
//! attempt 1 ── Err(Fail) ── sleep(backoff.next(1, None)) ──►
//! attempt 2 ── Err(Fail) ── sleep(backoff.next(2, Some(d1))) ──►
//! ...
//! attempt max_retries + 1 ── Err ──► LoaderError::LoadFailed
//! ```
//!
//! Non-retryable errors (`CapabilityError::Fatal`) and unknown names stop immediately.

use std::time::Duration;

use super::BackoffPolicy;

/// Retry budget and delay schedule for one load.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Number of retries after the first attempt (`0` = single attempt).
    pub max_retries: u32,
    /// Delay schedule between attempts.
    pub backoff: BackoffPolicy,
}

impl Default for RetryPolicy {
    /// `max_retries = 3`, linear backoff starting at 100ms.
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn never() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Same retry budget with a much shorter linear base delay (handy in tests).
    pub fn with_base_delay(mut self, first: Duration) -> Self {
        self.backoff.first = first;
        self
    }

    /// Total number of attempts permitted (`max_retries + 1`).
    #[inline]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Returns the delay to wait after `attempt` failed, or `None` when the budget is spent.
    ///
    /// `prev` is the delay applied before `attempt` (`None` before the first retry).
    pub fn next_delay(&self, attempt: u32, prev: Option<Duration>) -> Option<Duration> {
        if attempt >= self.max_attempts() {
            None
        } else {
            Some(self.backoff.next(attempt, prev))
        }
    }
}
