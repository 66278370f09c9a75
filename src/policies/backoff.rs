//! # Backoff policy between load attempts.
//!
//! [`BackoffPolicy`] decides how long the loader waits after a failed attempt
//! before trying to construct a capability again. It is parameterized by:
//! - [`BackoffPolicy::first`] the base delay;
//! - [`BackoffPolicy::max`] the maximum delay cap;
//! - [`BackoffPolicy::strategy`] how the delay grows with the attempt number;
//! - [`BackoffPolicy::jitter`] optional randomization.
//!
//! The default strategy is **linear**: after the `n`-th failed attempt the loader
//! waits `first × n`. The base delay is derived purely from the attempt number,
//! so jitter output never feeds back into later delays, except for
//! [`JitterPolicy::Decorrelated`], which grows from the previously applied delay.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use capcore::{BackoffPolicy, BackoffStrategy, JitterPolicy};
//!
//! let linear = BackoffPolicy {
//!     first: Duration::from_millis(100),
//!     max: Duration::from_secs(10),
//!     strategy: BackoffStrategy::Linear,
//!     jitter: JitterPolicy::None,
//! };
//! assert_eq!(linear.delay_for(1), Duration::from_millis(100));
//! assert_eq!(linear.delay_for(3), Duration::from_millis(300));
//!
//! let expo = BackoffPolicy { strategy: BackoffStrategy::Exponential { factor: 2.0 }, ..linear };
//! assert_eq!(expo.delay_for(3), Duration::from_millis(400));
//! assert_eq!(expo.delay_for(20), Duration::from_secs(10));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Growth of the base delay with the attempt number.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum BackoffStrategy {
    /// `first × attempt` (default).
    #[default]
    Linear,
    /// `first × factor^(attempt - 1)`.
    Exponential {
        /// Multiplicative growth factor (`>= 1.0` recommended).
        factor: f64,
    },
}

/// Retry backoff policy.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    /// Base delay (the wait after the first failed attempt).
    pub first: Duration,
    /// Maximum delay cap.
    pub max: Duration,
    /// Growth strategy.
    pub strategy: BackoffStrategy,
    /// Jitter applied to the capped base delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Returns a policy with:
    /// - `first = 100ms`;
    /// - `max = 30s`;
    /// - linear growth, no jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(100),
            max: Duration::from_secs(30),
            strategy: BackoffStrategy::Linear,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Linear policy with the given base delay and default cap.
    pub fn linear(first: Duration) -> Self {
        Self {
            first,
            ..Self::default()
        }
    }

    /// Computes the delay after the given failed attempt (1-based), with no
    /// previous delay known.
    ///
    /// `attempt = 0` is treated as `1`. The result is clamped to [`BackoffPolicy::max`]
    /// before jitter is applied. See [`next`](Self::next) for decorrelated jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.next(attempt, None)
    }

    /// Computes the delay after `attempt` failed, given the delay actually applied
    /// before it (`None` before the first retry).
    ///
    /// Only [`JitterPolicy::Decorrelated`] uses `prev`: it draws from
    /// `[first, prev × 3]`, capped at `max`, and ignores the strategy.
    pub fn next(&self, attempt: u32, prev: Option<Duration>) -> Duration {
        match self.jitter {
            JitterPolicy::Decorrelated => {
                let first = self.first.min(self.max);
                self.jitter
                    .apply_decorrelated(first, prev.unwrap_or(first), self.max)
            }
            _ => self.jitter.apply(self.base_for(attempt)),
        }
    }

    /// Strategy delay for `attempt`, clamped to `max`, without jitter.
    fn base_for(&self, attempt: u32) -> Duration {
        let n = attempt.max(1);
        let first = self.first.as_secs_f64();
        let unclamped = match self.strategy {
            BackoffStrategy::Linear => first * f64::from(n),
            BackoffStrategy::Exponential { factor } => {
                let exp = (n - 1).min(i32::MAX as u32) as i32;
                first * factor.powi(exp)
            }
        };

        if !unclamped.is_finite() || unclamped < 0.0 || unclamped > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(unclamped)
        }
    }
}
