//! Retry and backoff policies.
//!
//! This module groups the knobs that control **whether** a failed capability load
//! is attempted again and **how long** to wait between attempts.
//!
//! ## Contents
//! - [`RetryPolicy`] retry budget (`max_retries`) plus a backoff schedule
//! - [`BackoffPolicy`] how delays evolve (first / max / strategy + jitter)
//! - [`BackoffStrategy`] linear (default) or exponential growth
//! - [`JitterPolicy`] randomization to avoid synchronized retries
//!
//! ## Quick wiring
//! ```text
//! LoaderConfig { retry: RetryPolicy { max_retries, backoff }, .. }
//!      └─► core::attempt::load_with_retry uses:
//!           - retry.next_delay(attempt, prev) to decide continue/exit
//!           - backoff.next(attempt, prev) to schedule the next attempt
//! ```
//!
//! ## Defaults
//! - `max_retries = 3` (four attempts in total).
//! - `BackoffPolicy::default()` → first=100ms, linear, max=30s, jitter=None.

mod backoff;
mod jitter;
mod retry;

pub use backoff::{BackoffPolicy, BackoffStrategy};
pub use jitter::JitterPolicy;
pub use retry::RetryPolicy;
