//! Bounded, expiring key/value storage.
//!
//! ## Contents
//! - [`ExpiringCache`] per-entry TTL + capacity-bounded, insertion-ordered eviction
//!
//! Timestamps come from `tokio::time::Instant`, so paused-time tests can drive
//! expiry with `tokio::time::advance`.

mod expiring;

pub use expiring::ExpiringCache;
