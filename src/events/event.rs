//! # Lifecycle events published by the module loader.
//!
//! A loader built with [`LoaderBuilder::with_events`](crate::LoaderBuilder::with_events)
//! publishes a [`LoaderEvent`] on an [`EventBus`](crate::EventBus) under the topic
//! returned by [`LoaderEventKind::topic`]. The bus stays payload-agnostic; it is the
//! consumer that decides which topics to listen to.
//!
//! ## Ordering guarantees
//! Each event carries a sequence number (`seq`) that increases monotonically
//! within the process. Use it to restore order when events are collected from
//! several loaders.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use capcore::{LoaderEvent, LoaderEventKind};
//!
//! let ev = LoaderEvent::new(LoaderEventKind::RetryScheduled)
//!     .with_module("battery")
//!     .with_attempt(2)
//!     .with_delay(Duration::from_millis(200))
//!     .with_reason("no api");
//!
//! assert_eq!(ev.kind.topic(), "module:retry");
//! assert_eq!(ev.module.as_deref(), Some("battery"));
//! assert_eq!(ev.delay_ms, Some(200));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Topic prefix shared by every loader event.
pub const LOADER_TOPIC_PREFIX: &str = "module:";

/// Classification of loader events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoaderEventKind {
    /// A new load started (record moved to `Loading`).
    ///
    /// Sets: `module`
    Loading,

    /// The module was constructed and initialised.
    ///
    /// Sets: `module`, `attempt`, `elapsed_ms`
    Loaded,

    /// An attempt failed and another one is scheduled.
    ///
    /// Sets: `module`, `attempt` (the failed one), `delay_ms`, `reason`
    RetryScheduled,

    /// The load settled with an error.
    ///
    /// Sets: `module`, `attempt` (total attempts, if any ran), `reason`
    Failed,

    /// The module was torn down and its record removed.
    ///
    /// Sets: `module`
    Unloaded,

    /// `destroy` failed during unload; the record was removed anyway.
    ///
    /// Sets: `module`, `reason`
    TeardownFailed,
}

impl LoaderEventKind {
    /// Topic name under which events of this kind are emitted.
    pub fn topic(self) -> &'static str {
        match self {
            LoaderEventKind::Loading => "module:loading",
            LoaderEventKind::Loaded => "module:loaded",
            LoaderEventKind::RetryScheduled => "module:retry",
            LoaderEventKind::Failed => "module:failed",
            LoaderEventKind::Unloaded => "module:unloaded",
            LoaderEventKind::TeardownFailed => "module:teardown-failed",
        }
    }
}

/// Loader event with optional metadata.
#[derive(Clone, Debug)]
pub struct LoaderEvent {
    /// Monotonic sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: LoaderEventKind,
    /// Module name, if applicable.
    pub module: Option<Arc<str>>,
    /// Attempt number (starting from 1).
    pub attempt: Option<u32>,
    /// Backoff delay before the next attempt, in milliseconds.
    pub delay_ms: Option<u32>,
    /// Duration of the successful attempt, in milliseconds.
    pub elapsed_ms: Option<u32>,
    /// Human-readable reason (errors).
    pub reason: Option<Arc<str>>,
}

impl LoaderEvent {
    /// Creates an event of the given kind with the current timestamp and next sequence number.
    pub fn new(kind: LoaderEventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            module: None,
            attempt: None,
            delay_ms: None,
            elapsed_ms: None,
            reason: None,
        }
    }

    /// Attaches a module name.
    #[inline]
    pub fn with_module(mut self, module: impl Into<Arc<str>>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// Attaches an attempt number.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a backoff delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(clamp_ms(d));
        self
    }

    /// Attaches the duration of the attempt (stored as milliseconds).
    #[inline]
    pub fn with_elapsed(mut self, d: Duration) -> Self {
        self.elapsed_ms = Some(clamp_ms(d));
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Topic this event is emitted under.
    #[inline]
    pub fn topic(&self) -> &'static str {
        self.kind.topic()
    }
}

fn clamp_ms(d: Duration) -> u32 {
    d.as_millis().min(u128::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_share_prefix() {
        for kind in [
            LoaderEventKind::Loading,
            LoaderEventKind::Loaded,
            LoaderEventKind::RetryScheduled,
            LoaderEventKind::Failed,
            LoaderEventKind::Unloaded,
            LoaderEventKind::TeardownFailed,
        ] {
            assert!(kind.topic().starts_with(LOADER_TOPIC_PREFIX));
        }
    }

    #[test]
    fn sequence_is_monotonic() {
        let a = LoaderEvent::new(LoaderEventKind::Loading);
        let b = LoaderEvent::new(LoaderEventKind::Loaded);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn huge_delay_saturates() {
        let ev = LoaderEvent::new(LoaderEventKind::RetryScheduled)
            .with_delay(Duration::from_secs(u64::MAX / 2));
        assert_eq!(ev.delay_ms, Some(u32::MAX));
    }
}
