//! Event dispatch: the generic bus and the loader's lifecycle events.
//!
//! ## Contents
//! - [`EventBus`] priority / namespace / wildcard publish-subscribe over any payload type
//! - [`SubscribeOptions`], [`ListenerId`], [`Handler`] registration types
//! - [`TopicPattern`] selector used by bulk removal (`"prefix*"`, `"*"`)
//! - [`PerformanceMetrics`] optional emit counters
//! - [`LoaderEvent`], [`LoaderEventKind`] payload published by a loader wired to a bus
//!
//! ## Quick reference
//! - **Publishers**: any caller of `EventBus::emit`; `ModuleLoader` when built
//!   `with_events(bus)`.
//! - **Consumers**: handlers registered with `on` / `once` / `add_listener`;
//!   [`LogWriter`](crate::LogWriter) as a wildcard listener.

mod bus;
mod event;
mod metrics;
mod pattern;
mod subscription;

pub use bus::{ErrorHandler, EventBus};
pub use event::{LoaderEvent, LoaderEventKind, LOADER_TOPIC_PREFIX};
pub use metrics::PerformanceMetrics;
pub use pattern::{TopicPattern, WILDCARD};
pub use subscription::{Handler, ListenerId, SubscribeOptions};
