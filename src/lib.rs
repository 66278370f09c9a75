//! # capcore
//!
//! **capcore** is the async core of a device-capability toolkit: it constructs
//! capability modules (battery, network, geolocation, ...) lazily behind one
//! loader, and ships the dispatch and bounding primitives around it.
//!
//! It provides:
//! - a module loader with dependency resolution, single-flight loads, retry with
//!   backoff and bounded usage statistics;
//! - a priority / namespace / wildcard event bus with error-isolated dispatch;
//! - a bounded expiring cache and a bounded async pool.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │   Factory    │   │   Factory    │   │   Factory    │
//!     │  "battery"   │   │  "network"   │   │    "geo"     │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  ModuleLoader (caller-owned, cheap to clone)                      │
//! │  - Providers (name → factory)                                     │
//! │  - records (Unloaded / Loading / Loaded / Failed)                 │
//! │  - dependency graph + priorities                                  │
//! │  - bounded statistics table                                       │
//! └──────┬──────────────────┬──────────────────┬───────────────┬──────┘
//!        ▼                  ▼                  ▼               │
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   │
//!     │ load task    │   │ load task    │   │ load task    │   │
//!     │ (retry loop) │   │ (retry loop) │   │ (retry loop) │   │
//!     └┬─────────────┘   └┬─────────────┘   └┬─────────────┘   │
//!      │ module:loading   │ module:loaded    │ module:failed   │ module:unloaded
//!      ▼                  ▼                  ▼                 ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │            EventBus<LoaderEvent> (optional, with_events)          │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                  topic handlers (priority desc) → wildcard handlers
//!                                   │
//!                               LogWriter
//! ```
//!
//! ### Lifecycle of one load
//! ```text
//! load(name)
//!   ├─ Loaded        ─► cached instance
//!   ├─ Loading       ─► await the shared in-flight load
//!   ├─ no provider   ─► UnknownCapability (never retried)
//!   └─ otherwise     ─► spawn:
//!        loop {
//!          ├─► attempt += 1
//!          ├─► factory() + init()      (panics caught)
//!          ├─► record statistics
//!          ├─ Ok  ─► Loaded, publish module:loaded
//!          └─ Err ─► Fatal or budget spent ─► Failed, LoadFailed
//!                    otherwise ─► publish module:retry, sleep(backoff), continue
//!        }
//! ```
//!
//! ## Features
//! | Area              | Description                                                 | Key types / traits                         |
//! |-------------------|-------------------------------------------------------------|--------------------------------------------|
//! | **Loading**       | On-demand, single-flight, dependency-ordered construction.  | [`ModuleLoader`], [`LoaderBuilder`]        |
//! | **Capabilities**  | Contract of a module and the factory registry.              | [`Capability`], [`Providers`]              |
//! | **Events**        | Priority, namespace, wildcard and one-shot dispatch.        | [`EventBus`], [`SubscribeOptions`]         |
//! | **Policies**      | Retry budget and backoff schedule between attempts.         | [`RetryPolicy`], [`BackoffPolicy`]         |
//! | **Bounding**      | Expiring cache and bounded-concurrency pool.                | [`ExpiringCache`], [`async_pool`]          |
//! | **Errors**        | Typed errors for loading, modules and handlers.             | [`LoaderError`], [`CapabilityError`]       |
//! | **Configuration** | Per-component settings with documented defaults.            | [`LoaderConfig`], [`BusConfig`], [`CacheConfig`] |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use capcore::{
//!     Capability, CapabilityError, CapabilityRef, EventBus, LoaderConfig, LoaderEvent,
//!     LogWriter, ModuleLoader,
//! };
//! use serde_json::json;
//!
//! struct Battery;
//!
//! #[async_trait]
//! impl Capability for Battery {
//!     fn name(&self) -> &str { "battery" }
//!     async fn init(&self) -> Result<(), CapabilityError> { Ok(()) }
//!     async fn destroy(&self) -> Result<(), CapabilityError> { Ok(()) }
//!     fn data(&self) -> serde_json::Value { json!({ "level": 0.5 }) }
//! }
//!
//! struct Network;
//!
//! #[async_trait]
//! impl Capability for Network {
//!     fn name(&self) -> &str { "network" }
//!     async fn init(&self) -> Result<(), CapabilityError> { Ok(()) }
//!     async fn destroy(&self) -> Result<(), CapabilityError> { Ok(()) }
//!     fn data(&self) -> serde_json::Value { json!({ "online": true }) }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let events: EventBus<LoaderEvent> = EventBus::default();
//!     let _log = LogWriter::attach(&events);
//!
//!     let loader = ModuleLoader::builder(LoaderConfig::default())
//!         .provider("battery", || Ok(Arc::new(Battery) as CapabilityRef))
//!         .provider("network", || Ok(Arc::new(Network) as CapabilityRef))
//!         .with_events(events.clone())
//!         .build();
//!
//!     loader.set_dependencies("battery", ["network"]);
//!     let report = loader.preload(["battery"]).await?;
//!     assert!(report.is_complete());
//!     assert_eq!(loader.loaded_modules(), vec!["battery", "network"]);
//!
//!     loader.unload_all().await;
//!     Ok(())
//! }
//! ```
mod cache;
mod capabilities;
mod config;
mod core;
mod error;
mod events;
mod policies;
mod pool;
mod subscribers;

// ---- Public re-exports ----

pub use cache::ExpiringCache;
pub use capabilities::{Capability, CapabilityRef, Factory, Providers};
pub use config::{BusConfig, CacheConfig, LoaderConfig};
pub use crate::core::{LoadStats, LoaderBuilder, ModuleLoader, ModuleState, PreloadReport};
pub use error::{CapabilityError, HandlerError, ListenerError, LoaderError};
pub use events::{
    ErrorHandler, EventBus, Handler, ListenerId, LoaderEvent, LoaderEventKind, PerformanceMetrics,
    SubscribeOptions, TopicPattern, LOADER_TOPIC_PREFIX, WILDCARD,
};
pub use policies::{BackoffPolicy, BackoffStrategy, JitterPolicy, RetryPolicy};
pub use pool::async_pool;
pub use subscribers::LogWriter;
