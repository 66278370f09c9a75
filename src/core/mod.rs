//! # Loader internals.
//!
//! - [`ModuleLoader`] public handle (load / unload / preload / load_multiple / stats)
//! - [`LoaderBuilder`] construction with providers and an optional event bus
//! - `attempt` retry loop around one module's construction and `init`
//! - `graph` dependency declarations and load-order resolution
//! - `registry` per-module lifecycle records
//! - `stats` bounded per-module statistics

mod attempt;
mod builder;
mod graph;
mod loader;
mod registry;
mod stats;

pub use builder::LoaderBuilder;
pub use loader::{ModuleLoader, PreloadReport};
pub use registry::ModuleState;
pub use stats::LoadStats;
