//! # Capability module abstraction.
//!
//! A capability wraps one platform facility (battery, network, clipboard, ...).
//! The loader only ever sees it through this trait and never inspects concrete types.
//!
//! Lifecycle driven by [`ModuleLoader`](crate::ModuleLoader):
//! ```text
//! factory() ──► init() ──► [Loaded: data() any number of times] ──► destroy()
//!     │            │
//!     └── Err ─────┴──► attempt failed (retried unless fatal)
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CapabilityError;

/// Shared handle to a constructed capability module.
pub type CapabilityRef = Arc<dyn Capability>;

/// # Lazily constructed capability module.
///
/// `init` runs once per successful construction; `destroy` runs once on unload.
/// `data` returns the current snapshot the module exposes to consumers.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use capcore::{Capability, CapabilityError};
/// use serde_json::json;
///
/// struct Battery;
///
/// #[async_trait]
/// impl Capability for Battery {
///     fn name(&self) -> &str { "battery" }
///
///     async fn init(&self) -> Result<(), CapabilityError> {
///         Ok(())
///     }
///
///     async fn destroy(&self) -> Result<(), CapabilityError> {
///         Ok(())
///     }
///
///     fn data(&self) -> serde_json::Value {
///         json!({ "level": 0.82, "charging": true })
///     }
/// }
/// ```
#[async_trait]
pub trait Capability: Send + Sync + 'static {
    /// Returns a stable, human-readable module name.
    fn name(&self) -> &str;

    /// Prepares the module (acquire platform handles, subscribe to sources).
    ///
    /// An `Err` fails the current load attempt; [`CapabilityError::Fatal`] stops retries.
    async fn init(&self) -> Result<(), CapabilityError>;

    /// Releases whatever `init` acquired. Errors are logged by the loader, never propagated.
    async fn destroy(&self) -> Result<(), CapabilityError>;

    /// Returns the module's current data snapshot.
    fn data(&self) -> serde_json::Value;
}
