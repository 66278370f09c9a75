//! # Capability contract and provider registry.
//!
//! This module provides the types the loader is generic over:
//! - [`Capability`] - trait implemented by every capability module
//! - [`CapabilityRef`] - shared handle to a constructed module (`Arc<dyn Capability>`)
//! - [`Factory`] - zero-argument constructor registered under a name
//! - [`Providers`] - name → factory registry populated at startup

mod capability;
mod provider;

pub use capability::{Capability, CapabilityRef};
pub use provider::{Factory, Providers};
