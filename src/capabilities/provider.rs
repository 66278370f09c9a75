//! # Provider registry.
//!
//! [`Providers`] maps a capability name to a zero-argument [`Factory`].
//! It is filled once at startup and handed to the loader builder; the loader
//! looks the factory up by name instead of resolving anything at runtime.
//!
//! ## Rules
//! - Registering a name twice replaces the earlier factory.
//! - A factory is called once per load attempt, so each retry gets a fresh instance.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::capabilities::CapabilityRef;
use crate::error::CapabilityError;

/// Zero-argument constructor for one capability.
pub type Factory = Arc<dyn Fn() -> Result<CapabilityRef, CapabilityError> + Send + Sync>;

/// Name → factory registry.
///
/// # Example
/// ```
/// # use std::sync::Arc;
/// # use async_trait::async_trait;
/// # use capcore::{Capability, CapabilityError, CapabilityRef, Providers};
/// # struct Clipboard;
/// # #[async_trait]
/// # impl Capability for Clipboard {
/// #     fn name(&self) -> &str { "clipboard" }
/// #     async fn init(&self) -> Result<(), CapabilityError> { Ok(()) }
/// #     async fn destroy(&self) -> Result<(), CapabilityError> { Ok(()) }
/// #     fn data(&self) -> serde_json::Value { serde_json::Value::Null }
/// # }
/// let providers = Providers::new()
///     .with("clipboard", || Ok(Arc::new(Clipboard) as CapabilityRef));
///
/// assert!(providers.contains("clipboard"));
/// assert!(!providers.contains("battery"));
/// ```
#[derive(Clone, Default)]
pub struct Providers {
    factories: HashMap<String, Factory>,
}

impl Providers {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `name`, replacing any previous one.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Result<CapabilityRef, CapabilityError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Builder-style variant of [`register`](Self::register).
    pub fn with<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<CapabilityRef, CapabilityError> + Send + Sync + 'static,
    {
        self.register(name, factory);
        self
    }

    /// Returns `true` if a factory is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Returns the factory registered under `name`.
    pub fn get(&self, name: &str) -> Option<Factory> {
        self.factories.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for Providers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Providers")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_registration_wins() {
        let mut p = Providers::new();
        p.register("net", || Err(CapabilityError::fail("first")));
        p.register("net", || Err(CapabilityError::fatal("second")));

        assert_eq!(p.len(), 1);
        let made = p.get("net").map(|f| f().err());
        assert_eq!(made, Some(Some(CapabilityError::fatal("second"))));
    }

    #[test]
    fn names_are_sorted() {
        let p = Providers::new()
            .with("wake-lock", || Err(CapabilityError::fail("x")))
            .with("battery", || Err(CapabilityError::fail("x")))
            .with("network", || Err(CapabilityError::fail("x")));
        assert_eq!(p.names(), vec!["battery", "network", "wake-lock"]);
        assert!(p.get("geolocation").is_none());
    }
}
