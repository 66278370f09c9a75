use crate::{
    capabilities::{CapabilityRef, Providers},
    config::LoaderConfig,
    core::loader::ModuleLoader,
    error::CapabilityError,
    events::{EventBus, LoaderEvent},
};

/// Builder for constructing a [`ModuleLoader`] with optional features.
pub struct LoaderBuilder {
    cfg: LoaderConfig,
    providers: Providers,
    events: Option<EventBus<LoaderEvent>>,
}

impl LoaderBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: LoaderConfig) -> Self {
        Self {
            cfg,
            providers: Providers::new(),
            events: None,
        }
    }

    /// Registers one capability factory.
    pub fn provider<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<CapabilityRef, CapabilityError> + Send + Sync + 'static,
    {
        self.providers.register(name, factory);
        self
    }

    /// Replaces the provider registry wholesale.
    pub fn providers(mut self, providers: Providers) -> Self {
        self.providers = providers;
        self
    }

    /// Publishes loader lifecycle events (`module:*` topics) on `bus`.
    ///
    /// The bus is shared: the caller keeps its own clone to subscribe.
    pub fn with_events(mut self, bus: EventBus<LoaderEvent>) -> Self {
        self.events = Some(bus);
        self
    }

    /// Builds the loader.
    pub fn build(self) -> ModuleLoader {
        ModuleLoader::with_parts(self.cfg, self.providers, self.events)
    }
}
