//! # Module records.
//!
//! One [`ModuleRecord`] per name tracks where that module is in its lifecycle:
//!
//! ```text
//! Unloaded ──load──► Loading ──ok──► Loaded ──unload──► (teardown) ──► (removed)
//!                       │
//!                       └──err──► Failed ──load──► Loading (fresh record)
//! ```
//!
//! ## Rules
//! - `instance` is `Some` only while `Loaded`.
//! - `in_flight` is `Some` only while `Loading`; concurrent loads share it.
//! - `teardown` is set once by the first `unload` and stays until the record is removed;
//!   concurrent unloads share it and new loads wait for it.

use std::fmt;

use futures::future::{BoxFuture, Shared};

use crate::capabilities::CapabilityRef;
use crate::error::LoaderError;

/// A load that has started but not settled; clones resolve to the same outcome.
pub(crate) type SharedLoad = Shared<BoxFuture<'static, Result<CapabilityRef, LoaderError>>>;

/// A running teardown; resolves once the record is gone.
pub(crate) type SharedUnload = Shared<BoxFuture<'static, ()>>;

/// Lifecycle state of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleState {
    /// Not loaded (or torn down, while the unload is finishing).
    Unloaded,
    /// A load is in flight.
    Loading,
    /// Constructed and initialised; the instance is cached.
    Loaded,
    /// The last load settled with an error.
    Failed,
}

impl ModuleState {
    /// Returns a short stable label for logs.
    pub fn as_label(self) -> &'static str {
        match self {
            ModuleState::Unloaded => "unloaded",
            ModuleState::Loading => "loading",
            ModuleState::Loaded => "loaded",
            ModuleState::Failed => "failed",
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

pub(crate) struct ModuleRecord {
    pub(crate) state: ModuleState,
    pub(crate) instance: Option<CapabilityRef>,
    pub(crate) in_flight: Option<SharedLoad>,
    pub(crate) teardown: Option<SharedUnload>,
}

impl ModuleRecord {
    pub(crate) fn loading(load: SharedLoad) -> Self {
        Self {
            state: ModuleState::Loading,
            instance: None,
            in_flight: Some(load),
            teardown: None,
        }
    }

    /// Applies the outcome of the in-flight load. A pending teardown is kept.
    pub(crate) fn settle(&mut self, outcome: &Result<CapabilityRef, LoaderError>) {
        self.in_flight = None;
        match outcome {
            Ok(instance) => {
                self.state = ModuleState::Loaded;
                self.instance = Some(instance.clone());
            }
            Err(_) => {
                self.state = ModuleState::Failed;
                self.instance = None;
            }
        }
    }

    /// Moves a loaded record to `Unloaded`, handing back its instance.
    pub(crate) fn take_instance(&mut self) -> Option<CapabilityRef> {
        if self.state != ModuleState::Loaded {
            return None;
        }
        self.state = ModuleState::Unloaded;
        self.instance.take()
    }
}
