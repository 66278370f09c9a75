//! Error types used by the loader, the capability contract and the event bus.
//!
//! This module defines three error types:
//!
//! - [`LoaderError`] errors surfaced to callers of [`ModuleLoader`](crate::ModuleLoader).
//! - [`CapabilityError`] errors raised by a capability's factory, `init` or `destroy`.
//! - [`ListenerError`] a failure of one event handler, isolated by [`EventBus`](crate::EventBus).
//!
//! All of them provide helper methods (`as_label`, `as_message`) for logging/metrics.

use std::time::Duration;
use thiserror::Error;

use crate::events::ListenerId;

/// Error type returned by event handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// # Errors produced by the module loader.
///
/// Loader-level failures are surfaced to callers of `load` / `load_multiple`.
/// `preload` collects them instead of returning them.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum LoaderError {
    /// No provider is registered under this name. Never retried.
    #[error("unknown capability: {name}")]
    UnknownCapability {
        /// The requested name.
        name: String,
    },

    /// Construction or initialisation kept failing until the retry budget ran out
    /// (or failed with a non-retryable error).
    #[error("failed to load '{name}' after {attempts} attempt(s): {error}")]
    LoadFailed {
        /// Module name.
        name: String,
        /// Total number of attempts made.
        attempts: u32,
        /// Error of the last attempt.
        error: CapabilityError,
    },

    /// The dependency graph contains a cycle; detected before any load started.
    #[error("dependency cycle detected: {}", cycle.join(" -> "))]
    CycleDependency {
        /// The offending path, first and last element are the same name.
        cycle: Vec<String>,
    },

    /// A declared dependency failed to load, so the dependent was not constructed.
    #[error("dependency '{dependency}' of '{name}' failed: {reason}")]
    DependencyFailed {
        /// The dependent module.
        name: String,
        /// The dependency that failed.
        dependency: String,
        /// Rendered error of the dependency.
        reason: String,
    },

    /// A per-call timeout elapsed (see [`ModuleLoader::load_with_timeout`](crate::ModuleLoader::load_with_timeout)).
    #[error("loading '{name}' timed out after {timeout:?}")]
    Timeout {
        /// Module name.
        name: String,
        /// The timeout that was exceeded.
        timeout: Duration,
    },

    /// The load task was torn down by the runtime before it settled.
    #[error("load of '{name}' was aborted")]
    Aborted {
        /// Module name.
        name: String,
    },
}

impl LoaderError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use capcore::LoaderError;
    ///
    /// let err = LoaderError::UnknownCapability { name: "battery".into() };
    /// assert_eq!(err.as_label(), "loader_unknown_capability");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            LoaderError::UnknownCapability { .. } => "loader_unknown_capability",
            LoaderError::LoadFailed { .. } => "loader_load_failed",
            LoaderError::CycleDependency { .. } => "loader_cycle_dependency",
            LoaderError::DependencyFailed { .. } => "loader_dependency_failed",
            LoaderError::Timeout { .. } => "loader_timeout",
            LoaderError::Aborted { .. } => "loader_aborted",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            LoaderError::UnknownCapability { name } => format!("unknown: {name}"),
            LoaderError::LoadFailed {
                name,
                attempts,
                error,
            } => format!("load failed: {name} attempts={attempts} last={error}"),
            LoaderError::CycleDependency { cycle } => format!("cycle: {cycle:?}"),
            LoaderError::DependencyFailed {
                name, dependency, ..
            } => format!("dependency failed: {name} <- {dependency}"),
            LoaderError::Timeout { name, timeout } => format!("timeout: {name} after {timeout:?}"),
            LoaderError::Aborted { name } => format!("aborted: {name}"),
        }
    }

    /// Name of the module this error is about, if any.
    pub fn module(&self) -> Option<&str> {
        match self {
            LoaderError::UnknownCapability { name }
            | LoaderError::LoadFailed { name, .. }
            | LoaderError::DependencyFailed { name, .. }
            | LoaderError::Timeout { name, .. }
            | LoaderError::Aborted { name } => Some(name),
            LoaderError::CycleDependency { .. } => None,
        }
    }
}

/// # Errors produced by capability modules.
///
/// Some errors are retryable (`Fail`), others are considered fatal.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    /// The attempt failed but may succeed if retried.
    #[error("execution failed: {reason}")]
    Fail {
        /// The underlying error message.
        reason: String,
    },

    /// Non-recoverable failure (e.g. the platform API does not exist).
    #[error("fatal error (no retry): {reason}")]
    Fatal {
        /// The underlying error message.
        reason: String,
    },

    /// The attempt panicked; the panic was caught by the loader.
    #[error("panicked: {info}")]
    Panicked {
        /// Panic payload, if it was a string.
        info: String,
    },
}

impl CapabilityError {
    /// Shorthand for [`CapabilityError::Fail`].
    pub fn fail(reason: impl Into<String>) -> Self {
        CapabilityError::Fail {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`CapabilityError::Fatal`].
    pub fn fatal(reason: impl Into<String>) -> Self {
        CapabilityError::Fatal {
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            CapabilityError::Fail { .. } => "capability_failed",
            CapabilityError::Fatal { .. } => "capability_fatal",
            CapabilityError::Panicked { .. } => "capability_panicked",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            CapabilityError::Fail { reason } => format!("error: {reason}"),
            CapabilityError::Fatal { reason } => format!("fatal: {reason}"),
            CapabilityError::Panicked { info } => format!("panic: {info}"),
        }
    }

    /// Indicates whether the error type is safe to retry.
    ///
    /// Returns `true` for [`CapabilityError::Fail`] and [`CapabilityError::Panicked`],
    /// `false` otherwise.
    ///
    /// # Example
    /// ```
    /// use capcore::CapabilityError;
    ///
    /// assert!(CapabilityError::fail("boom").is_retryable());
    /// assert!(!CapabilityError::fatal("nope").is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CapabilityError::Fail { .. } | CapabilityError::Panicked { .. }
        )
    }
}

/// A single handler failure observed during [`EventBus::emit`](crate::EventBus::emit).
#[derive(Error, Debug, Clone)]
#[error("listener {listener} on '{topic}' failed: {reason}")]
pub struct ListenerError {
    /// Topic that was being emitted.
    pub topic: String,
    /// Registration id of the failing handler.
    pub listener: ListenerId,
    /// Rendered error or panic message.
    pub reason: String,
    /// True when the handler panicked instead of returning `Err`.
    pub panicked: bool,
}

impl ListenerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        if self.panicked {
            "listener_panicked"
        } else {
            "listener_failed"
        }
    }
}

/// Renders a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
