//! # LogWriter: loader event printer
//!
//! Attaches to an [`EventBus<LoaderEvent>`] as a wildcard listener in its own
//! namespace and renders every event through `tracing`.
//!
//! ## Example output
//! ```text
//! [loading] module="battery"
//! [retry] module="battery" delay_ms=100 after_attempt=1 err="error: no api"
//! [loaded] module="battery" attempt=2 elapsed_ms=3
//! [failed] module="geolocation" attempts=1 err="fatal: permission denied"
//! [teardown-failed] module="media" err="error: track busy"
//! [unloaded] module="battery"
//! ```

use crate::events::{EventBus, LoaderEvent, LoaderEventKind, SubscribeOptions, WILDCARD};

/// Loader event writer.
///
/// # Example
/// ```
/// use capcore::{EventBus, LoaderEvent, LogWriter};
///
/// let bus: EventBus<LoaderEvent> = EventBus::default();
/// let writer = LogWriter::attach(&bus);
/// assert!(bus.has_listeners("module:loaded"));
///
/// writer.detach();
/// assert!(!bus.has_listeners("module:loaded"));
/// ```
pub struct LogWriter {
    bus: EventBus<LoaderEvent>,
}

impl LogWriter {
    /// Namespace of the writer's subscription.
    pub const NAMESPACE: &'static str = "log-writer";

    /// Subscribes to every topic of `bus`, after all other handlers.
    pub fn attach(bus: &EventBus<LoaderEvent>) -> Self {
        bus.on(
            WILDCARD,
            |_topic, ev: &LoaderEvent| {
                write(ev);
                Ok(())
            },
            SubscribeOptions::namespace(Self::NAMESPACE).with_priority(i32::MIN),
        );
        Self { bus: bus.clone() }
    }

    /// Removes the writer's subscription.
    pub fn detach(self) -> usize {
        self.bus.off_namespace(Self::NAMESPACE)
    }
}

fn write(ev: &LoaderEvent) {
    let line = render(ev);
    match ev.kind {
        LoaderEventKind::Failed | LoaderEventKind::TeardownFailed => {
            tracing::warn!(seq = ev.seq, "{line}")
        }
        LoaderEventKind::RetryScheduled => tracing::info!(seq = ev.seq, "{line}"),
        _ => tracing::debug!(seq = ev.seq, "{line}"),
    }
}

fn render(e: &LoaderEvent) -> String {
    let module = e.module.as_deref().unwrap_or("unknown");
    match e.kind {
        LoaderEventKind::Loading => format!("[loading] module={module:?}"),
        LoaderEventKind::Loaded => format!(
            "[loaded] module={module:?} attempt={} elapsed_ms={}",
            e.attempt.unwrap_or(0),
            e.elapsed_ms.unwrap_or(0)
        ),
        LoaderEventKind::RetryScheduled => format!(
            "[retry] module={module:?} delay_ms={} after_attempt={} err={:?}",
            e.delay_ms.unwrap_or(0),
            e.attempt.unwrap_or(0),
            e.reason.as_deref().unwrap_or("")
        ),
        LoaderEventKind::Failed => format!(
            "[failed] module={module:?} attempts={} err={:?}",
            e.attempt.unwrap_or(0),
            e.reason.as_deref().unwrap_or("")
        ),
        LoaderEventKind::TeardownFailed => format!(
            "[teardown-failed] module={module:?} err={:?}",
            e.reason.as_deref().unwrap_or("")
        ),
        LoaderEventKind::Unloaded => format!("[unloaded] module={module:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn renders_retry_line() {
        let ev = LoaderEvent::new(LoaderEventKind::RetryScheduled)
            .with_module("battery")
            .with_attempt(1)
            .with_delay(Duration::from_millis(100))
            .with_reason("error: no api");
        assert_eq!(
            render(&ev),
            r#"[retry] module="battery" delay_ms=100 after_attempt=1 err="error: no api""#
        );
    }

    #[test]
    fn writer_is_a_wildcard_listener() {
        let bus: EventBus<LoaderEvent> = EventBus::default();
        let _writer = LogWriter::attach(&bus);
        let user = bus.on("module:loaded", |_, _| Ok(()), SubscribeOptions::default());

        assert_eq!(bus.listener_count(WILDCARD), 1);
        assert_eq!(bus.listener_count("module:loaded"), 1);
        assert!(bus.has_listeners("module:unloaded"));
        assert_eq!(bus.emit("module:loaded", &LoaderEvent::new(LoaderEventKind::Loaded)), 2);
        assert!(bus.off_id(user));
    }

    #[test]
    fn detach_removes_only_writer() {
        let bus: EventBus<LoaderEvent> = EventBus::default();
        bus.on("module:failed", |_, _| Ok(()), SubscribeOptions::default());
        let writer = LogWriter::attach(&bus);

        assert_eq!(writer.detach(), 1);
        assert_eq!(bus.listener_count("module:failed"), 1);
        assert!(bus.has_listeners("module:failed"));
        assert!(!bus.has_listeners("module:loaded"));
    }
}
