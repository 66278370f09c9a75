//! # Subscriptions and per-topic listener lists.
//!
//! A [`Topic`] owns the [`Subscription`]s registered under one event name (or the
//! wildcard list). Ordering is maintained lazily:
//!
//! ```text
//! push(sub)      → append, dirty = true
//! sorted()       → if dirty { stable sort by priority desc; dirty = false }
//! retain(pred)   → removal keeps relative order, dirty unchanged
//! ```
//!
//! Ties keep registration order because the sort is stable and new entries are appended.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::HandlerError;

/// Shared, type-erased event handler.
///
/// Receives the emitted topic name (useful for wildcard listeners) and the payload.
pub type Handler<T> = Arc<dyn Fn(&str, &T) -> Result<(), HandlerError> + Send + Sync>;

/// Identifier returned by every registration; unique per bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

impl ListenerId {
    /// Raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Registration options.
///
/// # Example
/// ```
/// use capcore::SubscribeOptions;
///
/// let opts = SubscribeOptions::priority(10).in_namespace("ui");
/// assert_eq!(opts.priority, 10);
/// assert_eq!(opts.namespace.as_deref(), Some("ui"));
/// assert!(!opts.once);
/// ```
#[derive(Clone, Debug, Default)]
pub struct SubscribeOptions {
    /// Higher fires first; default `0`.
    pub priority: i32,
    /// Optional tag used by bulk removal (`off_namespace`).
    pub namespace: Option<String>,
    /// Remove after the first invocation.
    pub once: bool,
}

impl SubscribeOptions {
    /// Options with the given priority.
    pub fn priority(priority: i32) -> Self {
        Self {
            priority,
            ..Self::default()
        }
    }

    /// Options tagged with a namespace.
    pub fn namespace(ns: impl Into<String>) -> Self {
        Self::default().in_namespace(ns)
    }

    /// Sets the namespace tag.
    pub fn in_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = Some(ns.into());
        self
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// One registered handler.
pub(crate) struct Subscription<T> {
    pub(crate) id: ListenerId,
    pub(crate) handler: Handler<T>,
    pub(crate) priority: i32,
    pub(crate) once: bool,
    pub(crate) namespace: Option<Arc<str>>,
    fired: AtomicBool,
}

impl<T> Subscription<T> {
    pub(crate) fn new(id: ListenerId, handler: Handler<T>, opts: SubscribeOptions) -> Self {
        Self {
            id,
            handler,
            priority: opts.priority,
            once: opts.once,
            namespace: opts.namespace.map(Arc::from),
            fired: AtomicBool::new(false),
        }
    }

    /// Claims the single invocation of a once-subscription.
    ///
    /// Always `true` for regular subscriptions; `true` exactly once otherwise.
    pub(crate) fn claim(&self) -> bool {
        !self.once || !self.fired.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn same_handler(&self, other: &Handler<T>) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.handler), Arc::as_ptr(other))
    }

    pub(crate) fn in_namespace(&self, ns: &str) -> bool {
        self.namespace.as_deref() == Some(ns)
    }
}

/// Listener list for one topic.
pub(crate) struct Topic<T> {
    subs: Vec<Arc<Subscription<T>>>,
    dirty: bool,
}

impl<T> Default for Topic<T> {
    fn default() -> Self {
        Self {
            subs: Vec::new(),
            dirty: false,
        }
    }
}

impl<T> Topic<T> {
    pub(crate) fn push(&mut self, sub: Arc<Subscription<T>>) -> usize {
        self.subs.push(sub);
        self.dirty = true;
        self.subs.len()
    }

    /// Subscriptions in dispatch order, sorting only if mutated since the last call.
    pub(crate) fn sorted(&mut self) -> &[Arc<Subscription<T>>] {
        if self.dirty {
            self.subs.sort_by(|a, b| b.priority.cmp(&a.priority));
            self.dirty = false;
        }
        &self.subs
    }

    /// Single subscription when exactly one is registered (fast path).
    pub(crate) fn single(&self) -> Option<&Arc<Subscription<T>>> {
        match self.subs.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    /// Keeps subscriptions for which `keep` is true; returns how many were removed.
    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&Subscription<T>) -> bool) -> usize {
        let before = self.subs.len();
        self.subs.retain(|s| keep(s));
        before - self.subs.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.subs.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.subs.is_empty()
    }

    pub(crate) fn clear(&mut self) -> usize {
        let n = self.subs.len();
        self.subs.clear();
        self.dirty = false;
        n
    }

    #[cfg(test)]
    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(id: u64, priority: i32) -> Arc<Subscription<()>> {
        let handler: Handler<()> = Arc::new(|_, _| Ok(()));
        Arc::new(Subscription::new(
            ListenerId(id),
            handler,
            SubscribeOptions::priority(priority),
        ))
    }

    fn ids(topic: &mut Topic<()>) -> Vec<u64> {
        topic.sorted().iter().map(|s| s.id.0).collect()
    }

    #[test]
    fn sorts_by_priority_desc_and_keeps_ties_stable() {
        let mut t = Topic::default();
        t.push(sub(1, 1));
        t.push(sub(2, 5));
        t.push(sub(3, 3));
        t.push(sub(4, 5));
        assert!(t.is_dirty());
        assert_eq!(ids(&mut t), vec![2, 4, 3, 1]);
        assert!(!t.is_dirty());
    }

    #[test]
    fn removal_does_not_mark_dirty() {
        let mut t = Topic::default();
        t.push(sub(1, 0));
        t.push(sub(2, 9));
        let _ = t.sorted();
        assert_eq!(t.retain(|s| s.id.0 != 2), 1);
        assert!(!t.is_dirty());
        assert_eq!(ids(&mut t), vec![1]);
    }

    #[test]
    fn once_claim_is_exclusive() {
        let handler: Handler<()> = Arc::new(|_, _| Ok(()));
        let s = Subscription::new(
            ListenerId(1),
            handler,
            SubscribeOptions {
                once: true,
                ..SubscribeOptions::default()
            },
        );
        assert!(s.claim());
        assert!(!s.claim());

        let regular = sub(2, 0);
        assert!(regular.claim());
        assert!(regular.claim());
    }
}
