//! # EventBus: prioritized publish/subscribe.
//!
//! [`EventBus`] dispatches a payload of type `T` to handlers registered on a topic
//! name, plus handlers registered on the wildcard topic `"*"`.
//!
//! ## Dispatch order
//! ```text
//! emit("net:online", &payload)
//!   ├─► topic "net:online"   priority desc, ties by registration order
//!   └─► wildcard "*"         priority desc, ties by registration order
//! ```
//!
//! ## Rules
//! - **Error isolation**: a handler returning `Err` or panicking is caught; the
//!   remaining handlers still run. The [`ListenerError`] goes to the error handler
//!   if one is set, otherwise it is logged with the topic name.
//! - **Once**: a once-handler runs exactly one time; it is unregistered after the
//!   whole dispatch pass, so no handler observes a shortened list mid-emit.
//! - **Lazy sort**: a topic is re-sorted only if it was mutated since its last dispatch.
//! - **Fast path**: a topic with exactly one handler and no wildcard handlers is
//!   dispatched without sorting or once bookkeeping.
//! - **Re-entrancy**: the registry lock is never held while handlers run, so a
//!   handler may emit, subscribe or unsubscribe on the same bus.
//!
//! ## Example
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use capcore::{EventBus, SubscribeOptions};
//!
//! let bus: EventBus<u32> = EventBus::default();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//!
//! let s = Arc::clone(&seen);
//! bus.on("level", move |_, v: &u32| { s.lock().unwrap().push(("low", *v)); Ok(()) },
//!     SubscribeOptions::priority(1));
//! let s = Arc::clone(&seen);
//! bus.on("level", move |_, v: &u32| { s.lock().unwrap().push(("high", *v)); Ok(()) },
//!     SubscribeOptions::priority(2));
//!
//! bus.emit("level", &42);
//! assert_eq!(*seen.lock().unwrap(), vec![("high", 42), ("low", 42)]);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::BusConfig;
use crate::error::{panic_message, HandlerError, ListenerError};

use super::metrics::PerformanceMetrics;
use super::pattern::{TopicPattern, WILDCARD};
use super::subscription::{Handler, ListenerId, SubscribeOptions, Subscription, Topic};

/// Callback receiving isolated handler failures.
pub type ErrorHandler = Arc<dyn Fn(&ListenerError) + Send + Sync>;

struct BusState<T> {
    topics: HashMap<String, Topic<T>>,
    wildcard: Topic<T>,
    max_listeners: Option<usize>,
    error_handler: Option<ErrorHandler>,
    metrics: Option<PerformanceMetrics>,
}

impl<T> BusState<T> {
    fn topic_mut(&mut self, topic: &str) -> Option<&mut Topic<T>> {
        if topic == WILDCARD {
            Some(&mut self.wildcard)
        } else {
            self.topics.get_mut(topic)
        }
    }

    fn drop_empty_topics(&mut self) {
        self.topics.retain(|_, t| !t.is_empty());
    }
}

struct BusInner<T> {
    state: Mutex<BusState<T>>,
    next_id: AtomicU64,
}

/// Generic, priority-ordered, namespace- and wildcard-aware event bus.
///
/// Cheap to clone: clones share the same registry. Separate buses never share
/// subscription state.
pub struct EventBus<T> {
    inner: Arc<BusInner<T>>,
}

impl<T> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

impl<T> fmt::Debug for EventBus<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.inner.state.lock();
        f.debug_struct("EventBus")
            .field("topics", &st.topics.len())
            .field("wildcard", &st.wildcard.len())
            .finish()
    }
}

/// What a single emit will invoke, captured under the lock.
enum Targets<T> {
    None,
    Single(Arc<Subscription<T>>),
    Many(Vec<Arc<Subscription<T>>>),
}

impl<T: 'static> EventBus<T> {
    /// Creates a bus with the given configuration.
    pub fn new(cfg: BusConfig) -> Self {
        let state = BusState {
            topics: HashMap::new(),
            wildcard: Topic::default(),
            max_listeners: cfg.listener_limit(),
            error_handler: None,
            metrics: cfg
                .performance_monitoring
                .then(PerformanceMetrics::default),
        };
        Self {
            inner: Arc::new(BusInner {
                state: Mutex::new(state),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Wraps a closure into a shareable [`Handler`] (needed for [`off`](Self::off)).
    pub fn handler<F>(f: F) -> Handler<T>
    where
        F: Fn(&str, &T) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        Arc::new(f)
    }

    /// Registers `f` on `topic` (`"*"` for every topic).
    ///
    /// `opts.once` is ignored; use [`once`](Self::once) for one-shot handlers.
    pub fn on<F>(&self, topic: &str, f: F, opts: SubscribeOptions) -> ListenerId
    where
        F: Fn(&str, &T) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.add_listener(
            topic,
            Self::handler(f),
            SubscribeOptions {
                once: false,
                ..opts
            },
        )
    }

    /// Registers `f` on `topic`; it is removed after its first invocation.
    pub fn once<F>(&self, topic: &str, f: F, opts: SubscribeOptions) -> ListenerId
    where
        F: Fn(&str, &T) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.add_listener(
            topic,
            Self::handler(f),
            SubscribeOptions { once: true, ..opts },
        )
    }

    /// Registers a shared handler with explicit options (including `once`).
    ///
    /// Registering the same handler twice creates two independent entries.
    pub fn add_listener(
        &self,
        topic: &str,
        handler: Handler<T>,
        opts: SubscribeOptions,
    ) -> ListenerId {
        let id = ListenerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let sub = Arc::new(Subscription::new(id, handler, opts));

        let mut st = self.inner.state.lock();
        let limit = st.max_listeners;
        let count = if topic == WILDCARD {
            st.wildcard.push(sub)
        } else {
            st.topics.entry(topic.to_string()).or_default().push(sub)
        };
        drop(st);

        if let Some(max) = limit {
            if count == max + 1 {
                tracing::warn!(
                    topic,
                    count,
                    max,
                    "possible listener leak: topic exceeds max listeners"
                );
            }
        }
        id
    }

    /// Removes every registration of `handler` on `topic`, or all of the topic's
    /// handlers when `handler` is `None`. Returns how many were removed.
    pub fn off(&self, topic: &str, handler: Option<&Handler<T>>) -> usize {
        let mut st = self.inner.state.lock();
        let Some(t) = st.topic_mut(topic) else {
            return 0;
        };
        let removed = match handler {
            Some(h) => t.retain(|s| !s.same_handler(h)),
            None => t.clear(),
        };
        st.drop_empty_topics();
        removed
    }

    /// Removes one registration by id. Returns `true` if it existed.
    pub fn off_id(&self, id: ListenerId) -> bool {
        let mut st = self.inner.state.lock();
        let mut removed = st.wildcard.retain(|s| s.id != id);
        for t in st.topics.values_mut() {
            if removed > 0 {
                break;
            }
            removed += t.retain(|s| s.id != id);
        }
        st.drop_empty_topics();
        removed > 0
    }

    /// Removes every registration tagged with `namespace`, on all topics and the
    /// wildcard list, in one pass. Returns how many were removed.
    pub fn off_namespace(&self, namespace: &str) -> usize {
        let mut st = self.inner.state.lock();
        let mut removed = st.wildcard.retain(|s| !s.in_namespace(namespace));
        for t in st.topics.values_mut() {
            removed += t.retain(|s| !s.in_namespace(namespace));
        }
        st.drop_empty_topics();
        removed
    }

    /// Removes listeners selected by `pattern` (see [`TopicPattern`]); `None` removes all.
    ///
    /// Returns how many registrations were removed.
    pub fn remove_all_listeners(&self, pattern: Option<&str>) -> usize {
        let mut st = self.inner.state.lock();
        let Some(raw) = pattern else {
            let removed = st.wildcard.clear() + st.topics.values().map(Topic::len).sum::<usize>();
            st.topics.clear();
            return removed;
        };

        match TopicPattern::parse(raw) {
            TopicPattern::Wildcard => st.wildcard.clear(),
            pattern => {
                let mut removed = 0;
                st.topics.retain(|name, t| {
                    if pattern.matches(name) {
                        removed += t.len();
                        false
                    } else {
                        true
                    }
                });
                removed
            }
        }
    }

    /// Dispatches `payload` to `topic` handlers, then wildcard handlers.
    ///
    /// Returns the number of handlers invoked.
    pub fn emit(&self, topic: &str, payload: &T) -> usize {
        let (targets, error_handler) = self.snapshot(topic);

        let mut invoked = 0usize;
        let mut errors = 0usize;
        let mut fired_once: Vec<ListenerId> = Vec::new();

        let mut dispatch = |sub: &Subscription<T>| {
            if !sub.claim() {
                return;
            }
            invoked += 1;
            if let Err(err) = invoke(sub, topic, payload) {
                errors += 1;
                report(error_handler.as_ref(), &err);
            }
        };

        match &targets {
            Targets::None => {}
            Targets::Single(sub) => {
                dispatch(sub.as_ref());
                if sub.once {
                    fired_once.push(sub.id);
                }
            }
            Targets::Many(subs) => {
                for sub in subs {
                    dispatch(sub.as_ref());
                    if sub.once {
                        fired_once.push(sub.id);
                    }
                }
            }
        }

        self.finish_emit(topic, &fired_once, invoked, errors);
        invoked
    }

    /// Number of handlers registered on `topic` (wildcard handlers only for `"*"`).
    pub fn listener_count(&self, topic: &str) -> usize {
        let st = self.inner.state.lock();
        if topic == WILDCARD {
            st.wildcard.len()
        } else {
            st.topics.get(topic).map_or(0, Topic::len)
        }
    }

    /// Sorted names of topics with at least one handler (the wildcard list excluded).
    pub fn event_names(&self) -> Vec<String> {
        let st = self.inner.state.lock();
        let mut names: Vec<String> = st
            .topics
            .iter()
            .filter(|(_, t)| !t.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort_unstable();
        names
    }

    /// Handlers registered on `topic`, in dispatch order.
    pub fn listeners(&self, topic: &str) -> Vec<Handler<T>> {
        let mut st = self.inner.state.lock();
        st.topic_mut(topic)
            .map(|t| t.sorted().iter().map(|s| Arc::clone(&s.handler)).collect())
            .unwrap_or_default()
    }

    /// True if emitting `topic` would reach at least one handler (topic or wildcard).
    pub fn has_listeners(&self, topic: &str) -> bool {
        let st = self.inner.state.lock();
        !st.wildcard.is_empty() || st.topics.get(topic).is_some_and(|t| !t.is_empty())
    }

    /// Sets the per-topic overuse threshold (`0` = never warn).
    pub fn set_max_listeners(&self, max: usize) {
        self.inner.state.lock().max_listeners = (max > 0).then_some(max);
    }

    /// Routes isolated handler failures to `f` instead of the log.
    pub fn set_error_handler<F>(&self, f: F)
    where
        F: Fn(&ListenerError) + Send + Sync + 'static,
    {
        self.inner.state.lock().error_handler = Some(Arc::new(f));
    }

    /// Restores logging of handler failures.
    pub fn clear_error_handler(&self) {
        self.inner.state.lock().error_handler = None;
    }

    /// Turns emit counters on (reset to zero) or off (discarded).
    pub fn enable_performance_monitoring(&self, enabled: bool) {
        let mut st = self.inner.state.lock();
        st.metrics = enabled.then(PerformanceMetrics::default);
    }

    /// Current counters, or `None` while monitoring is disabled.
    pub fn performance_metrics(&self) -> Option<PerformanceMetrics> {
        self.inner.state.lock().metrics
    }

    /// Captures the handlers to invoke for `topic` under the lock.
    fn snapshot(&self, topic: &str) -> (Targets<T>, Option<ErrorHandler>) {
        let mut st = self.inner.state.lock();
        let error_handler = st.error_handler.clone();
        let wildcard_empty = st.wildcard.is_empty();

        if wildcard_empty {
            if let Some(single) = st.topics.get(topic).and_then(Topic::single) {
                return (Targets::Single(Arc::clone(single)), error_handler);
            }
        }

        let mut subs: Vec<Arc<Subscription<T>>> = Vec::new();
        if topic != WILDCARD {
            if let Some(t) = st.topics.get_mut(topic) {
                subs.extend(t.sorted().iter().cloned());
            }
        }
        subs.extend(st.wildcard.sorted().iter().cloned());

        let targets = if subs.is_empty() {
            Targets::None
        } else {
            Targets::Many(subs)
        };
        (targets, error_handler)
    }

    /// Post-dispatch bookkeeping: drop fired once-handlers and update counters.
    fn finish_emit(&self, topic: &str, fired_once: &[ListenerId], invoked: usize, errors: usize) {
        let mut st = self.inner.state.lock();
        if !fired_once.is_empty() {
            let gone = |s: &Subscription<T>| !fired_once.contains(&s.id);
            if let Some(t) = st.topics.get_mut(topic) {
                t.retain(gone);
            }
            st.wildcard.retain(gone);
            st.drop_empty_topics();
        }
        if let Some(m) = st.metrics.as_mut() {
            m.record(invoked, errors);
        }
    }
}

/// Runs one handler, converting both `Err` and panics into a [`ListenerError`].
fn invoke<T>(sub: &Subscription<T>, topic: &str, payload: &T) -> Result<(), ListenerError> {
    let outcome = catch_unwind(AssertUnwindSafe(|| (sub.handler)(topic, payload)));
    let (reason, panicked) = match outcome {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(e)) => (e.to_string(), false),
        Err(payload) => (panic_message(payload.as_ref()), true),
    };
    Err(ListenerError {
        topic: topic.to_string(),
        listener: sub.id,
        reason,
        panicked,
    })
}

fn report(handler: Option<&ErrorHandler>, err: &ListenerError) {
    match handler {
        Some(h) => h(err),
        None => tracing::error!(
            topic = %err.topic,
            listener = %err.listener,
            panicked = err.panicked,
            "event listener failed: {}",
            err.reason
        ),
    }
}
