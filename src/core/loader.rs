//! # ModuleLoader: on-demand capability construction.
//!
//! The loader owns every piece of per-instance state: module records, the
//! dependency graph, priorities and the statistics table. Handles are cheap
//! clones sharing that state; separate loaders share nothing.
//!
//! ## Architecture
//! ```text
//! load(name) ──► begin()
//!                 ├─► teardown set   → await it, then begin() again
//!                 ├─► Loaded         → cached instance
//!                 ├─► Loading        → clone of the in-flight SharedLoad
//!                 ├─► no provider    → UnknownCapability (no retry)
//!                 └─► otherwise      → tokio::spawn(load_with_retry) ──► settle(record)
//!                                      wrapped in Shared, stored in the record
//!
//! preload / load_multiple(names)
//!   ├─► sort roots by priority (desc), resolve graph (cycle → Err before any load)
//!   └─► async_pool(width, order) ─► each module awaits its dependencies, then load()
//!
//! unload(name) ──► teardown set? clone it : tokio::spawn(run_unload) stored as SharedUnload
//!   run_unload: await in-flight load ─► destroy() ─► remove record ─► publish module:unloaded
//! ```
//!
//! ## Rules
//! - At most one in-flight load per name; overlapping `load` calls get the same instance.
//! - A load runs on its own task: dropping the caller never strands a `Loading` record.
//! - The state lock is never held across `.await` nor while publishing events.
//! - `unload` waits for an in-flight load to settle before tearing the instance down.
//! - A teardown runs on its own task: dropping the `unload` caller still destroys the instance.
//! - One teardown per record; only that task removes the record.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::time;

use crate::{
    capabilities::{CapabilityRef, Factory, Providers},
    config::LoaderConfig,
    core::{
        attempt,
        builder::LoaderBuilder,
        graph::DependencyGraph,
        registry::{ModuleRecord, ModuleState, SharedLoad, SharedUnload},
        stats::{LoadStats, StatsTable},
    },
    error::{panic_message, CapabilityError, LoaderError},
    events::{EventBus, LoaderEvent, LoaderEventKind},
    pool::async_pool,
};

/// Outcome of [`ModuleLoader::preload`].
#[derive(Debug, Default, Clone)]
pub struct PreloadReport {
    /// Modules loaded by this call, in completion-independent resolution order.
    pub loaded: Vec<String>,
    /// Modules that failed, with their error.
    pub failed: Vec<(String, LoaderError)>,
}

impl PreloadReport {
    /// Returns `true` if nothing failed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub(crate) struct LoaderState {
    records: HashMap<String, ModuleRecord>,
    graph: DependencyGraph,
    priorities: HashMap<String, i32>,
    stats: StatsTable,
}

pub(crate) struct LoaderInner {
    pub(crate) cfg: LoaderConfig,
    providers: Providers,
    events: Option<EventBus<LoaderEvent>>,
    state: Mutex<LoaderState>,
}

impl LoaderInner {
    /// Emits `ev` on the attached event bus, if any.
    pub(crate) fn publish(&self, ev: LoaderEvent) {
        if let Some(bus) = &self.events {
            bus.emit(ev.topic(), &ev);
        }
    }

    pub(crate) fn record_attempt(&self, name: &str, elapsed: Duration, ok: bool) {
        self.state.lock().stats.record(name, elapsed, ok);
    }

    fn settle(&self, name: &str, outcome: &Result<CapabilityRef, LoaderError>) {
        let mut st = self.state.lock();
        if let Some(rec) = st.records.get_mut(name) {
            if rec.state == ModuleState::Loading {
                rec.settle(outcome);
            }
        }
    }
}

enum Begin {
    Ready(CapabilityRef),
    Pending(SharedLoad),
    Draining(SharedUnload),
}

/// Loads capability modules on demand.
///
/// Cheap to clone; clones share state.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use capcore::{Capability, CapabilityError, CapabilityRef, LoaderConfig, ModuleLoader};
/// use serde_json::json;
///
/// struct Network;
///
/// #[async_trait]
/// impl Capability for Network {
///     fn name(&self) -> &str { "network" }
///     async fn init(&self) -> Result<(), CapabilityError> { Ok(()) }
///     async fn destroy(&self) -> Result<(), CapabilityError> { Ok(()) }
///     fn data(&self) -> serde_json::Value { json!({ "online": true }) }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), capcore::LoaderError> {
/// let loader = ModuleLoader::builder(LoaderConfig::default())
///     .provider("network", || Ok(Arc::new(Network) as CapabilityRef))
///     .build();
///
/// let data = loader.load_data("network").await?;
/// assert_eq!(data["online"], true);
/// assert!(loader.is_loaded("network"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ModuleLoader {
    inner: Arc<LoaderInner>,
}

impl ModuleLoader {
    /// Starts a builder with the given configuration.
    pub fn builder(cfg: LoaderConfig) -> LoaderBuilder {
        LoaderBuilder::new(cfg)
    }

    /// Creates a loader without an event bus.
    pub fn new(cfg: LoaderConfig, providers: Providers) -> Self {
        Self::with_parts(cfg, providers, None)
    }

    pub(crate) fn with_parts(
        cfg: LoaderConfig,
        providers: Providers,
        events: Option<EventBus<LoaderEvent>>,
    ) -> Self {
        let state = LoaderState {
            records: HashMap::new(),
            graph: DependencyGraph::default(),
            priorities: HashMap::new(),
            stats: StatsTable::new(cfg.stats_limit(), cfg.stats_retain),
        };
        Self {
            inner: Arc::new(LoaderInner {
                cfg,
                providers,
                events,
                state: Mutex::new(state),
            }),
        }
    }

    /// Returns the loader configuration.
    pub fn config(&self) -> &LoaderConfig {
        &self.inner.cfg
    }

    /// Returns the provider registry.
    pub fn providers(&self) -> &Providers {
        &self.inner.providers
    }

    /// Returns the loaded instance of `name`, constructing it if needed.
    ///
    /// Overlapping calls for the same name share one in-flight load. A call made
    /// while the module is being unloaded waits for the teardown and builds a new instance.
    pub async fn load(&self, name: &str) -> Result<CapabilityRef, LoaderError> {
        loop {
            match self.begin(name)? {
                Begin::Ready(instance) => return Ok(instance),
                Begin::Pending(load) => return load.await,
                Begin::Draining(unload) => unload.await,
            }
        }
    }

    /// Loads `name` and returns its data snapshot.
    pub async fn load_data(&self, name: &str) -> Result<serde_json::Value, LoaderError> {
        Ok(self.load(name).await?.data())
    }

    /// Like [`load`](Self::load), but gives up waiting after `timeout`.
    ///
    /// The load itself keeps running and settles its record normally.
    pub async fn load_with_timeout(
        &self,
        name: &str,
        timeout: Duration,
    ) -> Result<CapabilityRef, LoaderError> {
        match time::timeout(timeout, self.load(name)).await {
            Ok(res) => res,
            Err(_elapsed) => Err(LoaderError::Timeout {
                name: name.to_string(),
                timeout,
            }),
        }
    }

    /// Tears `name` down and removes its record.
    ///
    /// An in-flight load is awaited first. `destroy` errors are logged and swallowed.
    /// The teardown runs on its own task, so it completes even if this future is
    /// dropped; overlapping calls wait for the same teardown.
    pub async fn unload(&self, name: &str) {
        let unload = {
            let mut st = self.inner.state.lock();
            let Some(rec) = st.records.get_mut(name) else {
                return;
            };
            match rec.teardown.clone() {
                Some(unload) => unload,
                None => {
                    let unload = self.spawn_unload(name);
                    rec.teardown = Some(unload.clone());
                    unload
                }
            }
        };
        unload.await;
    }

    /// Unloads every known module.
    pub async fn unload_all(&self) {
        let names: Vec<String> = self.inner.state.lock().records.keys().cloned().collect();
        future::join_all(names.iter().map(|n| self.unload(n))).await;
    }

    /// Returns `true` if `name` is loaded.
    pub fn is_loaded(&self, name: &str) -> bool {
        self.state(name) == ModuleState::Loaded
    }

    /// Names of all loaded modules, sorted.
    pub fn loaded_modules(&self) -> Vec<String> {
        let st = self.inner.state.lock();
        let mut names: Vec<String> = st
            .records
            .iter()
            .filter(|(_, r)| r.state == ModuleState::Loaded)
            .map(|(n, _)| n.clone())
            .collect();
        names.sort_unstable();
        names
    }

    /// Lifecycle state of `name` (`Unloaded` if unknown).
    pub fn state(&self, name: &str) -> ModuleState {
        self.inner
            .state
            .lock()
            .records
            .get(name)
            .map_or(ModuleState::Unloaded, |r| r.state)
    }

    /// Declares the dependencies of `name`, replacing earlier ones.
    ///
    /// Consulted by [`preload`](Self::preload) and [`load_multiple`](Self::load_multiple) only.
    pub fn set_dependencies<I, S>(&self, name: &str, deps: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let deps: Vec<String> = deps.into_iter().map(Into::into).collect();
        self.inner.state.lock().graph.set(name, deps);
    }

    /// Returns the declared dependencies of `name`.
    pub fn dependencies(&self, name: &str) -> Vec<String> {
        self.inner.state.lock().graph.dependencies(name).to_vec()
    }

    /// Sets the priority of `name`; higher priorities are scheduled first.
    pub fn set_priority(&self, name: &str, priority: i32) {
        self.inner
            .state
            .lock()
            .priorities
            .insert(name.to_string(), priority);
    }

    /// Loads `names` and their dependencies through the pool, best effort.
    ///
    /// Already-loaded modules are skipped. Individual failures are logged and
    /// collected in the report; only a dependency cycle is returned as `Err`.
    pub async fn preload<I, S>(&self, names: I) -> Result<PreloadReport, LoaderError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let requested: Vec<S> = names.into_iter().collect();
        let order = self.plan(&requested)?;
        let pending: Vec<String> = order.into_iter().filter(|n| !self.is_loaded(n)).collect();
        let width = self.inner.cfg.pool_width(pending.len());

        let results = async_pool(width, pending, |name| async move {
            let res = self.load_after_dependencies(&name, &[]).await;
            (name, res)
        })
        .await;

        let mut report = PreloadReport::default();
        for (name, res) in results {
            match res {
                Ok(_) => report.loaded.push(name),
                Err(err) => {
                    tracing::warn!(module = %name, error = %err, "preload failed");
                    report.failed.push((name, err));
                }
            }
        }
        Ok(report)
    }

    /// Loads `names` and their dependencies with at most `concurrency` loads in flight
    /// (`0` = unbounded). The result follows the order of `names`.
    ///
    /// The first failure in resolution order is returned.
    pub async fn load_multiple<I, S>(
        &self,
        names: I,
        concurrency: usize,
    ) -> Result<Vec<CapabilityRef>, LoaderError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let requested: Vec<S> = names.into_iter().collect();
        let order = self.plan(&requested)?;
        let width = if concurrency == 0 {
            order.len().max(1)
        } else {
            concurrency
        };

        let results = async_pool(width, order, |name| async move {
            let res = self.load_after_dependencies(&name, &[]).await;
            (name, res)
        })
        .await;

        let mut loaded = HashMap::with_capacity(results.len());
        for (name, res) in results {
            loaded.insert(name, res?);
        }
        requested
            .iter()
            .map(|n| {
                let n = n.as_ref();
                loaded
                    .get(n)
                    .cloned()
                    .ok_or_else(|| LoaderError::UnknownCapability { name: n.to_string() })
            })
            .collect()
    }

    /// Per-module statistics snapshot.
    pub fn loading_stats(&self) -> HashMap<String, LoadStats> {
        self.inner.state.lock().stats.snapshot()
    }

    /// Drops all statistics.
    pub fn clear_stats(&self) {
        self.inner.state.lock().stats.clear();
    }

    /// Sorts `roots` by priority (desc, stable) and resolves them into a load order.
    fn plan<S: AsRef<str>>(&self, roots: &[S]) -> Result<Vec<String>, LoaderError> {
        let st = self.inner.state.lock();
        let mut roots: Vec<&str> = roots.iter().map(AsRef::as_ref).collect();
        roots.sort_by_key(|n| Reverse(st.priorities.get(*n).copied().unwrap_or(0)));
        st.graph.resolve(roots)
    }

    /// Loads the declared dependencies of `name` (recursively, in order), then `name`.
    fn load_after_dependencies<'a>(
        &'a self,
        name: &'a str,
        chain: &'a [String],
    ) -> BoxFuture<'a, Result<CapabilityRef, LoaderError>> {
        async move {
            let deps = self.dependencies(name);
            if !deps.is_empty() {
                let mut path = chain.to_vec();
                path.push(name.to_string());

                for dep in &deps {
                    if let Some(pos) = path.iter().position(|n| n == dep) {
                        let mut cycle = path[pos..].to_vec();
                        cycle.push(dep.clone());
                        return Err(LoaderError::CycleDependency { cycle });
                    }
                    if let Err(err) = self.load_after_dependencies(dep, &path).await {
                        return Err(LoaderError::DependencyFailed {
                            name: name.to_string(),
                            dependency: dep.clone(),
                            reason: err.to_string(),
                        });
                    }
                }
            }
            self.load(name).await
        }
        .boxed()
    }

    fn begin(&self, name: &str) -> Result<Begin, LoaderError> {
        let mut st = self.inner.state.lock();
        if let Some(rec) = st.records.get(name) {
            if let Some(unload) = &rec.teardown {
                return Ok(Begin::Draining(unload.clone()));
            }
            match (rec.state, &rec.instance, &rec.in_flight) {
                (ModuleState::Loaded, Some(instance), _) => {
                    return Ok(Begin::Ready(Arc::clone(instance)))
                }
                (ModuleState::Loading, _, Some(load)) => return Ok(Begin::Pending(load.clone())),
                _ => {}
            }
        }

        let Some(factory) = self.inner.providers.get(name) else {
            drop(st);
            tracing::debug!(module = %name, "no provider registered");
            return Err(LoaderError::UnknownCapability {
                name: name.to_string(),
            });
        };

        let load = self.spawn_load(name, factory);
        st.records
            .insert(name.to_string(), ModuleRecord::loading(load.clone()));
        Ok(Begin::Pending(load))
    }

    /// Spawns the attempt loop for `name` and wraps its join handle for sharing.
    fn spawn_load(&self, name: &str, factory: Factory) -> SharedLoad {
        let inner = Arc::clone(&self.inner);
        let owned = name.to_string();
        let join = tokio::spawn(async move {
            tracing::debug!(module = %owned, "loading module");
            inner.publish(LoaderEvent::new(LoaderEventKind::Loading).with_module(owned.as_str()));
            let outcome = attempt::load_with_retry(&inner, &owned, &factory).await;
            inner.settle(&owned, &outcome);
            outcome
        });

        let inner = Arc::clone(&self.inner);
        let name = name.to_string();
        async move {
            match join.await {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::error!(module = %name, error = %err, "load task ended abnormally");
                    let outcome = Err(LoaderError::Aborted { name: name.clone() });
                    inner.settle(&name, &outcome);
                    outcome
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Spawns the teardown of `name` and wraps its join handle for sharing.
    fn spawn_unload(&self, name: &str) -> SharedUnload {
        let inner = Arc::clone(&self.inner);
        let owned = name.to_string();
        let join = tokio::spawn(async move { run_unload(&inner, &owned).await });

        let inner = Arc::clone(&self.inner);
        let name = name.to_string();
        async move {
            if let Err(err) = join.await {
                tracing::error!(module = %name, error = %err, "unload task ended abnormally");
                inner.state.lock().records.remove(&name);
            }
        }
        .boxed()
        .shared()
    }
}

/// Waits out an in-flight load, destroys the instance and removes the record.
async fn run_unload(inner: &LoaderInner, name: &str) {
    let instance = loop {
        let pending = {
            let mut st = inner.state.lock();
            let Some(rec) = st.records.get_mut(name) else {
                return;
            };
            match rec.in_flight.clone() {
                Some(load) => load,
                None => break rec.take_instance(),
            }
        };
        let _ = pending.await;
    };

    if let Some(instance) = &instance {
        if let Err(err) = teardown(instance).await {
            tracing::warn!(module = %name, error = %err, "teardown failed; removing record anyway");
            inner.publish(
                LoaderEvent::new(LoaderEventKind::TeardownFailed)
                    .with_module(name)
                    .with_reason(err.as_message()),
            );
        }
    }

    inner.state.lock().records.remove(name);

    if instance.is_some() {
        tracing::debug!(module = %name, "module unloaded");
        inner.publish(LoaderEvent::new(LoaderEventKind::Unloaded).with_module(name));
    }
}

impl std::fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("providers", &self.inner.providers)
            .field("loaded", &self.loaded_modules())
            .finish()
    }
}

/// Runs `destroy`, turning a panic into an error.
async fn teardown(instance: &CapabilityRef) -> Result<(), CapabilityError> {
    match AssertUnwindSafe(instance.destroy()).catch_unwind().await {
        Ok(res) => res,
        Err(payload) => Err(CapabilityError::Panicked {
            info: panic_message(payload.as_ref()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SubscribeOptions;
    use crate::policies::RetryPolicy;
    use crate::Capability;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    struct Stub {
        name: &'static str,
        init_delay: Duration,
        destroy_delay: Duration,
        fail_destroy: bool,
        destroyed: Arc<AtomicUsize>,
        torn_down: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Capability for Stub {
        fn name(&self) -> &str {
            self.name
        }

        async fn init(&self) -> Result<(), CapabilityError> {
            if !self.init_delay.is_zero() {
                time::sleep(self.init_delay).await;
            }
            Ok(())
        }

        async fn destroy(&self) -> Result<(), CapabilityError> {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
            if !self.destroy_delay.is_zero() {
                time::sleep(self.destroy_delay).await;
            }
            self.torn_down.fetch_add(1, Ordering::SeqCst);
            if self.fail_destroy {
                return Err(CapabilityError::fail("listener still attached"));
            }
            Ok(())
        }

        fn data(&self) -> serde_json::Value {
            json!({ "name": self.name })
        }
    }

    struct Bomb;

    #[async_trait]
    impl Capability for Bomb {
        fn name(&self) -> &str {
            "bomb"
        }
        async fn init(&self) -> Result<(), CapabilityError> {
            panic!("init exploded")
        }
        async fn destroy(&self) -> Result<(), CapabilityError> {
            Ok(())
        }
        fn data(&self) -> serde_json::Value {
            serde_json::Value::Null
        }
    }

    /// Shared counters behind test factories.
    #[derive(Clone, Default)]
    struct Harness {
        constructed: Arc<Mutex<Vec<String>>>,
        destroyed: Arc<AtomicUsize>,
        torn_down: Arc<AtomicUsize>,
    }

    impl Harness {
        fn ok(
            &self,
            name: &'static str,
        ) -> impl Fn() -> Result<CapabilityRef, CapabilityError> + Send + Sync + 'static {
            self.module(name, Duration::ZERO, false)
        }

        fn module(
            &self,
            name: &'static str,
            init_delay: Duration,
            fail_destroy: bool,
        ) -> impl Fn() -> Result<CapabilityRef, CapabilityError> + Send + Sync + 'static {
            self.factory(name, init_delay, Duration::ZERO, fail_destroy)
        }

        /// Instances whose `destroy` takes `delay` to finish.
        fn slow_teardown(
            &self,
            name: &'static str,
            delay: Duration,
        ) -> impl Fn() -> Result<CapabilityRef, CapabilityError> + Send + Sync + 'static {
            self.factory(name, Duration::ZERO, delay, false)
        }

        fn factory(
            &self,
            name: &'static str,
            init_delay: Duration,
            destroy_delay: Duration,
            fail_destroy: bool,
        ) -> impl Fn() -> Result<CapabilityRef, CapabilityError> + Send + Sync + 'static {
            let h = self.clone();
            move || {
                h.constructed.lock().push(name.to_string());
                Ok(Arc::new(Stub {
                    name,
                    init_delay,
                    destroy_delay,
                    fail_destroy,
                    destroyed: Arc::clone(&h.destroyed),
                    torn_down: Arc::clone(&h.torn_down),
                }) as CapabilityRef)
            }
        }

        fn constructed(&self) -> Vec<String> {
            self.constructed.lock().clone()
        }

        fn destroyed(&self) -> usize {
            self.destroyed.load(Ordering::SeqCst)
        }

        /// Number of `destroy` calls that ran to completion.
        fn torn_down(&self) -> usize {
            self.torn_down.load(Ordering::SeqCst)
        }
    }

    fn failing(
        calls: &Arc<AtomicU32>,
        err: CapabilityError,
    ) -> impl Fn() -> Result<CapabilityRef, CapabilityError> + Send + Sync + 'static {
        let calls = Arc::clone(calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(err.clone())
        }
    }

    fn names(list: &[CapabilityRef]) -> Vec<&str> {
        list.iter().map(|c| c.name()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_loads_share_one_construction() {
        let h = Harness::default();
        let loader = ModuleLoader::builder(LoaderConfig::default())
            .provider("battery", h.module("battery", Duration::from_millis(50), false))
            .build();

        let (a, b) = tokio::join!(loader.load("battery"), loader.load("battery"));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(h.constructed(), vec!["battery"]);

        let c = loader.load("battery").await.unwrap();
        assert!(Arc::ptr_eq(&a, &c));
        assert_eq!(h.constructed().len(), 1);
    }

    #[tokio::test]
    async fn unknown_name_fails_without_attempts() {
        let loader = ModuleLoader::new(LoaderConfig::default(), Providers::new());

        let err = loader.load("teleport").await.err().unwrap();
        assert!(matches!(err, LoaderError::UnknownCapability { ref name } if name == "teleport"));
        assert!(loader.loading_stats().is_empty());
        assert_eq!(loader.state("teleport"), ModuleState::Unloaded);
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_factory_is_tried_max_retries_plus_one() {
        let calls = Arc::new(AtomicU32::new(0));
        let loader = ModuleLoader::builder(LoaderConfig::default())
            .provider("net", failing(&calls, CapabilityError::fail("offline")))
            .build();

        let err = loader.load("net").await.err().unwrap();
        match err {
            LoaderError::LoadFailed { name, attempts, .. } => {
                assert_eq!(name, "net");
                assert_eq!(attempts, 4);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(loader.state("net"), ModuleState::Failed);
        assert_eq!(loader.loading_stats()["net"].errors, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_is_linear_between_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let cfg = LoaderConfig {
            retry: RetryPolicy::default().with_base_delay(Duration::from_millis(10)),
            ..LoaderConfig::default()
        };
        let loader = ModuleLoader::builder(cfg)
            .provider("net", failing(&calls, CapabilityError::fail("offline")))
            .build();

        let started = time::Instant::now();
        let _ = loader.load("net").await;
        // 10 + 20 + 30 ms of backoff between four attempts.
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(60), "{waited:?}");
        assert!(waited < Duration::from_millis(70), "{waited:?}");
    }

    #[tokio::test]
    async fn fatal_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let loader = ModuleLoader::builder(LoaderConfig::default())
            .provider("geo", failing(&calls, CapabilityError::fatal("permission denied")))
            .build();

        let err = loader.load("geo").await.err().unwrap();
        assert!(matches!(err, LoaderError::LoadFailed { attempts: 1, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_recover() {
        let h = Harness::default();
        let calls = Arc::new(AtomicU32::new(0));
        let ok = h.ok("clipboard");
        let counter = Arc::clone(&calls);
        let loader = ModuleLoader::builder(LoaderConfig::default())
            .provider("clipboard", move || {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(CapabilityError::fail("busy"))
                } else {
                    ok()
                }
            })
            .build();

        loader.load("clipboard").await.unwrap();
        let stats = &loader.loading_stats()["clipboard"];
        assert_eq!(stats.load_count, 1);
        assert_eq!(stats.errors, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn panicking_init_is_a_failed_attempt() {
        let cfg = LoaderConfig {
            retry: RetryPolicy::never(),
            ..LoaderConfig::default()
        };
        let loader = ModuleLoader::builder(cfg)
            .provider("bomb", || Ok(Arc::new(Bomb) as CapabilityRef))
            .build();

        let err = loader.load("bomb").await.err().unwrap();
        match err {
            LoaderError::LoadFailed { error, .. } => {
                assert_eq!(
                    error,
                    CapabilityError::Panicked {
                        info: "init exploded".into()
                    }
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_record_is_retried_on_next_load() {
        let calls = Arc::new(AtomicU32::new(0));
        let loader = ModuleLoader::builder(LoaderConfig::default())
            .provider("wake-lock", failing(&calls, CapabilityError::fatal("nope")))
            .build();

        assert!(loader.load("wake-lock").await.is_err());
        assert!(loader.load("wake-lock").await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dependencies_are_constructed_first() {
        let h = Harness::default();
        let loader = ModuleLoader::builder(LoaderConfig::default())
            .provider("a", h.ok("a"))
            .provider("b", h.ok("b"))
            .build();
        loader.set_dependencies("b", ["a"]);

        let out = loader.load_multiple(["b"], 3).await.unwrap();

        assert_eq!(names(&out), vec!["b"]);
        assert_eq!(h.constructed(), vec!["a", "b"]);
        assert_eq!(loader.loaded_modules(), vec!["a", "b"]);
        assert!(loader.is_loaded("a") && loader.is_loaded("b"));
    }

    #[tokio::test]
    async fn cycle_is_rejected_before_any_construction() {
        let h = Harness::default();
        let loader = ModuleLoader::builder(LoaderConfig::default())
            .provider("a", h.ok("a"))
            .provider("b", h.ok("b"))
            .build();
        loader.set_dependencies("a", ["b"]);
        loader.set_dependencies("b", ["a"]);

        let err = loader.load_multiple(["a"], 3).await.err().unwrap();
        assert!(matches!(err, LoaderError::CycleDependency { .. }));
        assert!(loader.preload(["b"]).await.is_err());
        assert!(h.constructed().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn load_multiple_keeps_input_order() {
        let h = Harness::default();
        let loader = ModuleLoader::builder(LoaderConfig::default())
            .provider("a", h.module("a", Duration::from_millis(30), false))
            .provider("b", h.module("b", Duration::from_millis(10), false))
            .provider("c", h.module("c", Duration::from_millis(20), false))
            .build();

        let out = loader.load_multiple(["c", "a", "b"], 0).await.unwrap();
        assert_eq!(names(&out), vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn higher_priority_roots_load_first() {
        let h = Harness::default();
        let loader = ModuleLoader::builder(LoaderConfig::default())
            .provider("low", h.ok("low"))
            .provider("high", h.ok("high"))
            .build();
        loader.set_priority("low", 1);
        loader.set_priority("high", 10);

        loader.load_multiple(["low", "high"], 1).await.unwrap();
        assert_eq!(h.constructed(), vec!["high", "low"]);
    }

    #[tokio::test]
    async fn load_multiple_propagates_failure() {
        let h = Harness::default();
        let calls = Arc::new(AtomicU32::new(0));
        let loader = ModuleLoader::builder(LoaderConfig::default())
            .provider("ok", h.ok("ok"))
            .provider("bad", failing(&calls, CapabilityError::fatal("absent")))
            .build();

        let err = loader.load_multiple(["ok", "bad"], 2).await.err().unwrap();
        assert_eq!(err.module(), Some("bad"));
    }

    #[tokio::test]
    async fn preload_collects_failures() {
        let h = Harness::default();
        let calls = Arc::new(AtomicU32::new(0));
        let loader = ModuleLoader::builder(LoaderConfig::default())
            .provider("a", h.ok("a"))
            .provider("bad", failing(&calls, CapabilityError::fatal("absent")))
            .provider("c", h.ok("c"))
            .build();
        loader.set_dependencies("c", ["bad"]);

        let report = loader.preload(["a", "c"]).await.unwrap();

        assert_eq!(report.loaded, vec!["a"]);
        assert!(!report.is_complete());
        let failed: Vec<&str> = report.failed.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(failed, vec!["bad", "c"]);
        assert!(matches!(
            report.failed[1].1,
            LoaderError::DependencyFailed { ref dependency, .. } if dependency == "bad"
        ));
        assert_eq!(h.constructed(), vec!["a"]);
    }

    #[tokio::test]
    async fn preload_skips_loaded_modules() {
        let h = Harness::default();
        let loader = ModuleLoader::builder(LoaderConfig::default())
            .provider("a", h.ok("a"))
            .provider("b", h.ok("b"))
            .build();
        loader.load("a").await.unwrap();

        let report = loader.preload(["a", "b"]).await.unwrap();
        assert_eq!(report.loaded, vec!["b"]);
        assert_eq!(h.constructed(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn teardown_error_is_swallowed() {
        let h = Harness::default();
        let loader = ModuleLoader::builder(LoaderConfig::default())
            .provider("media", h.module("media", Duration::ZERO, true))
            .build();
        loader.load("media").await.unwrap();

        loader.unload("media").await;

        assert_eq!(h.destroyed(), 1);
        assert!(!loader.is_loaded("media"));
        assert!(loader.loaded_modules().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unload_waits_for_in_flight_load() {
        let h = Harness::default();
        let loader = ModuleLoader::builder(LoaderConfig::default())
            .provider("slow", h.module("slow", Duration::from_secs(1), false))
            .build();

        let bg = {
            let loader = loader.clone();
            tokio::spawn(async move { loader.load("slow").await })
        };
        tokio::task::yield_now().await;
        assert_eq!(loader.state("slow"), ModuleState::Loading);

        loader.unload("slow").await;

        assert!(bg.await.unwrap().is_ok());
        assert_eq!(h.destroyed(), 1);
        assert_eq!(loader.state("slow"), ModuleState::Unloaded);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_unload_still_tears_down() {
        let h = Harness::default();
        let loader = ModuleLoader::builder(LoaderConfig::default())
            .provider("slow", h.module("slow", Duration::from_secs(1), false))
            .build();

        let bg = {
            let loader = loader.clone();
            tokio::spawn(async move { loader.load("slow").await })
        };
        tokio::task::yield_now().await;

        let gave_up = time::timeout(Duration::from_millis(10), loader.unload("slow")).await;
        assert!(gave_up.is_err());

        assert!(bg.await.unwrap().is_ok());
        time::sleep(Duration::from_millis(10)).await;

        assert_eq!(h.destroyed(), 1);
        assert_eq!(loader.state("slow"), ModuleState::Unloaded);
        assert!(loader.loaded_modules().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_unloads_share_one_teardown() {
        let h = Harness::default();
        let loader = ModuleLoader::builder(LoaderConfig::default())
            .provider("media", h.slow_teardown("media", Duration::from_secs(1)))
            .build();
        loader.load("media").await.unwrap();

        let bg = {
            let loader = loader.clone();
            tokio::spawn(async move { loader.unload("media").await })
        };
        tokio::task::yield_now().await;

        loader.unload("media").await;
        assert_eq!(h.torn_down(), 1);

        bg.await.unwrap();
        assert_eq!(h.destroyed(), 1);
        assert_eq!(loader.state("media"), ModuleState::Unloaded);
    }

    #[tokio::test(start_paused = true)]
    async fn load_during_teardown_builds_a_fresh_instance() {
        let h = Harness::default();
        let loader = ModuleLoader::builder(LoaderConfig::default())
            .provider("media", h.slow_teardown("media", Duration::from_secs(1)))
            .build();
        let first = loader.load("media").await.unwrap();

        let bg = {
            let loader = loader.clone();
            tokio::spawn(async move { loader.unload("media").await })
        };
        tokio::task::yield_now().await;

        let second = loader.load("media").await.unwrap();
        assert_eq!(h.torn_down(), 1);
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(h.constructed().len(), 2);

        bg.await.unwrap();
        assert!(loader.is_loaded("media"));
        assert_eq!(h.destroyed(), 1);
    }

    #[tokio::test]
    async fn unload_all_tears_everything_down() {
        let h = Harness::default();
        let loader = ModuleLoader::builder(LoaderConfig::default())
            .provider("a", h.ok("a"))
            .provider("b", h.ok("b"))
            .build();
        loader.load_multiple(["a", "b"], 2).await.unwrap();

        loader.unload_all().await;
        assert_eq!(h.destroyed(), 2);
        assert!(loader.loaded_modules().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_leaves_load_running() {
        let h = Harness::default();
        let loader = ModuleLoader::builder(LoaderConfig::default())
            .provider("slow", h.module("slow", Duration::from_secs(1), false))
            .build();

        let err = loader
            .load_with_timeout("slow", Duration::from_millis(100))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, LoaderError::Timeout { .. }));
        assert_eq!(loader.state("slow"), ModuleState::Loading);

        loader.load("slow").await.unwrap();
        assert_eq!(h.constructed().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stats_table_is_trimmed_to_most_recent() {
        let h = Harness::default();
        let cfg = LoaderConfig {
            stats_cleanup_threshold: 2,
            stats_retain: 1,
            ..LoaderConfig::default()
        };
        let loader = ModuleLoader::builder(cfg)
            .provider("a", h.ok("a"))
            .provider("b", h.ok("b"))
            .provider("c", h.ok("c"))
            .build();

        for name in ["a", "b", "c"] {
            loader.load(name).await.unwrap();
            time::advance(Duration::from_millis(1)).await;
        }

        let stats = loader.loading_stats();
        assert_eq!(stats.keys().collect::<Vec<_>>(), vec!["c"]);
        loader.clear_stats();
        assert!(loader.loading_stats().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn lifecycle_events_are_published() {
        let bus: EventBus<LoaderEvent> = EventBus::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            bus.on(
                "*",
                move |topic, ev: &LoaderEvent| {
                    seen.lock().push((topic.to_string(), ev.attempt));
                    Ok(())
                },
                SubscribeOptions::default(),
            );
        }

        let h = Harness::default();
        let ok = h.ok("net");
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let loader = ModuleLoader::builder(LoaderConfig::default())
            .provider("net", move || {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(CapabilityError::fail("offline"))
                } else {
                    ok()
                }
            })
            .with_events(bus.clone())
            .build();

        loader.load("net").await.unwrap();
        loader.unload("net").await;

        let topics: Vec<(String, Option<u32>)> = seen.lock().clone();
        assert_eq!(
            topics,
            vec![
                ("module:loading".to_string(), None),
                ("module:retry".to_string(), Some(1)),
                ("module:loaded".to_string(), Some(2)),
                ("module:unloaded".to_string(), None),
            ]
        );
    }
}
