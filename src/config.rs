//! # Runtime configuration.
//!
//! Provides the settings structs for the three core components:
//! - [`LoaderConfig`] for [`ModuleLoader`](crate::ModuleLoader)
//! - [`BusConfig`] for [`EventBus`](crate::EventBus)
//! - [`CacheConfig`] for [`ExpiringCache`](crate::ExpiringCache)
//!
//! ## Sentinel values
//! - `LoaderConfig::concurrency = 0` → unlimited pool width
//! - `LoaderConfig::stats_cleanup_threshold = 0` → statistics never trimmed
//! - `BusConfig::max_listeners = 0` → no overuse warning
//! - `CacheConfig::capacity = 0` → unbounded
//! - `CacheConfig::ttl = 0s` → entries never expire

use std::time::Duration;

use crate::policies::RetryPolicy;

/// Configuration for the module loader.
///
/// ## Field semantics
/// - `retry`: retry budget and backoff between attempts of one load
/// - `concurrency`: default pool width for `preload` (`0` = unlimited)
/// - `stats_cleanup_threshold`: statistics table size that triggers a trim (`0` = never)
/// - `stats_retain`: number of most-recently-loaded entries kept by a trim
#[derive(Clone, Debug)]
pub struct LoaderConfig {
    /// Retry policy applied to every load attempt loop.
    pub retry: RetryPolicy,

    /// Maximum number of simultaneously unsettled loads issued by `preload`.
    pub concurrency: usize,

    /// When the statistics table grows beyond this many modules, it is trimmed.
    pub stats_cleanup_threshold: usize,

    /// Number of entries kept (most recently loaded first) when trimming statistics.
    pub stats_retain: usize,
}

impl LoaderConfig {
    /// Returns the pool width, mapping the `0` sentinel to "as wide as the input".
    #[inline]
    pub fn pool_width(&self, items: usize) -> usize {
        if self.concurrency == 0 {
            items.max(1)
        } else {
            self.concurrency
        }
    }

    /// Returns the trim threshold as an `Option` (`None` = never trim).
    #[inline]
    pub fn stats_limit(&self) -> Option<usize> {
        if self.stats_cleanup_threshold == 0 {
            None
        } else {
            Some(self.stats_cleanup_threshold)
        }
    }
}

impl Default for LoaderConfig {
    /// Default configuration:
    ///
    /// - `retry = RetryPolicy::default()` (3 retries, linear 100ms backoff)
    /// - `concurrency = 3`
    /// - `stats_cleanup_threshold = 100`
    /// - `stats_retain = 50`
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            concurrency: 3,
            stats_cleanup_threshold: 100,
            stats_retain: 50,
        }
    }
}

/// Configuration for an event bus.
#[derive(Clone, Debug)]
pub struct BusConfig {
    /// Per-topic listener count above which a warning is logged (`0` = never warn).
    pub max_listeners: usize,

    /// Whether emit counters are collected from the start.
    pub performance_monitoring: bool,
}

impl BusConfig {
    /// Returns the overuse threshold as an `Option`.
    #[inline]
    pub fn listener_limit(&self) -> Option<usize> {
        if self.max_listeners == 0 {
            None
        } else {
            Some(self.max_listeners)
        }
    }
}

impl Default for BusConfig {
    /// `max_listeners = 100`, performance monitoring off.
    fn default() -> Self {
        Self {
            max_listeners: 100,
            performance_monitoring: false,
        }
    }
}

/// Configuration for an expiring cache.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Maximum number of resident entries (`0` = unbounded).
    pub capacity: usize,

    /// Time-to-live measured from insertion (`0s` = never expires).
    pub ttl: Duration,

    /// Fraction of entries kept by [`ExpiringCache::on_memory_pressure`](crate::ExpiringCache::on_memory_pressure).
    ///
    /// Clamped to `[0.0, 1.0]`.
    pub pressure_retain: f64,
}

impl CacheConfig {
    /// Returns the capacity as an `Option` (`None` = unbounded).
    #[inline]
    pub fn capacity_limit(&self) -> Option<usize> {
        if self.capacity == 0 {
            None
        } else {
            Some(self.capacity)
        }
    }

    /// Returns the TTL as an `Option` (`None` = never expires).
    #[inline]
    pub fn ttl_limit(&self) -> Option<Duration> {
        if self.ttl == Duration::ZERO {
            None
        } else {
            Some(self.ttl)
        }
    }
}

impl Default for CacheConfig {
    /// `capacity = 100`, `ttl = 5min`, `pressure_retain = 0.5`.
    fn default() -> Self {
        Self {
            capacity: 100,
            ttl: Duration::from_secs(300),
            pressure_retain: 0.5,
        }
    }
}
