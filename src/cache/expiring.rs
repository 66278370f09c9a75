//! # ExpiringCache: TTL + capacity bounded map.
//!
//! ## Rules
//! - An entry is **expired** when `now - inserted_at > ttl`; expiry is lazy and
//!   checked on read (`get`, `contains`) or swept by [`ExpiringCache::purge_expired`].
//! - Inserting a **new** key at capacity evicts the single oldest-inserted entry
//!   (insertion order, not LRU). Overwriting a key counts as a fresh insertion.
//! - `get` bumps `last_touched_at`, but only when the previous touch is older than
//!   10% of the TTL (keeps hot reads from rewriting the entry every time).
//! - Memory pressure shrinks the cache to a fraction of its size, oldest first.
//!
//! ## Layout
//! ```text
//! entries: HashMap<K, Entry { value, inserted_at, last_touched_at, seq }>
//! order:   VecDeque<(seq, K)>   oldest insertion at the front
//!          (stale pairs are skipped lazily and compacted when they pile up)
//! ```

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::CacheConfig;

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    last_touched_at: Instant,
    seq: u64,
}

/// Keyed store with per-entry TTL and capacity-bounded eviction.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use capcore::{CacheConfig, ExpiringCache};
///
/// let mut cache = ExpiringCache::new(CacheConfig {
///     capacity: 2,
///     ttl: Duration::from_secs(60),
///     ..CacheConfig::default()
/// });
/// cache.set("a", 1);
/// cache.set("b", 2);
/// cache.set("c", 3); // evicts "a", the oldest insertion
///
/// assert_eq!(cache.get(&"a"), None);
/// assert_eq!(cache.get(&"c"), Some(&3));
/// assert_eq!(cache.len(), 2);
/// ```
pub struct ExpiringCache<K, V> {
    cfg: CacheConfig,
    entries: HashMap<K, Entry<V>>,
    order: VecDeque<(u64, K)>,
    next_seq: u64,
}

impl<K, V> ExpiringCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Creates an empty cache.
    pub fn new(cfg: CacheConfig) -> Self {
        Self {
            cfg,
            entries: HashMap::new(),
            order: VecDeque::new(),
            next_seq: 0,
        }
    }

    /// Creates a cache with the given capacity and TTL, default pressure fraction.
    pub fn with_capacity_and_ttl(capacity: usize, ttl: Duration) -> Self {
        Self::new(CacheConfig {
            capacity,
            ttl,
            ..CacheConfig::default()
        })
    }

    /// Returns the value for `key` if present and not expired.
    ///
    /// An expired entry is removed and `None` is returned.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let now = Instant::now();
        if self.is_expired(key, now) {
            self.entries.remove(key);
            return None;
        }
        let refresh_after = self.cfg.ttl_limit().map(|ttl| ttl / 10);
        let entry = self.entries.get_mut(key)?;
        let idle = now.saturating_duration_since(entry.last_touched_at);
        if refresh_after.map_or(true, |threshold| idle > threshold) {
            entry.last_touched_at = now;
        }
        Some(&entry.value)
    }

    /// True when `key` is present and not expired (expired entries are removed).
    pub fn contains(&mut self, key: &K) -> bool {
        let now = Instant::now();
        if self.is_expired(key, now) {
            self.entries.remove(key);
            return false;
        }
        self.entries.contains_key(key)
    }

    /// Inserts or overwrites `key`.
    ///
    /// When the cache is full and `key` is new, the oldest-inserted entry is evicted first.
    /// Returns the previous live value for `key`, if any; an expired entry counts as absent.
    pub fn set(&mut self, key: K, value: V) -> Option<V> {
        let now = Instant::now();
        let expired = self.is_expired(&key, now);
        let previous = self
            .entries
            .remove(&key)
            .and_then(|e| (!expired).then_some(e.value));

        if previous.is_none() {
            if let Some(cap) = self.cfg.capacity_limit() {
                while self.entries.len() >= cap {
                    if self.evict_oldest().is_none() {
                        break;
                    }
                }
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.push_back((seq, key.clone()));
        self.entries.insert(
            key,
            Entry {
                value,
                inserted_at: now,
                last_touched_at: now,
                seq,
            },
        );
        self.compact_order();
        previous
    }

    /// Removes `key`, returning its value (even if it had already expired).
    pub fn delete(&mut self, key: &K) -> Option<V> {
        let removed = self.entries.remove(key).map(|e| e.value);
        self.compact_order();
        removed
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Number of resident entries (may include expired ones not yet swept).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no entries are resident.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Last time `key` was touched by `get`, without refreshing it.
    pub fn touched_at(&self, key: &K) -> Option<Instant> {
        self.entries.get(key).map(|e| e.last_touched_at)
    }

    /// Removes every expired entry; returns how many were removed.
    pub fn purge_expired(&mut self) -> usize {
        let Some(ttl) = self.cfg.ttl_limit() else {
            return 0;
        };
        let now = Instant::now();
        let before = self.entries.len();
        self.entries
            .retain(|_, e| now.saturating_duration_since(e.inserted_at) <= ttl);
        self.compact_order();
        before - self.entries.len()
    }

    /// Shrinks the cache to `fraction` of its current size, evicting oldest insertions first.
    ///
    /// `fraction` is clamped to `[0.0, 1.0]`. Returns the number of evicted entries.
    pub fn shrink_to(&mut self, fraction: f64) -> usize {
        let fraction = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };
        let target = (self.entries.len() as f64 * fraction).floor() as usize;
        let mut evicted = 0;
        while self.entries.len() > target {
            if self.evict_oldest().is_none() {
                break;
            }
            evicted += 1;
        }
        evicted
    }

    /// Memory-pressure hook: shrinks to the configured `pressure_retain` fraction.
    pub fn on_memory_pressure(&mut self) -> usize {
        let evicted = self.shrink_to(self.cfg.pressure_retain);
        tracing::debug!(evicted, remaining = self.entries.len(), "cache shrunk under memory pressure");
        evicted
    }

    fn is_expired(&self, key: &K, now: Instant) -> bool {
        match (self.cfg.ttl_limit(), self.entries.get(key)) {
            (Some(ttl), Some(e)) => now.saturating_duration_since(e.inserted_at) > ttl,
            _ => false,
        }
    }

    /// Pops the oldest live entry from the insertion queue.
    fn evict_oldest(&mut self) -> Option<K> {
        while let Some((seq, key)) = self.order.pop_front() {
            if self.entries.get(&key).is_some_and(|e| e.seq == seq) {
                self.entries.remove(&key);
                return Some(key);
            }
        }
        None
    }

    /// Drops stale queue pairs once they outnumber live entries.
    fn compact_order(&mut self) {
        if self.order.len() <= self.entries.len() * 2 + 16 {
            return;
        }
        let entries = &self.entries;
        self.order
            .retain(|(seq, key)| entries.get(key).is_some_and(|e| e.seq == *seq));
    }
}
