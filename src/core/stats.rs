//! # Per-module loading statistics.
//!
//! Every load attempt (success or failure) updates the entry of its module.
//! The table is bounded: once it holds more than the configured threshold it is
//! trimmed to the most recently loaded modules.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// Usage statistics of one module.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Number of successful loads.
    pub load_count: u64,
    /// Time spent in all attempts, successful or not.
    pub total_load_time: Duration,
    /// `total_load_time` divided by the number of attempts.
    pub average_load_time: Duration,
    /// When the last attempt finished.
    pub last_load_time: Option<Instant>,
    /// Number of failed attempts.
    pub errors: u64,
}

impl LoadStats {
    /// Total attempts recorded.
    pub fn attempts(&self) -> u64 {
        self.load_count + self.errors
    }

    fn record(&mut self, elapsed: Duration, ok: bool, at: Instant) {
        if ok {
            self.load_count += 1;
        } else {
            self.errors += 1;
        }
        self.total_load_time += elapsed;
        self.last_load_time = Some(at);

        let n = u32::try_from(self.attempts()).unwrap_or(u32::MAX);
        self.average_load_time = self.total_load_time / n.max(1);
    }
}

/// Bounded name → [`LoadStats`] table.
#[derive(Debug)]
pub(crate) struct StatsTable {
    entries: HashMap<String, LoadStats>,
    threshold: Option<usize>,
    retain: usize,
}

impl StatsTable {
    pub(crate) fn new(threshold: Option<usize>, retain: usize) -> Self {
        Self {
            entries: HashMap::new(),
            threshold,
            retain,
        }
    }

    /// Records one finished attempt and trims the table if it grew too large.
    pub(crate) fn record(&mut self, name: &str, elapsed: Duration, ok: bool) {
        let now = Instant::now();
        match self.entries.get_mut(name) {
            Some(s) => s.record(elapsed, ok, now),
            None => {
                let mut s = LoadStats::default();
                s.record(elapsed, ok, now);
                self.entries.insert(name.to_string(), s);
            }
        }
        self.trim();
    }

    pub(crate) fn snapshot(&self) -> HashMap<String, LoadStats> {
        self.entries.clone()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    fn trim(&mut self) {
        let Some(threshold) = self.threshold else {
            return;
        };
        if self.entries.len() <= threshold {
            return;
        }

        let mut recent: Vec<(String, Option<Instant>)> = self
            .entries
            .iter()
            .map(|(name, s)| (name.clone(), s.last_load_time))
            .collect();
        // Newest first; `None` sorts last.
        recent.sort_by(|a, b| b.1.cmp(&a.1));

        let dropped = recent.len().saturating_sub(self.retain);
        for (name, _) in recent.into_iter().skip(self.retain) {
            self.entries.remove(&name);
        }
        tracing::debug!(dropped, kept = self.entries.len(), "trimmed loading statistics");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_covers_failures_too() {
        let mut t = StatsTable::new(None, 0);
        t.record("net", Duration::from_millis(30), false);
        t.record("net", Duration::from_millis(10), true);

        let s = &t.snapshot()["net"];
        assert_eq!(s.load_count, 1);
        assert_eq!(s.errors, 1);
        assert_eq!(s.total_load_time, Duration::from_millis(40));
        assert_eq!(s.average_load_time, Duration::from_millis(20));
        assert!(s.last_load_time.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn trim_keeps_most_recent() {
        let mut t = StatsTable::new(Some(3), 2);
        for name in ["a", "b", "c"] {
            t.record(name, Duration::ZERO, true);
            tokio::time::advance(Duration::from_millis(5)).await;
        }
        assert_eq!(t.snapshot().len(), 3);

        t.record("d", Duration::ZERO, true);
        let snap = t.snapshot();
        let mut kept: Vec<_> = snap.keys().cloned().collect();
        kept.sort();
        assert_eq!(kept, vec!["c", "d"]);
    }

    #[test]
    fn no_threshold_never_trims() {
        let mut t = StatsTable::new(None, 1);
        for i in 0..10 {
            t.record(&format!("m{i}"), Duration::ZERO, true);
        }
        assert_eq!(t.snapshot().len(), 10);
        t.clear();
        assert!(t.snapshot().is_empty());
    }
}
