//! # Emit counters.
//!
//! Collected only while performance monitoring is enabled on the bus.

/// Smoothing factor of the listeners-per-emit moving average.
const EMA_ALPHA: f64 = 0.1;

/// Snapshot of bus performance counters.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PerformanceMetrics {
    /// Number of `emit` calls.
    pub total_emits: u64,
    /// Number of handler invocations across all emits.
    pub total_listener_calls: u64,
    /// Number of handlers that returned an error or panicked.
    pub error_count: u64,
    /// Exponential moving average of handlers invoked per emit.
    pub avg_listeners_per_emit: f64,
}

impl PerformanceMetrics {
    pub(crate) fn record(&mut self, invoked: usize, errors: usize) {
        self.total_emits += 1;
        self.total_listener_calls += invoked as u64;
        self.error_count += errors as u64;
        self.avg_listeners_per_emit =
            self.avg_listeners_per_emit * (1.0 - EMA_ALPHA) + invoked as f64 * EMA_ALPHA;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moving_average_uses_point_one_smoothing() {
        let mut m = PerformanceMetrics::default();
        m.record(10, 0);
        assert!((m.avg_listeners_per_emit - 1.0).abs() < 1e-9);
        m.record(10, 2);
        assert!((m.avg_listeners_per_emit - 1.9).abs() < 1e-9);
        assert_eq!(m.total_emits, 2);
        assert_eq!(m.total_listener_calls, 20);
        assert_eq!(m.error_count, 2);
    }
}
