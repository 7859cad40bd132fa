use std::sync::atomic::{AtomicU64, Ordering};

use crate::metrics::snapshot::CacheMetricsSnapshot;
use crate::metrics::traits::{CacheMetricsRecorder, MetricsReset};

/// Lock-free counters shared by all users of one cache.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    pub get_calls: AtomicU64,
    pub get_hits: AtomicU64,
    pub get_misses: AtomicU64,
    pub computations: AtomicU64,
    pub failures: AtomicU64,
    pub set_calls: AtomicU64,
    pub remove_calls: AtomicU64,
    pub clear_calls: AtomicU64,
    pub prefetches: AtomicU64,
}

#[inline]
fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl CacheMetrics {
    /// Copies the counters, attaching the current entry count.
    pub fn snapshot(&self, entries: usize) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            get_calls: self.get_calls.load(Ordering::Relaxed),
            get_hits: self.get_hits.load(Ordering::Relaxed),
            get_misses: self.get_misses.load(Ordering::Relaxed),
            computations: self.computations.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            set_calls: self.set_calls.load(Ordering::Relaxed),
            remove_calls: self.remove_calls.load(Ordering::Relaxed),
            clear_calls: self.clear_calls.load(Ordering::Relaxed),
            prefetches: self.prefetches.load(Ordering::Relaxed),
            entries,
        }
    }
}

impl CacheMetricsRecorder for CacheMetrics {
    fn record_get_hit(&self) {
        bump(&self.get_calls);
        bump(&self.get_hits);
    }

    fn record_get_miss(&self) {
        bump(&self.get_calls);
        bump(&self.get_misses);
    }

    fn record_computation(&self) {
        bump(&self.computations);
    }

    fn record_failure(&self) {
        bump(&self.failures);
    }

    fn record_set(&self) {
        bump(&self.set_calls);
    }

    fn record_remove(&self) {
        bump(&self.remove_calls);
    }

    fn record_prefetch(&self) {
        bump(&self.prefetches);
    }

    fn record_clear(&self) {
        bump(&self.clear_calls);
    }
}

impl MetricsReset for CacheMetrics {
    fn reset_metrics(&self) {
        for counter in [
            &self.get_calls,
            &self.get_hits,
            &self.get_misses,
            &self.computations,
            &self.failures,
            &self.set_calls,
            &self.remove_calls,
            &self.clear_calls,
            &self.prefetches,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hits_and_misses_both_count_as_calls() {
        let metrics = CacheMetrics::default();
        metrics.record_get_hit();
        metrics.record_get_miss();
        metrics.record_get_miss();

        let snapshot = metrics.snapshot(2);
        assert_eq!(snapshot.get_calls, 3);
        assert_eq!(snapshot.get_hits, 1);
        assert_eq!(snapshot.get_misses, 2);
        assert_eq!(snapshot.entries, 2);
    }

    #[test]
    fn reset_zeroes_every_counter() {
        let metrics = CacheMetrics::default();
        metrics.record_computation();
        metrics.record_failure();
        metrics.record_prefetch();
        metrics.reset_metrics();
        assert_eq!(metrics.snapshot(0), CacheMetricsSnapshot::default());
    }
}
