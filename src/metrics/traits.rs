//! # Metrics Trait Hierarchy
//!
//! ```text
//!   ┌─────────────────────────────┐
//!   │    CacheMetricsRecorder     │   written by caches on the hot path
//!   │  get_hit/get_miss/compute   │   (&self, atomic counters)
//!   │  failure/set/remove         │
//!   │  prefetch                   │
//!   └──────────────┬──────────────┘
//!                  │
//!   Consumption (decoupled from recording):
//!   ┌──────────────────────────────┐    ┌──────────────────────────────┐
//!   │ MetricsSnapshotProvider<S>   │    │ MetricsExporter<S>           │
//!   │ (bench/test)                 │    │ (production monitoring)      │
//!   └──────────────────────────────┘    └──────────────────────────────┘
//! ```
//!
//! Recorders take `&self` because the caches are shared between threads and
//! never hold a lock while recording.

/// Counters recorded by every memoizing cache.
pub trait CacheMetricsRecorder {
    fn record_get_hit(&self);
    fn record_get_miss(&self);
    fn record_computation(&self);
    fn record_failure(&self);
    fn record_set(&self);
    fn record_remove(&self);
    fn record_prefetch(&self);
    fn record_clear(&self);
}

/// Snapshot provider for bench/testing.
pub trait MetricsSnapshotProvider<S> {
    fn snapshot(&self) -> S;
}

/// Reset metrics between tests or benchmark iterations.
pub trait MetricsReset {
    fn reset_metrics(&self);
}

/// Export/publish metrics to production monitoring backends.
pub trait MetricsExporter<S> {
    fn export(&self, snapshot: &S);
}
