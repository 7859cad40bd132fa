//! Optional counters for the memoizing caches (feature `metrics`).
//!
//! Recording, snapshotting and export are split the same way as the cache
//! traits: [`CacheMetrics`](metrics_impl::CacheMetrics) only counts,
//! [`MetricsSnapshotProvider`](traits::MetricsSnapshotProvider) only reads, and
//! [`MetricsExporter`](traits::MetricsExporter) only publishes.

pub mod exporter;
pub mod metrics_impl;
pub mod snapshot;
pub mod traits;
