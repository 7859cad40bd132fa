//! Memoizing cache that prefetches related keys in the background.
//!
//! ## Architecture
//!
//! ```text
//!   get_value(k) ──► MemoizingCache::get_shared(k) ──► value
//!         │
//!         └──► SerialTaskQueue::enqueue(prefetch k) ──► (single consumer)
//!                                                        related(k) = [r1, r2, ..]
//!                                                        for r not present:
//!                                                            MemoizingCache::get_future(r)
//! ```
//!
//! Prefetch requests go through a [`SerialTaskQueue`], so at most one
//! prefetch job is deciding what to compute at any time. The computations it
//! schedules run on the cache's executor like any other `get_future` miss, and
//! keys that are already present are left alone.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use crate::cache::MemoizingCache;
use crate::error::{BoxError, ComputationError};
use crate::executor::Executor;
#[cfg(feature = "metrics")]
use crate::metrics::{
    snapshot::CacheMetricsSnapshot,
    traits::{CacheMetricsRecorder, MetricsReset, MetricsSnapshotProvider},
};
use crate::sync::SharedValue;
use crate::task::SerialTaskQueue;
use crate::traits::{ConcurrentCache, FutureCache};

type Related<K> = dyn Fn(&K) -> Vec<K> + Send + Sync + 'static;

/// [`MemoizingCache`] that warms the values of keys related to each request.
///
/// # Example
///
/// ```
/// use parakit::cache::SpeculativeCache;
///
/// // Requesting page n makes pages n + 1 and n + 2 likely.
/// let cache = SpeculativeCache::from_fn(|page: &u32| page * 100, |page: &u32| vec![page + 1, page + 2]);
///
/// assert_eq!(cache.get_value(&1).unwrap(), 100);
/// cache.wait_prefetch_idle();
/// assert!(cache.contains_key(&2));
/// assert!(cache.contains_key(&3));
/// ```
pub struct SpeculativeCache<K, V> {
    cache: MemoizingCache<K, V>,
    related: Arc<Related<K>>,
    prefetcher: Arc<SerialTaskQueue>,
}

impl<K, V> Clone for SpeculativeCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            related: Arc::clone(&self.related),
            prefetcher: Arc::clone(&self.prefetcher),
        }
    }
}

impl<K, V> SpeculativeCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a cache around a fallible factory, using the global executor.
    pub fn new<F, E, R>(factory: F, related: R) -> Self
    where
        F: Fn(&K) -> Result<V, E> + Send + Sync + 'static,
        E: Into<BoxError>,
        R: Fn(&K) -> Vec<K> + Send + Sync + 'static,
    {
        Self::with_executor(factory, related, Executor::global())
    }

    /// Creates a cache running prefetch and deferred work on `executor`.
    pub fn with_executor<F, E, R>(factory: F, related: R, executor: Executor) -> Self
    where
        F: Fn(&K) -> Result<V, E> + Send + Sync + 'static,
        E: Into<BoxError>,
        R: Fn(&K) -> Vec<K> + Send + Sync + 'static,
    {
        Self {
            prefetcher: Arc::new(SerialTaskQueue::with_executor(executor.clone())),
            cache: MemoizingCache::with_executor(factory, executor),
            related: Arc::new(related),
        }
    }

    /// Creates a cache around an infallible factory.
    pub fn from_fn<F, R>(factory: F, related: R) -> Self
    where
        F: Fn(&K) -> V + Send + Sync + 'static,
        R: Fn(&K) -> Vec<K> + Send + Sync + 'static,
    {
        Self::new(move |key: &K| Ok::<V, BoxError>(factory(key)), related)
    }

    fn publish(&self, key: &K) {
        let cache = self.cache.clone();
        let related = Arc::clone(&self.related);
        let key = key.clone();
        self.prefetcher.enqueue(move || {
            for candidate in related(&key) {
                if cache.contains_key(&candidate) {
                    continue;
                }
                tracing::trace!("scheduling speculative prefetch");
                #[cfg(feature = "metrics")]
                cache.metrics().record_prefetch();
                cache.get_future(&candidate);
            }
            Ok::<(), BoxError>(())
        });
    }

    /// Returns the value for `key`, computing it on a miss, and schedules
    /// prefetch of its related keys.
    pub fn get_value(&self, key: &K) -> Result<V, ComputationError> {
        let handle = self.cache.get_shared(key);
        self.publish(key);
        handle.wait()
    }

    /// Non-blocking variant of [`get_value`](Self::get_value).
    pub fn get_future(&self, key: &K) -> SharedValue<V> {
        let handle = self.cache.get_future(key);
        self.publish(key);
        handle
    }

    /// Stores `value` for `key` and schedules prefetch of its related keys.
    pub fn set_value(&self, key: K, value: V) {
        self.cache.set_value(key.clone(), value);
        self.publish(&key);
    }

    /// Stores `handle` for `key` and schedules prefetch of its related keys.
    pub fn set_future(&self, key: K, handle: SharedValue<V>) {
        self.cache.set_future(key.clone(), handle);
        self.publish(&key);
    }

    /// Evicts `key`. Returns `false` if it was absent.
    pub fn remove(&self, key: &K) -> bool {
        self.cache.remove(key)
    }

    /// Returns `true` if an entry (pending or completed) exists for `key`.
    pub fn contains_key(&self, key: &K) -> bool {
        self.cache.contains_key(key)
    }

    /// Number of entries, prefetched ones included.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Returns `true` if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Evicts every entry. Prefetch jobs already queued may repopulate it.
    pub fn clear(&self) {
        self.cache.clear()
    }

    /// Blocks until every prefetch request issued so far has been scheduled.
    ///
    /// The prefetched computations themselves may still be running; wait on
    /// their handles through [`get_future`](Self::get_future) if needed.
    pub fn wait_prefetch_idle(&self) {
        self.prefetcher.wait_idle();
    }

    /// The underlying memoizing cache.
    pub fn inner(&self) -> &MemoizingCache<K, V> {
        &self.cache
    }
}

impl<K, V> FutureCache<K, V> for SpeculativeCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get_value(&self, key: &K) -> Result<V, ComputationError> {
        SpeculativeCache::get_value(self, key)
    }

    fn get_future(&self, key: &K) -> SharedValue<V> {
        SpeculativeCache::get_future(self, key)
    }

    fn set_value(&self, key: K, value: V) {
        SpeculativeCache::set_value(self, key, value)
    }

    fn set_future(&self, key: K, value: SharedValue<V>) {
        SpeculativeCache::set_future(self, key, value)
    }

    fn remove(&self, key: &K) -> bool {
        SpeculativeCache::remove(self, key)
    }

    fn contains_key(&self, key: &K) -> bool {
        SpeculativeCache::contains_key(self, key)
    }

    fn len(&self) -> usize {
        SpeculativeCache::len(self)
    }

    fn clear(&self) {
        SpeculativeCache::clear(self)
    }
}

impl<K, V> ConcurrentCache for SpeculativeCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
}

#[cfg(feature = "metrics")]
impl<K, V> MetricsSnapshotProvider<CacheMetricsSnapshot> for SpeculativeCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn snapshot(&self) -> CacheMetricsSnapshot {
        self.cache.snapshot()
    }
}

#[cfg(feature = "metrics")]
impl<K, V> MetricsReset for SpeculativeCache<K, V> {
    fn reset_metrics(&self) {
        self.cache.reset_metrics();
    }
}

impl<K, V> fmt::Debug for SpeculativeCache<K, V>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpeculativeCache")
            .field("cache", &self.cache)
            .field("pending_prefetch", &self.prefetcher.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn get_value_prefetches_related_keys() {
        let cache = SpeculativeCache::from_fn(|k: &u32| k * 2, |k: &u32| vec![k + 1, k + 2]);
        assert_eq!(cache.get_value(&10).unwrap(), 20);

        cache.wait_prefetch_idle();
        assert!(cache.contains_key(&11));
        assert!(cache.contains_key(&12));
        assert_eq!(cache.get_future(&12).wait().unwrap(), 24);
    }

    #[test]
    fn present_keys_are_not_recomputed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let cache = SpeculativeCache::from_fn(
            move |k: &u8| {
                counter.fetch_add(1, Ordering::SeqCst);
                *k
            },
            |k: &u8| if *k == 0 { vec![1, 2] } else { Vec::new() },
        );

        cache.set_value(1, 100);
        cache.set_value(2, 200);
        cache.get_value(&0).unwrap();
        cache.wait_prefetch_idle();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get_value(&1).unwrap(), 100);
        assert_eq!(cache.get_value(&2).unwrap(), 200);
    }

    #[test]
    fn set_value_triggers_prefetch() {
        let cache = SpeculativeCache::from_fn(|k: &i32| -k, |k: &i32| vec![k * 10]);
        cache.set_value(3, 0);
        cache.wait_prefetch_idle();
        assert_eq!(cache.get_future(&30).wait().unwrap(), -30);
    }

    #[test]
    fn prefetch_failures_stay_in_the_cache() {
        let cache = SpeculativeCache::new(
            |k: &u8| if *k > 5 { Err("out of range") } else { Ok(*k) },
            |k: &u8| vec![k + 5],
        );
        cache.get_value(&3).unwrap();
        cache.wait_prefetch_idle();
        assert!(cache.get_future(&8).wait().is_err());
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn prefetches_are_counted() {
        let cache = SpeculativeCache::from_fn(|k: &u8| *k, |k: &u8| vec![k + 1]);
        cache.get_value(&1).unwrap();
        cache.wait_prefetch_idle();
        assert_eq!(cache.snapshot().prefetches, 1);
    }
}
