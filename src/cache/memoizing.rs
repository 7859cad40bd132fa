//! Memoizing future cache with at-most-once computation per key.
//!
//! ## Architecture
//!
//! ```text
//!   get_value(k) ──► DashMap<K, SharedValue<V>, FxBuildHasher>
//!                       │
//!        hit ◄──────────┤ entry present → wait on the stored handle
//!                       │
//!        miss ──────────┘ vacant → insert pending handle (shard lock held
//!                         only for the insert), then run factory(k) on the
//!                         calling thread and publish into the handle
//!
//!   get_future(k) ─► same insert-if-absent, factory scheduled on the Executor
//! ```
//!
//! Every caller that races on a missing key observes the one handle that won
//! the insert, so the factory runs once per key until the entry is removed.
//! Failures (errors and panics) are stored in the handle and replayed to all
//! waiters; there is no automatic retry.
//!
//! ## Example Usage
//!
//! ```
//! use std::sync::Arc;
//! use parakit::cache::MemoizingCache;
//!
//! let cache = MemoizingCache::from_fn(|name: &String| Arc::new(name.to_uppercase()));
//!
//! let first = cache.get_value(&"alice".to_string()).unwrap();
//! let second = cache.get_value(&"alice".to_string()).unwrap();
//! assert!(Arc::ptr_eq(&first, &second));
//!
//! assert!(cache.remove(&"alice".to_string()));
//! let third = cache.get_value(&"alice".to_string()).unwrap();
//! assert!(!Arc::ptr_eq(&first, &third));
//! ```

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rustc_hash::FxBuildHasher;

use crate::error::{BoxError, ComputationError};
use crate::executor::Executor;
#[cfg(feature = "metrics")]
use crate::metrics::{
    metrics_impl::CacheMetrics,
    snapshot::CacheMetricsSnapshot,
    traits::{CacheMetricsRecorder, MetricsReset, MetricsSnapshotProvider},
};
use crate::sync::{Outcome, Promise, SharedValue, promise, run_guarded};
use crate::traits::{ConcurrentCache, FutureCache};

type Factory<K, V> = dyn Fn(&K) -> Result<V, BoxError> + Send + Sync + 'static;

struct CacheState<K, V> {
    entries: DashMap<K, SharedValue<V>, FxBuildHasher>,
    factory: Box<Factory<K, V>>,
    executor: Executor,
    #[cfg(feature = "metrics")]
    metrics: CacheMetrics,
}

/// Outcome of the insert-if-absent step.
enum Lookup<V> {
    Hit(SharedValue<V>),
    Miss(Promise<V>, SharedValue<V>),
}

/// Key → value cache that computes each key's value at most once.
///
/// The cache is a handle: cloning it is cheap and every clone sees the same
/// entries, which is how it is shared between threads and background workers.
pub struct MemoizingCache<K, V> {
    state: Arc<CacheState<K, V>>,
}

impl<K, V> Clone for MemoizingCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<K, V> MemoizingCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a cache around a fallible factory, using the global executor.
    pub fn new<F, E>(factory: F) -> Self
    where
        F: Fn(&K) -> Result<V, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        Self::with_executor(factory, Executor::global())
    }

    /// Creates a cache around a fallible factory running deferred work on `executor`.
    pub fn with_executor<F, E>(factory: F, executor: Executor) -> Self
    where
        F: Fn(&K) -> Result<V, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        Self {
            state: Arc::new(CacheState {
                entries: DashMap::with_hasher(FxBuildHasher),
                factory: Box::new(move |key: &K| -> Result<V, BoxError> {
                    factory(key).map_err(Into::into)
                }),
                executor,
                #[cfg(feature = "metrics")]
                metrics: CacheMetrics::default(),
            }),
        }
    }

    /// Creates a cache around an infallible factory.
    pub fn from_fn<F>(factory: F) -> Self
    where
        F: Fn(&K) -> V + Send + Sync + 'static,
    {
        Self::from_fn_with_executor(factory, Executor::global())
    }

    /// Creates a cache around an infallible factory running deferred work on `executor`.
    pub fn from_fn_with_executor<F>(factory: F, executor: Executor) -> Self
    where
        F: Fn(&K) -> V + Send + Sync + 'static,
    {
        Self::with_executor(move |key: &K| Ok::<V, BoxError>(factory(key)), executor)
    }

    /// Returns the executor used for deferred computations.
    pub fn executor(&self) -> &Executor {
        &self.state.executor
    }

    fn lookup(&self, key: &K) -> Lookup<V> {
        if let Some(existing) = self.state.entries.get(key) {
            return Lookup::Hit(existing.value().clone());
        }
        match self.state.entries.entry(key.clone()) {
            Entry::Occupied(occupied) => Lookup::Hit(occupied.get().clone()),
            Entry::Vacant(vacant) => {
                let (tx, rx) = promise();
                vacant.insert(rx.clone());
                Lookup::Miss(tx, rx)
            },
        }
    }

    fn run_factory(state: &CacheState<K, V>, key: &K) -> Outcome<V> {
        #[cfg(feature = "metrics")]
        state.metrics.record_computation();
        let outcome = run_guarded(|| (state.factory)(key));
        #[cfg(feature = "metrics")]
        if outcome.is_err() {
            state.metrics.record_failure();
        }
        outcome
    }

    /// Returns the handle for `key`, computing the value on the calling
    /// thread if this call inserted the entry.
    ///
    /// The returned handle is always complete.
    pub fn get_shared(&self, key: &K) -> SharedValue<V> {
        match self.lookup(key) {
            Lookup::Hit(handle) => {
                #[cfg(feature = "metrics")]
                self.state.metrics.record_get_hit();
                handle.wait_ref();
                handle
            },
            Lookup::Miss(tx, handle) => {
                #[cfg(feature = "metrics")]
                self.state.metrics.record_get_miss();
                tx.complete(Self::run_factory(&self.state, key));
                handle
            },
        }
    }

    /// Returns the value for `key`, computing it on a miss.
    pub fn get_value(&self, key: &K) -> Result<V, ComputationError> {
        self.get_shared(key).wait()
    }

    /// Returns the handle for `key`; on a miss the factory runs on the executor.
    pub fn get_future(&self, key: &K) -> SharedValue<V> {
        match self.lookup(key) {
            Lookup::Hit(handle) => {
                #[cfg(feature = "metrics")]
                self.state.metrics.record_get_hit();
                handle
            },
            Lookup::Miss(tx, handle) => {
                #[cfg(feature = "metrics")]
                self.state.metrics.record_get_miss();
                let state = Arc::clone(&self.state);
                let key = key.clone();
                self.state
                    .executor
                    .spawn(move || tx.complete(Self::run_factory(&state, &key)));
                handle
            },
        }
    }

    /// Returns the outcome for `key` if its entry has completed. Never computes.
    pub fn try_get(&self, key: &K) -> Option<Outcome<V>> {
        let handle = self.state.entries.get(key)?.value().clone();
        handle.try_get()
    }

    /// Stores `value` for `key`, replacing any previous entry.
    pub fn set_value(&self, key: K, value: V) {
        self.set_future(key, SharedValue::ready(value));
    }

    /// Stores `handle` for `key`, replacing any previous entry.
    pub fn set_future(&self, key: K, handle: SharedValue<V>) {
        #[cfg(feature = "metrics")]
        self.state.metrics.record_set();
        self.state.entries.insert(key, handle);
    }

    /// Evicts `key`. Returns `false` if it was absent.
    ///
    /// Callers already waiting on the evicted handle still receive its outcome.
    pub fn remove(&self, key: &K) -> bool {
        let removed = self.state.entries.remove(key).is_some();
        #[cfg(feature = "metrics")]
        if removed {
            self.state.metrics.record_remove();
        }
        removed
    }

    /// Evicts `key` only if its entry is still `handle`.
    pub fn remove_if_same(&self, key: &K, handle: &SharedValue<V>) -> bool {
        let removed = self
            .state
            .entries
            .remove_if(key, |_, current| current.ptr_eq(handle))
            .is_some();
        #[cfg(feature = "metrics")]
        if removed {
            self.state.metrics.record_remove();
        }
        removed
    }

    /// Returns `true` if an entry (pending or completed) exists for `key`.
    pub fn contains_key(&self, key: &K) -> bool {
        self.state.entries.contains_key(key)
    }

    /// Number of entries, pending ones included.
    pub fn len(&self) -> usize {
        self.state.entries.len()
    }

    /// Returns `true` if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.state.entries.is_empty()
    }

    /// Evicts every entry.
    pub fn clear(&self) {
        #[cfg(feature = "metrics")]
        self.state.metrics.record_clear();
        self.state.entries.clear();
    }

    /// Snapshot of the keys currently present.
    pub fn keys(&self) -> Vec<K> {
        self.state
            .entries
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Single-pass iterator over successfully computed `(key, value)` pairs.
    ///
    /// The set of entries is captured when this is called. Entries still
    /// computing are waited on as the iterator reaches them; failed entries are
    /// skipped.
    pub fn get_all_items(&self) -> AllItems<K, V> {
        let snapshot: Vec<(K, SharedValue<V>)> = self
            .state
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        AllItems {
            pending: snapshot.into_iter(),
        }
    }

    #[cfg(feature = "metrics")]
    pub(crate) fn metrics(&self) -> &CacheMetrics {
        &self.state.metrics
    }
}

impl<K, V> FutureCache<K, V> for MemoizingCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get_value(&self, key: &K) -> Result<V, ComputationError> {
        MemoizingCache::get_value(self, key)
    }

    fn get_future(&self, key: &K) -> SharedValue<V> {
        MemoizingCache::get_future(self, key)
    }

    fn set_value(&self, key: K, value: V) {
        MemoizingCache::set_value(self, key, value)
    }

    fn set_future(&self, key: K, value: SharedValue<V>) {
        MemoizingCache::set_future(self, key, value)
    }

    fn remove(&self, key: &K) -> bool {
        MemoizingCache::remove(self, key)
    }

    fn contains_key(&self, key: &K) -> bool {
        MemoizingCache::contains_key(self, key)
    }

    fn len(&self) -> usize {
        MemoizingCache::len(self)
    }

    fn clear(&self) {
        MemoizingCache::clear(self)
    }
}

impl<K, V> ConcurrentCache for MemoizingCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
}

#[cfg(feature = "metrics")]
impl<K, V> MetricsSnapshotProvider<CacheMetricsSnapshot> for MemoizingCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn snapshot(&self) -> CacheMetricsSnapshot {
        self.state.metrics.snapshot(self.len())
    }
}

#[cfg(feature = "metrics")]
impl<K, V> MetricsReset for MemoizingCache<K, V> {
    fn reset_metrics(&self) {
        self.state.metrics.reset_metrics();
    }
}

impl<K, V> fmt::Debug for MemoizingCache<K, V>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoizingCache")
            .field("len", &self.state.entries.len())
            .field("executor", &self.state.executor)
            .finish()
    }
}

/// Iterator returned by [`MemoizingCache::get_all_items`].
pub struct AllItems<K, V> {
    pending: std::vec::IntoIter<(K, SharedValue<V>)>,
}

impl<K, V: Clone> Iterator for AllItems<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        for (key, handle) in self.pending.by_ref() {
            if let Ok(value) = handle.wait_ref() {
                return Some((key, value.clone()));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.pending.len()))
    }
}
