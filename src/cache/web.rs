//! Self-healing memoizing cache for fetched resources.
//!
//! Keys are resource locators and values are their bodies. A fetch that fails
//! or finds nothing is still shared by every caller waiting on it, but the
//! entry is evicted afterwards so that the next request tries again.
//!
//! ```text
//!   get_value(uri) ──► MemoizingCache::get_shared(uri)
//!                        ├─ Ok(body)  ─► body (cached)
//!                        └─ Err(e)    ─► remove_if_same(uri, handle) ─► Err(e)
//! ```
//!
//! Eviction only removes the failed handle itself; an entry that was replaced
//! in the meantime (for example by `set_value`) is left in place.

use std::fmt;

use crate::cache::MemoizingCache;
use crate::error::{BoxError, ComputationError};
use crate::executor::Executor;
#[cfg(feature = "metrics")]
use crate::metrics::{
    snapshot::CacheMetricsSnapshot,
    traits::{MetricsReset, MetricsSnapshotProvider},
};
use crate::sync::SharedValue;
use crate::traits::{ConcurrentCache, FutureCache};

/// Cache of resource bodies keyed by URI.
///
/// # Example
///
/// ```
/// use parakit::cache::WebCache;
///
/// let cache = WebCache::new(|uri: &str| -> Result<Option<String>, std::io::Error> {
///     Ok(uri.strip_prefix("mem://").map(str::to_uppercase))
/// });
///
/// assert_eq!(cache.get_value("mem://hello").unwrap(), "HELLO");
/// assert!(cache.get_value("http://offline").is_err());
/// assert!(!cache.contains_key("http://offline"));
/// ```
#[derive(Clone)]
pub struct WebCache {
    cache: MemoizingCache<String, String>,
}

impl WebCache {
    /// Creates a cache around `fetch`, using the global executor.
    ///
    /// `fetch` returns `Ok(None)` when the resource does not exist.
    pub fn new<F, E>(fetch: F) -> Self
    where
        F: Fn(&str) -> Result<Option<String>, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        Self::with_executor(fetch, Executor::global())
    }

    /// Creates a cache around `fetch` running deferred fetches on `executor`.
    pub fn with_executor<F, E>(fetch: F, executor: Executor) -> Self
    where
        F: Fn(&str) -> Result<Option<String>, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        let factory = move |uri: &String| -> Result<String, BoxError> {
            match fetch(uri) {
                Ok(Some(body)) => Ok(body),
                Ok(None) => Err(format!("no content at {uri}").into()),
                Err(err) => Err(err.into()),
            }
        };
        Self {
            cache: MemoizingCache::with_executor(factory, executor),
        }
    }

    fn evict_failed(cache: &MemoizingCache<String, String>, uri: &String, handle: &SharedValue<String>) {
        if cache.remove_if_same(uri, handle) {
            tracing::debug!(uri = %uri, "evicted failed fetch");
        }
    }

    /// Returns the body for `uri`, fetching it on a miss.
    ///
    /// On failure the entry is evicted and the error returned.
    pub fn get_value(&self, uri: &str) -> Result<String, ComputationError> {
        let uri = uri.to_owned();
        let handle = self.cache.get_shared(&uri);
        let outcome = handle.wait();
        if outcome.is_err() {
            Self::evict_failed(&self.cache, &uri, &handle);
        }
        outcome
    }

    /// Returns a handle to the body for `uri`; on a miss the fetch runs on the executor.
    ///
    /// The entry is evicted once the fetch fails.
    pub fn get_future(&self, uri: &str) -> SharedValue<String> {
        let uri = uri.to_owned();
        let handle = self.cache.get_future(&uri);
        let cache = self.cache.clone();
        let watched = handle.clone();
        handle.on_complete(move |outcome| {
            if outcome.is_err() {
                Self::evict_failed(&cache, &uri, &watched);
            }
        });
        handle
    }

    /// Stores a known body for `uri`.
    pub fn set_value(&self, uri: impl Into<String>, body: impl Into<String>) {
        self.cache.set_value(uri.into(), body.into());
    }

    /// Stores a pending fetch for `uri`.
    pub fn set_future(&self, uri: impl Into<String>, handle: SharedValue<String>) {
        self.cache.set_future(uri.into(), handle);
    }

    /// Evicts `uri`. Returns `false` if it was absent.
    pub fn remove(&self, uri: &str) -> bool {
        self.cache.remove(&uri.to_owned())
    }

    /// Returns `true` if an entry exists for `uri`.
    pub fn contains_key(&self, uri: &str) -> bool {
        self.cache.contains_key(&uri.to_owned())
    }

    /// Number of cached URIs, pending fetches included.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Evicts every URI.
    pub fn clear(&self) {
        self.cache.clear()
    }
}

impl FutureCache<String, String> for WebCache {
    fn get_value(&self, key: &String) -> Result<String, ComputationError> {
        WebCache::get_value(self, key)
    }

    fn get_future(&self, key: &String) -> SharedValue<String> {
        WebCache::get_future(self, key)
    }

    fn set_value(&self, key: String, value: String) {
        WebCache::set_value(self, key, value)
    }

    fn set_future(&self, key: String, value: SharedValue<String>) {
        WebCache::set_future(self, key, value)
    }

    fn remove(&self, key: &String) -> bool {
        WebCache::remove(self, key)
    }

    fn contains_key(&self, key: &String) -> bool {
        WebCache::contains_key(self, key)
    }

    fn len(&self) -> usize {
        WebCache::len(self)
    }

    fn clear(&self) {
        WebCache::clear(self)
    }
}

impl ConcurrentCache for WebCache {}

#[cfg(feature = "metrics")]
impl MetricsSnapshotProvider<CacheMetricsSnapshot> for WebCache {
    fn snapshot(&self) -> CacheMetricsSnapshot {
        self.cache.snapshot()
    }
}

#[cfg(feature = "metrics")]
impl MetricsReset for WebCache {
    fn reset_metrics(&self) {
        self.cache.reset_metrics();
    }
}

impl fmt::Debug for WebCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebCache").field("cache", &self.cache).finish()
    }
}
