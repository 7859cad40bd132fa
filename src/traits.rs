//! # Future Cache Traits
//!
//! This module defines the operation set shared by every memoizing cache in
//! the crate, so that callers can be written once against
//! [`FutureCache`] and handed a plain, speculative or self-healing cache.
//!
//! ## Architecture
//!
//! ```text
//!                          ┌─────────────────────────────────────────────┐
//!                          │            FutureCache<K, V>                │
//!                          │                                             │
//!                          │  get_value(&, &K)  → Result<V, Error>       │  blocks on miss
//!                          │  get_future(&, &K) → SharedValue<V>         │  never blocks
//!                          │  set_value(&, K, V)                         │
//!                          │  set_future(&, K, SharedValue<V>)           │
//!                          │  remove(&, &K) → bool                       │
//!                          │  contains_key(&, &K) → bool                 │
//!                          │  len / is_empty / clear                     │
//!                          └──────────────────────┬──────────────────────┘
//!                                                 │
//!            ┌────────────────────────────────────┼─────────────────────────────────┐
//!            ▼                                    ▼                                 ▼
//!   ┌─────────────────────┐          ┌─────────────────────────┐       ┌─────────────────────────┐
//!   │ MemoizingCache<K,V> │ ◄─wraps─ │ SpeculativeCache<K,V>   │       │ WebCache                │
//!   │ at-most-once per key│          │ + prefetch related keys │       │ K = String, V = String  │
//!   └─────────────────────┘          └─────────────────────────┘       │ + evict on failure      │
//!                                                                      └─────────────────────────┘
//! ```
//!
//! All methods take `&self`: the caches are internally synchronized and are
//! meant to be shared across threads (usually by cloning the cache handle).
//!
//! ## Trait Summary
//!
//! | Trait             | Extends       | Purpose                                 |
//! |-------------------|---------------|-----------------------------------------|
//! | `FutureCache`     | -             | Memoizing get/set/remove by key         |
//! | `ConcurrentCache` | `Send + Sync` | Marker for caches shareable by threads  |

use crate::error::ComputationError;
use crate::sync::SharedValue;

/// Memoizing key → value cache whose values are computed at most once per key.
///
/// # Example
///
/// ```
/// use parakit::cache::MemoizingCache;
/// use parakit::traits::FutureCache;
///
/// fn warm<C: FutureCache<u32, u32>>(cache: &C) {
///     for key in 0..4 {
///         cache.set_value(key, key * key);
///     }
/// }
///
/// let cache = MemoizingCache::from_fn(|k: &u32| k + 100);
/// warm(&cache);
/// assert_eq!(cache.get_value(&3).unwrap(), 9);
/// assert_eq!(cache.get_value(&9).unwrap(), 109);
/// ```
pub trait FutureCache<K, V> {
    /// Returns the value for `key`, computing it on a miss.
    ///
    /// Concurrent callers on the same missing key share one computation; a
    /// cached failure is returned until the key is removed.
    fn get_value(&self, key: &K) -> Result<V, ComputationError>;

    /// Returns a handle to the value for `key` without blocking.
    ///
    /// On a miss the computation is scheduled on the cache's executor.
    fn get_future(&self, key: &K) -> SharedValue<V>;

    /// Stores a known value, replacing any previous entry.
    fn set_value(&self, key: K, value: V);

    /// Stores a pending or completed computation, replacing any previous entry.
    fn set_future(&self, key: K, value: SharedValue<V>);

    /// Evicts `key`. Returns `false` if it was absent.
    fn remove(&self, key: &K) -> bool;

    /// Returns `true` if an entry (pending or completed) exists for `key`.
    fn contains_key(&self, key: &K) -> bool;

    /// Number of entries, pending ones included.
    fn len(&self) -> usize;

    /// Returns `true` if the cache holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evicts every entry.
    fn clear(&self);
}

/// Marker for caches that can be shared between threads.
///
/// # Example
///
/// ```
/// use parakit::traits::{ConcurrentCache, FutureCache};
///
/// fn share<C>(cache: C) -> std::thread::JoinHandle<usize>
/// where
///     C: FutureCache<u64, u64> + ConcurrentCache + 'static,
/// {
///     std::thread::spawn(move || cache.len())
/// }
/// ```
pub trait ConcurrentCache: Send + Sync {}
