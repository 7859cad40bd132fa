//! Unbounded thread-safe object pool with on-demand construction.
//!
//! ## Architecture
//!
//! ```text
//!   get_object() ──► SegQueue::pop() ──► Some(item) ──► item
//!                                   └──► None ───────► factory() ──► item
//!
//!   put_object(item) ──► SegQueue::push(item)
//! ```
//!
//! The backing [`SegQueue`] is lock-free, so neither operation ever blocks.
//! The pool trusts its callers: there is no size limit and no check that a
//! returned item is not still in use elsewhere.
//!
//! ## Example Usage
//!
//! ```
//! use parakit::ds::ObjectPool;
//!
//! let pool = ObjectPool::new(|| Vec::<u8>::with_capacity(1024));
//! assert_eq!(pool.count(), 0);
//!
//! let mut buf = pool.get_object(); // built by the factory
//! buf.extend_from_slice(b"scratch");
//! buf.clear();
//! pool.put_object(buf);
//! assert_eq!(pool.count(), 1);
//!
//! {
//!     let guard = pool.get_guard(); // returned automatically on drop
//!     assert!(guard.capacity() >= 1024);
//! }
//! assert_eq!(pool.count(), 1);
//! ```

use std::fmt;
use std::ops::{Deref, DerefMut};

use crossbeam_queue::SegQueue;

type Factory<T> = dyn Fn() -> T + Send + Sync + 'static;

/// Pool of reusable `T` instances.
pub struct ObjectPool<T> {
    items: SegQueue<T>,
    factory: Box<Factory<T>>,
}

impl<T> ObjectPool<T> {
    /// Creates an empty pool that builds new instances with `factory`.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            items: SegQueue::new(),
            factory: Box::new(factory),
        }
    }

    /// Creates a pool preloaded with `items`.
    pub fn with_items<F, I>(factory: F, items: I) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        I: IntoIterator<Item = T>,
    {
        let pool = Self::new(factory);
        for item in items {
            pool.items.push(item);
        }
        pool
    }

    /// Takes an available item, or builds one if the pool is empty.
    pub fn get_object(&self) -> T {
        match self.items.pop() {
            Some(item) => item,
            None => (self.factory)(),
        }
    }

    /// Returns an item to the pool. The caller must not keep using it.
    pub fn put_object(&self, item: T) {
        self.items.push(item);
    }

    /// Takes an item wrapped in a guard that returns it on drop.
    pub fn get_guard(&self) -> Pooled<'_, T> {
        Pooled {
            item: Some(self.get_object()),
            pool: self,
        }
    }

    /// Number of items currently in the pool (not handed out).
    #[inline]
    pub fn count(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if no item is currently pooled.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("count", &self.count())
            .finish()
    }
}

/// RAII handle returned by [`ObjectPool::get_guard`].
pub struct Pooled<'a, T> {
    item: Option<T>,
    pool: &'a ObjectPool<T>,
}

impl<T> Pooled<'_, T> {
    /// Keeps the item instead of returning it to the pool.
    pub fn detach(mut self) -> T {
        match self.item.take() {
            Some(item) => item,
            None => unreachable!("pooled item is only taken on detach or drop"),
        }
    }
}

impl<T> Deref for Pooled<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.item {
            Some(item) => item,
            None => unreachable!("pooled item is only taken on detach or drop"),
        }
    }
}

impl<T> DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.item {
            Some(item) => item,
            None => unreachable!("pooled item is only taken on detach or drop"),
        }
    }
}

impl<T> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.put_object(item);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Pooled<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pooled").field(&self.item).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn empty_pool_falls_back_to_factory() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        let pool = ObjectPool::new(move || counter.fetch_add(1, Ordering::SeqCst));

        assert_eq!(pool.get_object(), 0);
        assert_eq!(pool.get_object(), 1);
        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert!(pool.is_empty());
    }

    #[test]
    fn returned_items_are_reused() {
        let pool = ObjectPool::new(|| String::from("fresh"));
        pool.put_object(String::from("recycled"));
        assert_eq!(pool.count(), 1);

        assert_eq!(pool.get_object(), "recycled");
        assert_eq!(pool.count(), 0);
        assert_eq!(pool.get_object(), "fresh");
    }

    #[test]
    fn preloaded_items_are_counted() {
        let pool = ObjectPool::with_items(|| 0_u32, [1, 2, 3]);
        assert_eq!(pool.count(), 3);
    }

    #[test]
    fn guard_returns_item_unless_detached() {
        let pool = ObjectPool::new(Vec::<u8>::new);
        {
            let mut guard = pool.get_guard();
            guard.push(1);
        }
        assert_eq!(pool.count(), 1);

        let kept = pool.get_guard().detach();
        assert_eq!(kept, vec![1]);
        assert_eq!(pool.count(), 0);
    }

    #[test]
    fn duplicate_returns_are_trusted() {
        let pool = ObjectPool::new(|| 0_u8);
        pool.put_object(7);
        pool.put_object(7);
        assert_eq!(pool.count(), 2);
    }
}
