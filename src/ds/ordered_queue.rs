//! Concurrent queue that yields entries in ascending key order.
//!
//! ## Architecture
//!
//! ```text
//!   enqueue(k, v) ─┐                         ┌─► try_dequeue() → smallest (k, v)
//!   enqueue(k, v) ─┼─► Mutex<OrderedState> ──┤
//!   enqueue(k, v) ─┘   ├─ heap: BinaryHeap   └─► drain() → ascending stream
//!                      │        (min on (key, seq))
//!                      └─ next_seq: u64
//! ```
//!
//! Producers and consumers may overlap in time; every operation is a short
//! critical section around an O(log n) heap operation. The sequence number is
//! assigned inside that critical section, so entries with equal keys leave the
//! queue in the order they entered it.
//!
//! ## Example Usage
//!
//! ```
//! use parakit::ds::ConcurrentOrderedQueue;
//!
//! let queue = ConcurrentOrderedQueue::new();
//! queue.enqueue(3, "c");
//! queue.enqueue(1, "a");
//! queue.enqueue(2, "b");
//!
//! assert_eq!(queue.try_dequeue(), Some((1, "a")));
//! let rest: Vec<_> = queue.drain().map(|(k, _)| k).collect();
//! assert_eq!(rest, vec![2, 3]);
//! assert!(queue.is_empty());
//! ```

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;

use parking_lot::Mutex;

struct Entry<K, V> {
    key: K,
    seq: u64,
    value: V,
}

impl<K: Ord, V> PartialEq for Entry<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.seq == other.seq
    }
}

impl<K: Ord, V> Eq for Entry<K, V> {}

impl<K: Ord, V> PartialOrd for Entry<K, V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Ord, V> Ord for Entry<K, V> {
    // Reversed so that `BinaryHeap` (a max-heap) pops the smallest key first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct OrderedState<K, V> {
    heap: BinaryHeap<Entry<K, V>>,
    next_seq: u64,
}

/// Thread-safe priority queue draining in ascending key order.
pub struct ConcurrentOrderedQueue<K, V> {
    inner: Mutex<OrderedState<K, V>>,
}

impl<K: Ord, V> ConcurrentOrderedQueue<K, V> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty queue with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(OrderedState {
                heap: BinaryHeap::with_capacity(capacity),
                next_seq: 0,
            }),
        }
    }

    /// Adds an entry. Safe to call from any number of threads.
    pub fn enqueue(&self, key: K, value: V) {
        let mut state = self.inner.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(Entry { key, seq, value });
    }

    /// Removes and returns the entry with the smallest key.
    pub fn try_dequeue(&self) -> Option<(K, V)> {
        let mut state = self.inner.lock();
        state.heap.pop().map(|entry| (entry.key, entry.value))
    }

    /// Removes entries one at a time, smallest key first, until the queue is empty.
    ///
    /// Entries enqueued while draining are picked up if they arrive before the
    /// queue is observed empty.
    pub fn drain(&self) -> Drain<'_, K, V> {
        Drain { queue: self }
    }

    /// Number of queued entries.
    pub fn len(&self) -> usize {
        self.inner.lock().heap.len()
    }

    /// Returns `true` if the queue holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().heap.is_empty()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.inner.lock().heap.clear();
    }
}

impl<K: Ord + Clone, V: Clone> ConcurrentOrderedQueue<K, V> {
    /// Returns a copy of the entry that `try_dequeue` would remove next.
    pub fn try_peek(&self) -> Option<(K, V)> {
        let state = self.inner.lock();
        state
            .heap
            .peek()
            .map(|entry| (entry.key.clone(), entry.value.clone()))
    }

    /// Returns a sorted copy of the current contents.
    pub fn to_sorted_vec(&self) -> Vec<(K, V)> {
        let mut snapshot: Vec<(K, u64, V)> = {
            let state = self.inner.lock();
            state
                .heap
                .iter()
                .map(|entry| (entry.key.clone(), entry.seq, entry.value.clone()))
                .collect()
        };
        snapshot.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        snapshot.into_iter().map(|(k, _, v)| (k, v)).collect()
    }
}

impl<K: Ord, V> Default for ConcurrentOrderedQueue<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord, V> Extend<(K, V)> for ConcurrentOrderedQueue<K, V> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.enqueue(key, value);
        }
    }
}

impl<K: Ord, V> FromIterator<(K, V)> for ConcurrentOrderedQueue<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut queue = Self::new();
        queue.extend(iter);
        queue
    }
}

impl<K: Ord, V> fmt::Debug for ConcurrentOrderedQueue<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentOrderedQueue")
            .field("len", &self.len())
            .finish()
    }
}

/// Draining iterator returned by [`ConcurrentOrderedQueue::drain`].
pub struct Drain<'a, K, V> {
    queue: &'a ConcurrentOrderedQueue<K, V>,
}

impl<K: Ord, V> Iterator for Drain<'_, K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.queue.try_dequeue()
    }
}
