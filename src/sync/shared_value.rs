//! Write-once computation handles.
//!
//! A [`SharedValue<V>`] is the read side of a computation: any number of
//! threads can clone it, block on it, poll it, or attach continuations. The
//! matching [`Promise<V>`] is the write side and publishes exactly one
//! `Result<V, ComputationError>`.
//!
//! ## Architecture
//!
//! ```text
//!   promise() ──► (Promise<V>, SharedValue<V>)
//!                     │              │ clone ─► SharedValue<V> ─► wait()
//!                     │              │ clone ─► SharedValue<V> ─► on_complete(f)
//!                     ▼              ▼
//!               ┌────────────────────────────────────────────┐
//!               │ Slot<V>                                    │
//!               │   result:  OnceCell<Result<V, Error>>      │  set once
//!               │   waiting: Mutex<Vec<Continuation<V>>>     │  drained once
//!               │   ready:   Condvar                         │  notify_all
//!               └────────────────────────────────────────────┘
//! ```
//!
//! The result lives in a [`OnceCell`], so completed handles are read without
//! taking the lock. The mutex only orders "register continuation" against
//! "publish result" so that no continuation is lost or run twice.
//!
//! ## Example Usage
//!
//! ```
//! use parakit::sync::{promise, SharedValue};
//!
//! let (tx, rx) = promise::<u32>();
//! let reader = rx.clone();
//! std::thread::spawn(move || tx.fulfill(7));
//!
//! assert_eq!(reader.wait().unwrap(), 7);
//! assert!(rx.is_complete());
//!
//! let ready = SharedValue::ready("done");
//! assert_eq!(ready.try_get().unwrap().unwrap(), "done");
//! ```

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;
use parking_lot::{Condvar, Mutex};

use crate::error::{BoxError, ComputationError};

/// Result stored in a handle.
pub type Outcome<V> = Result<V, ComputationError>;

type Continuation<V> = Box<dyn FnOnce(&Outcome<V>) + Send + 'static>;

struct Slot<V> {
    result: OnceCell<Outcome<V>>,
    waiting: Mutex<Vec<Continuation<V>>>,
    ready: Condvar,
}

impl<V> Slot<V> {
    fn empty() -> Self {
        Self {
            result: OnceCell::new(),
            waiting: Mutex::new(Vec::new()),
            ready: Condvar::new(),
        }
    }

    fn publish(&self, outcome: Outcome<V>) -> bool {
        if self.result.set(outcome).is_err() {
            return false;
        }
        let continuations = {
            let mut waiting = self.waiting.lock();
            self.ready.notify_all();
            std::mem::take(&mut *waiting)
        };
        if let Some(outcome) = self.result.get() {
            for continuation in continuations {
                continuation(outcome);
            }
        }
        true
    }
}

/// Creates a connected pair of [`Promise`] and [`SharedValue`].
pub fn promise<V>() -> (Promise<V>, SharedValue<V>) {
    let slot = Arc::new(Slot::empty());
    (
        Promise {
            slot: Some(Arc::clone(&slot)),
        },
        SharedValue { slot },
    )
}

/// Runs `f`, converting both its error and any panic into a [`ComputationError`].
pub(crate) fn run_guarded<T, E, F>(f: F) -> Outcome<T>
where
    F: FnOnce() -> Result<T, E>,
    E: Into<BoxError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(ComputationError::failed(err)),
        Err(payload) => Err(ComputationError::from_panic(payload)),
    }
}

// ---------------------------------------------------------------------------
// SharedValue
// ---------------------------------------------------------------------------

/// Read side of a write-once computation.
///
/// Cloning is cheap (one `Arc` increment); every clone observes the same
/// outcome. Use [`SharedValue::ptr_eq`] to check whether two handles refer to
/// the same computation.
pub struct SharedValue<V> {
    slot: Arc<Slot<V>>,
}

impl<V> Clone for SharedValue<V> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<V> SharedValue<V> {
    /// Returns a handle that is already completed with `value`.
    pub fn ready(value: V) -> Self {
        Self::completed(Ok(value))
    }

    /// Returns a handle that is already completed with `err`.
    pub fn failed(err: ComputationError) -> Self {
        Self::completed(Err(err))
    }

    /// Returns a handle that is already completed with `outcome`.
    pub fn completed(outcome: Outcome<V>) -> Self {
        let slot = Slot::empty();
        let _ = slot.result.set(outcome);
        Self {
            slot: Arc::new(slot),
        }
    }

    /// Returns `true` once a result has been published.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.slot.result.get().is_some()
    }

    /// Returns `true` if both handles refer to the same computation.
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }

    /// Borrows the outcome, blocking until it is published.
    pub fn wait_ref(&self) -> &Outcome<V> {
        if let Some(outcome) = self.slot.result.get() {
            return outcome;
        }
        let mut waiting = self.slot.waiting.lock();
        loop {
            if let Some(outcome) = self.slot.result.get() {
                return outcome;
            }
            self.slot.ready.wait(&mut waiting);
        }
    }

    /// Borrows the outcome if it has been published.
    #[inline]
    pub fn peek(&self) -> Option<&Outcome<V>> {
        self.slot.result.get()
    }

    /// Registers `f` to run with the outcome.
    ///
    /// If the handle is already complete, `f` runs immediately on the calling
    /// thread; otherwise it runs on the thread that publishes the result.
    pub fn on_complete<F>(&self, f: F)
    where
        F: FnOnce(&Outcome<V>) + Send + 'static,
    {
        {
            let mut waiting = self.slot.waiting.lock();
            if self.slot.result.get().is_none() {
                waiting.push(Box::new(f));
                return;
            }
        }
        if let Some(outcome) = self.slot.result.get() {
            f(outcome);
        }
    }
}

impl<V: Clone> SharedValue<V> {
    /// Blocks until the computation finishes and returns a clone of its outcome.
    pub fn wait(&self) -> Outcome<V> {
        self.wait_ref().clone()
    }

    /// Like [`wait`](Self::wait), giving up after `timeout`.
    ///
    /// Returns `None` if nothing was published in time.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Outcome<V>> {
        if let Some(outcome) = self.slot.result.get() {
            return Some(outcome.clone());
        }
        let deadline = Instant::now() + timeout;
        let mut waiting = self.slot.waiting.lock();
        loop {
            if let Some(outcome) = self.slot.result.get() {
                return Some(outcome.clone());
            }
            if self.slot.ready.wait_until(&mut waiting, deadline).timed_out() {
                return self.slot.result.get().cloned();
            }
        }
    }

    /// Returns a clone of the outcome without blocking.
    pub fn try_get(&self) -> Option<Outcome<V>> {
        self.slot.result.get().cloned()
    }
}

impl<V: fmt::Debug> fmt::Debug for SharedValue<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slot.result.get() {
            Some(outcome) => f.debug_tuple("SharedValue").field(outcome).finish(),
            None => f.write_str("SharedValue(<pending>)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Promise
// ---------------------------------------------------------------------------

/// Write side of a [`SharedValue`].
///
/// Publishing consumes the promise. Dropping it unpublished completes the
/// handle with [`ComputationError::Abandoned`] so that waiters never hang.
pub struct Promise<V> {
    slot: Option<Arc<Slot<V>>>,
}

impl<V> Promise<V> {
    /// Publishes `outcome` and wakes every waiter.
    pub fn complete(mut self, outcome: Outcome<V>) {
        if let Some(slot) = self.slot.take() {
            slot.publish(outcome);
        }
    }

    /// Publishes a successful value.
    pub fn fulfill(self, value: V) {
        self.complete(Ok(value));
    }

    /// Publishes a failure.
    pub fn fail(self, err: ComputationError) {
        self.complete(Err(err));
    }
}

impl<V> Drop for Promise<V> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            slot.publish(Err(ComputationError::Abandoned));
        }
    }
}

impl<V> fmt::Debug for Promise<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("published", &self.slot.is_none())
            .finish()
    }
}
