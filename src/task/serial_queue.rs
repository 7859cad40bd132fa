//! Strictly ordered task queue on top of the shared executor.
//!
//! ## Architecture
//!
//! ```text
//!   enqueue(t0) ─┐  swap tail            enqueue(t1) ─┐  swap tail
//!                ▼                                     ▼
//!   tail: ready(()) ──on_complete──► spawn t0 ──► done0 ──on_complete──► spawn t1 ──► done1
//!                                                   ▲                                   ▲
//!                                                   └── tail after t0                   └── tail after t1
//! ```
//!
//! Each enqueue replaces the tail completion handle with its own, then hangs a
//! continuation on the previous tail that spawns the task on the executor. The
//! swap is the only critical section; enqueue never waits for execution. A task
//! only starts after its predecessor's completion signal, which fires whether
//! the predecessor succeeded, failed or panicked.
//!
//! ## Example Usage
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use parakit::task::SerialTaskQueue;
//!
//! let queue = SerialTaskQueue::new();
//! let log = Arc::new(Mutex::new(Vec::new()));
//!
//! for i in 0..5 {
//!     let log = log.clone();
//!     queue.enqueue(move || {
//!         log.lock().unwrap().push(i);
//!         Ok::<_, std::io::Error>(())
//!     });
//! }
//!
//! queue.wait_idle();
//! assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::BoxError;
use crate::executor::Executor;
use crate::sync::{SharedValue, promise, run_guarded};

/// Runs enqueued work one item at a time, in enqueue order.
pub struct SerialTaskQueue {
    executor: Executor,
    tail: Mutex<SharedValue<()>>,
    pending: Arc<AtomicUsize>,
}

impl SerialTaskQueue {
    /// Creates a queue running on the global executor.
    pub fn new() -> Self {
        Self::with_executor(Executor::global())
    }

    /// Creates a queue running on `executor`.
    pub fn with_executor(executor: Executor) -> Self {
        Self {
            executor,
            tail: Mutex::new(SharedValue::ready(())),
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Schedules `task` to run after every previously enqueued task.
    ///
    /// Returns a handle to the task's own outcome. A failing or panicking task
    /// does not prevent later tasks from running.
    pub fn enqueue<T, E, F>(&self, task: F) -> SharedValue<T>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        E: Into<BoxError>,
        T: Send + Sync + 'static,
    {
        let (result_tx, result_rx) = promise();
        let (done_tx, done_rx) = promise::<()>();
        self.pending.fetch_add(1, Ordering::AcqRel);

        let previous = std::mem::replace(&mut *self.tail.lock(), done_rx);

        let executor = self.executor.clone();
        let pending = Arc::clone(&self.pending);
        previous.on_complete(move |_| {
            executor.spawn(move || {
                let outcome = run_guarded(task);
                if let Err(err) = &outcome {
                    tracing::debug!(error = %err, "serial task failed");
                }
                result_tx.complete(outcome);
                pending.fetch_sub(1, Ordering::AcqRel);
                done_tx.fulfill(());
            });
        });
        result_rx
    }

    /// Handle that completes once every task enqueued so far has finished.
    pub fn completed(&self) -> SharedValue<()> {
        self.tail.lock().clone()
    }

    /// Blocks until every task enqueued so far has finished.
    pub fn wait_idle(&self) {
        let _ = self.completed().wait_ref();
    }

    /// Number of enqueued tasks that have not finished yet.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Returns the executor tasks run on.
    pub fn executor(&self) -> &Executor {
        &self.executor
    }
}

impl Default for SerialTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SerialTaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialTaskQueue")
            .field("pending", &self.pending())
            .field("executor", &self.executor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    use super::*;
    use crate::error::ComputationError;

    fn pool(threads: usize) -> Executor {
        Executor::builder().num_threads(threads).build().unwrap()
    }

    #[test]
    fn returns_each_task_result() {
        let queue = SerialTaskQueue::with_executor(pool(2));
        let a = queue.enqueue(|| Ok::<_, BoxError>(1));
        let b = queue.enqueue(|| Ok::<_, BoxError>("two"));
        assert_eq!(a.wait().unwrap(), 1);
        assert_eq!(b.wait().unwrap(), "two");
    }

    #[test]
    fn tasks_never_overlap() {
        let queue = SerialTaskQueue::with_executor(pool(4));
        let busy = Arc::new(AtomicBool::new(false));
        let overlaps = Arc::new(AtomicUsize::new(0));

        for _ in 0..50 {
            let busy = busy.clone();
            let overlaps = overlaps.clone();
            queue.enqueue(move || {
                if busy.swap(true, Ordering::SeqCst) {
                    overlaps.fetch_add(1, Ordering::SeqCst);
                }
                std::thread::sleep(Duration::from_micros(200));
                busy.store(false, Ordering::SeqCst);
                Ok::<_, BoxError>(())
            });
        }

        queue.wait_idle();
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn failure_does_not_poison_later_tasks() {
        let queue = SerialTaskQueue::with_executor(pool(2));
        let failed = queue.enqueue(|| Err::<(), _>("first task failed"));
        let panicked = queue.enqueue(|| -> Result<(), BoxError> { panic!("second task panicked") });
        let ok = queue.enqueue(|| Ok::<_, BoxError>(3));

        assert!(matches!(failed.wait(), Err(ComputationError::Failed(_))));
        assert!(matches!(panicked.wait(), Err(ComputationError::Panicked(_))));
        assert_eq!(ok.wait().unwrap(), 3);
    }

    #[test]
    fn completed_on_empty_queue_is_ready() {
        let queue = SerialTaskQueue::new();
        assert!(queue.completed().is_complete());
        queue.wait_idle();
    }

    #[test]
    fn completed_covers_only_tasks_enqueued_before_it() {
        let queue = SerialTaskQueue::with_executor(pool(2));
        let (gate_tx, gate_rx) = promise::<()>();
        queue.enqueue(move || gate_rx.wait());
        let done = queue.completed();
        assert!(!done.is_complete());
        assert_eq!(queue.pending(), 1);

        gate_tx.fulfill(());
        done.wait().unwrap();
        assert_eq!(queue.pending(), 0);
    }
}
