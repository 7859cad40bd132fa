//! Shared parallel execution substrate.
//!
//! Every asynchronous unit of work in this crate (deferred cache factories,
//! serial-queue tasks, write-behind flushes, speculative prefetches) runs on an
//! [`Executor`]. An executor is a cheap, cloneable handle to a rayon thread
//! pool: either the process-wide global pool or a pool built through
//! [`ExecutorBuilder`](crate::builder::ExecutorBuilder).
//!
//! Jobs are panic-isolated. A panicking job is logged and discarded; it never
//! takes the pool down.
//!
//! ## Example Usage
//!
//! ```
//! use parakit::executor::Executor;
//!
//! let executor = Executor::builder().num_threads(2).build().unwrap();
//! let answer = executor.compute(|| Ok::<_, std::io::Error>(6 * 7));
//! assert_eq!(answer.wait().unwrap(), 42);
//! ```

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use rayon::ThreadPool;

use crate::builder::ExecutorBuilder;
use crate::error::{BoxError, ComputationError};
use crate::sync::{SharedValue, promise, run_guarded};

/// Handle to the thread pool that runs asynchronous work.
#[derive(Clone, Default)]
pub struct Executor {
    pool: Option<Arc<ThreadPool>>,
}

impl Executor {
    /// The process-wide rayon pool.
    pub fn global() -> Self {
        Self { pool: None }
    }

    /// Starts configuring a dedicated pool.
    pub fn builder() -> ExecutorBuilder {
        ExecutorBuilder::new()
    }

    pub(crate) fn from_pool(pool: ThreadPool) -> Self {
        Self {
            pool: Some(Arc::new(pool)),
        }
    }

    /// Returns `true` for the process-wide pool.
    pub fn is_global(&self) -> bool {
        self.pool.is_none()
    }

    /// Number of worker threads backing this executor.
    pub fn num_threads(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    /// Runs `job` on the pool. Panics inside `job` are caught and logged.
    pub fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let guarded = move || {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                let err = ComputationError::from_panic(payload);
                tracing::error!(error = %err, "executor job panicked");
            }
        };
        match &self.pool {
            Some(pool) => pool.spawn(guarded),
            None => rayon::spawn(guarded),
        }
    }

    /// Runs `f` on the pool and returns a handle to its outcome.
    pub fn compute<T, E, F>(&self, f: F) -> SharedValue<T>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        E: Into<BoxError>,
        T: Send + Sync + 'static,
    {
        let (tx, rx) = promise();
        self.spawn(move || tx.complete(run_guarded(f)));
        rx
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("global", &self.is_global())
            .field("num_threads", &self.num_threads())
            .finish()
    }
}
