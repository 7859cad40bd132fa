//! Builder for dedicated executors.
//!
//! Components default to the process-wide rayon pool. When a caller wants an
//! owner-controlled pool (isolation between tests, a bounded number of threads
//! for blocking factories, recognizable thread names), it builds one here and
//! hands it to the component's `with_executor` constructor.
//!
//! ## Example
//!
//! ```rust
//! use parakit::builder::ExecutorBuilder;
//! use parakit::cache::MemoizingCache;
//!
//! let executor = ExecutorBuilder::new()
//!     .num_threads(2)
//!     .thread_name("fetch")
//!     .build()
//!     .unwrap();
//! assert_eq!(executor.num_threads(), 2);
//!
//! let cache = MemoizingCache::from_fn_with_executor(|k: &u64| k + 1, executor);
//! assert_eq!(cache.get_future(&1).wait().unwrap(), 2);
//! ```

use rayon::ThreadPoolBuilder;

use crate::error::{ComputationError, ConfigError};
use crate::executor::Executor;

/// Builder for an [`Executor`] backed by its own thread pool.
#[derive(Debug, Clone, Default)]
pub struct ExecutorBuilder {
    num_threads: Option<usize>,
    thread_name: Option<String>,
    stack_size: Option<usize>,
}

impl ExecutorBuilder {
    /// Creates a builder with rayon's defaults (one thread per logical CPU).
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of worker threads. Zero selects the default.
    pub fn num_threads(mut self, threads: usize) -> Self {
        self.num_threads = Some(threads);
        self
    }

    /// Names worker threads `{prefix}-{index}`.
    pub fn thread_name(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name = Some(prefix.into());
        self
    }

    /// Sets the stack size of worker threads, in bytes.
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Builds the pool.
    ///
    /// # Example
    ///
    /// ```rust
    /// use parakit::builder::ExecutorBuilder;
    ///
    /// let executor = ExecutorBuilder::new().num_threads(1).build().unwrap();
    /// assert!(!executor.is_global());
    /// ```
    pub fn build(self) -> Result<Executor, ConfigError> {
        let mut builder = ThreadPoolBuilder::new().panic_handler(|payload| {
            let err = ComputationError::from_panic(payload);
            tracing::error!(error = %err, "executor worker panicked");
        });
        if let Some(threads) = self.num_threads {
            builder = builder.num_threads(threads);
        }
        if let Some(prefix) = self.thread_name {
            builder = builder.thread_name(move |index| format!("{prefix}-{index}"));
        }
        if let Some(bytes) = self.stack_size {
            builder = builder.stack_size(bytes);
        }

        let pool = builder
            .build()
            .map_err(|err| ConfigError::new(format!("failed to build thread pool: {err}")))?;
        tracing::debug!(threads = pool.current_num_threads(), "executor pool started");
        Ok(Executor::from_pool(pool))
    }
}
