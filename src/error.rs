//! Error types for the parakit library.
//!
//! ## Key Components
//!
//! - [`ComputationError`]: Stored inside a [`SharedValue`](crate::sync::SharedValue)
//!   when a factory, stage or task fails. Cloneable so that every waiter on the
//!   same handle observes the same failure.
//! - [`CountdownError`]: Returned when an [`ActionCountdown`](crate::sync::ActionCountdown)
//!   is signalled past zero or re-armed after it fired.
//! - [`ConfigError`]: Returned when executor configuration is invalid.
//! - [`IntoInnerError`]: A failed close of a write-behind stream, carrying the sink.
//!
//! ## Example Usage
//!
//! ```
//! use parakit::error::ComputationError;
//! use parakit::cache::MemoizingCache;
//!
//! let cache = MemoizingCache::new(|key: &u32| {
//!     if *key == 0 {
//!         Err("zero is not allowed")
//!     } else {
//!         Ok(key * 10)
//!     }
//! });
//!
//! assert_eq!(cache.get_value(&4).unwrap(), 40);
//! let err = cache.get_value(&0).unwrap_err();
//! assert!(matches!(err, ComputationError::Failed(_)));
//! ```

use std::any::Any;
use std::error::Error;
use std::fmt;
use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Boxed error accepted from user-supplied factories, stages and tasks.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

// ---------------------------------------------------------------------------
// ComputationError
// ---------------------------------------------------------------------------

/// Failure recorded in a computation handle.
///
/// Produced when a cache factory, pipeline stage or serial task returns an
/// error or panics. The error is stored once and handed to every waiter, so
/// it is cheap to clone.
#[derive(Debug, Clone, Error)]
pub enum ComputationError {
    /// The computation returned an error.
    #[error("computation failed: {0}")]
    Failed(Arc<dyn Error + Send + Sync + 'static>),

    /// The computation panicked; carries the panic message when it was a string.
    #[error("computation panicked: {0}")]
    Panicked(String),

    /// The producing side was dropped without publishing a result.
    #[error("computation was abandoned before producing a value")]
    Abandoned,
}

impl ComputationError {
    /// Wraps any error the computation raised.
    pub fn failed(err: impl Into<BoxError>) -> Self {
        Self::Failed(Arc::from(err.into()))
    }

    /// Builds a `Panicked` error from a `catch_unwind` payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            String::from("non-string panic payload")
        };
        Self::Panicked(message)
    }

    /// Returns the wrapped error for `Failed`, if any.
    pub fn cause(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        match self {
            Self::Failed(err) => Some(err.as_ref()),
            Self::Panicked(_) | Self::Abandoned => None,
        }
    }
}

// ---------------------------------------------------------------------------
// CountdownError
// ---------------------------------------------------------------------------

/// Contract violations on an [`ActionCountdown`](crate::sync::ActionCountdown).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CountdownError {
    /// More signals were delivered than the count still outstanding.
    #[error("countdown over-signaled: {requested} signal(s) requested, {remaining} remaining")]
    OverSignaled { remaining: usize, requested: usize },

    /// The countdown already reached zero and can no longer be re-armed.
    #[error("countdown has already fired")]
    AlreadySet,
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when configuration parameters are invalid.
///
/// Produced by [`ExecutorBuilder::build`](crate::builder::ExecutorBuilder::build).
/// Carries a human-readable description of what failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ConfigError(String);

impl ConfigError {
    /// Creates a new `ConfigError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// IntoInnerError
// ---------------------------------------------------------------------------

/// Returned by [`WriteBehindStream::into_inner`](crate::task::WriteBehindStream::into_inner)
/// when closing the stream failed.
///
/// The sink is handed back alongside the error so the caller can retry or
/// inspect it.
#[derive(Error)]
#[error("{error}")]
pub struct IntoInnerError<W> {
    error: io::Error,
    sink: W,
}

impl<W> IntoInnerError<W> {
    pub(crate) fn new(error: io::Error, sink: W) -> Self {
        Self { error, sink }
    }

    /// The error raised while draining or flushing the sink.
    pub fn error(&self) -> &io::Error {
        &self.error
    }

    /// Discards the error and returns the sink.
    pub fn into_inner(self) -> W {
        self.sink
    }

    /// Splits into the error and the sink.
    pub fn into_parts(self) -> (io::Error, W) {
        (self.error, self.sink)
    }
}

impl<W> fmt::Debug for IntoInnerError<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntoInnerError")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<W> From<IntoInnerError<W>> for io::Error {
    fn from(err: IntoInnerError<W>) -> Self {
        err.error
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
