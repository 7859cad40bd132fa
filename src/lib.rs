//! parakit: concurrency-control primitives built around at-most-once
//! computation, strict ordering and bounded parallelism.
//!
//! - [`cache`]: memoizing caches (plain, speculative, self-healing web cache)
//! - [`ds`]: object pool and concurrent ordered queue
//! - [`task`]: serial task queue, write-behind stream and multi-stage pipeline
//! - [`sync`]: computation handles and the countdown latch
//! - [`executor`] / [`builder`]: the shared worker pool everything runs on

pub mod builder;
pub mod cache;
pub mod ds;
pub mod error;
pub mod executor;

#[cfg(feature = "metrics")]
pub mod metrics;

pub mod prelude;
pub mod sync;
pub mod task;
pub mod traits;
