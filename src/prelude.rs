pub use crate::builder::ExecutorBuilder;
pub use crate::cache::{MemoizingCache, SpeculativeCache, WebCache};
pub use crate::ds::{ConcurrentOrderedQueue, ObjectPool, Pooled};
pub use crate::error::{BoxError, ComputationError, ConfigError, CountdownError, IntoInnerError};
pub use crate::executor::Executor;
#[cfg(feature = "metrics")]
pub use crate::metrics::snapshot::CacheMetricsSnapshot;
#[cfg(feature = "metrics")]
pub use crate::metrics::traits::{MetricsExporter, MetricsReset, MetricsSnapshotProvider};
pub use crate::sync::{ActionCountdown, Promise, SharedValue, promise};
pub use crate::task::{Pipeline, PipelineOutput, SerialTaskQueue, WriteBehindStream};
pub use crate::traits::{ConcurrentCache, FutureCache};
