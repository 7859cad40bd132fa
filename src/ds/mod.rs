pub mod object_pool;
pub mod ordered_queue;

pub use object_pool::{ObjectPool, Pooled};
pub use ordered_queue::{ConcurrentOrderedQueue, Drain};
