pub mod pipeline;
pub mod serial_queue;
pub mod write_behind;

pub use pipeline::{Pipeline, PipelineOutput};
pub use serial_queue::SerialTaskQueue;
pub use write_behind::WriteBehindStream;
