//! Write-behind proxy for a byte sink.
//!
//! ## Architecture
//!
//! ```text
//!   write_bytes(buf) ──► copy ──► SerialTaskQueue ──► sink.write_all(copy)
//!   write_bytes(buf) ──► copy ──┘      (one task at a time, FIFO)
//!
//!   close() ──► mark closed ──► enqueue flush ──► wait ──► first error, if any
//! ```
//!
//! Callers never wait for the sink on `write_bytes`; the copies are applied
//! by a [`SerialTaskQueue`], so they reach the sink in call order. The first
//! sink error is kept and reported by the next [`flush`](WriteBehindStream::flush)
//! or [`close`](WriteBehindStream::close). A failed write only loses its own
//! bytes; writes queued behind it are still applied.
//!
//! ## Example Usage
//!
//! ```
//! use parakit::task::WriteBehindStream;
//!
//! let stream = WriteBehindStream::new(Vec::new());
//! stream.write_bytes(b"hello ");
//! stream.write_bytes(b"world");
//!
//! let sink = stream.into_inner().unwrap();
//! assert_eq!(sink, b"hello world");
//! ```

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{BoxError, IntoInnerError};
use crate::executor::Executor;
use crate::sync::SharedValue;
use crate::task::SerialTaskQueue;

type ErrorSlot = Arc<Mutex<Option<io::Error>>>;

/// Proxies writes to `W` through a single background worker.
pub struct WriteBehindStream<W: Write + Send + 'static> {
    queue: SerialTaskQueue,
    sink: Arc<Mutex<Option<W>>>,
    closed: RwLock<bool>,
    first_error: ErrorSlot,
}

impl<W: Write + Send + 'static> WriteBehindStream<W> {
    /// Wraps `sink`, applying writes on the global executor.
    pub fn new(sink: W) -> Self {
        Self::with_executor(sink, Executor::global())
    }

    /// Wraps `sink`, applying writes on `executor`.
    pub fn with_executor(sink: W, executor: Executor) -> Self {
        Self {
            queue: SerialTaskQueue::with_executor(executor),
            sink: Arc::new(Mutex::new(Some(sink))),
            closed: RwLock::new(false),
            first_error: Arc::new(Mutex::new(None)),
        }
    }

    fn record_error(slot: &ErrorSlot, err: io::Error) {
        let mut first = slot.lock();
        if first.is_none() {
            tracing::warn!(error = %err, "write-behind sink failed");
            *first = Some(err);
        }
    }

    /// Queues a copy of `buf` for the sink and returns immediately.
    ///
    /// After [`close`](Self::close) this does nothing.
    pub fn write_bytes(&self, buf: &[u8]) {
        let closed = self.closed.read();
        if *closed {
            tracing::trace!(len = buf.len(), "write after close ignored");
            return;
        }
        let data = buf.to_vec();
        let sink = Arc::clone(&self.sink);
        let errors = Arc::clone(&self.first_error);
        self.queue.enqueue(move || {
            if let Some(sink) = sink.lock().as_mut() {
                if let Err(err) = sink.write_all(&data) {
                    Self::record_error(&errors, err);
                }
            }
            Ok::<(), BoxError>(())
        });
    }

    /// Queues a flush behind the pending writes.
    fn enqueue_flush(&self) -> SharedValue<()> {
        let sink = Arc::clone(&self.sink);
        let errors = Arc::clone(&self.first_error);
        self.queue.enqueue(move || {
            if let Some(sink) = sink.lock().as_mut() {
                if let Err(err) = sink.flush() {
                    Self::record_error(&errors, err);
                }
            }
            Ok::<(), BoxError>(())
        })
    }

    /// Waits for `done` and takes the first recorded error.
    fn finish(&self, done: SharedValue<()>) -> io::Result<()> {
        let _ = done.wait_ref();
        match self.first_error.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn drain_and_flush(&self) -> io::Result<()> {
        let done = self.enqueue_flush();
        self.finish(done)
    }

    /// Waits for every queued write, then flushes the sink.
    ///
    /// Returns (and clears) the first error the sink raised since the last
    /// flush or close.
    pub fn flush(&self) -> io::Result<()> {
        self.drain_and_flush()
    }

    /// Stops accepting writes, drains the queue and flushes the sink.
    ///
    /// Only the first call reports errors. Later calls return `Ok(())` once
    /// the first call's drain has finished.
    pub fn close(&self) -> io::Result<()> {
        let done = {
            let mut closed = self.closed.write();
            if *closed {
                drop(closed);
                self.queue.wait_idle();
                return Ok(());
            }
            *closed = true;
            tracing::debug!(pending = self.queue.pending(), "closing write-behind stream");
            // enqueued under the lock so a concurrent close waits for it
            self.enqueue_flush()
        };
        self.finish(done)
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        *self.closed.read()
    }

    /// Number of queued operations not yet applied to the sink.
    pub fn pending(&self) -> usize {
        self.queue.pending()
    }

    /// Closes the stream and hands back the sink.
    ///
    /// If closing fails the sink is returned inside the error.
    pub fn into_inner(self) -> Result<W, IntoInnerError<W>> {
        let closed = self.close();
        let sink = self.sink.lock().take();
        match (closed, sink) {
            (Ok(()), Some(sink)) => Ok(sink),
            (Err(err), Some(sink)) => Err(IntoInnerError::new(err, sink)),
            (_, None) => unreachable!("write-behind sink taken twice"),
        }
    }
}

impl<W: Write + Send + 'static> Write for WriteBehindStream<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.drain_and_flush()
    }
}

impl<W: Write + Send + 'static> Drop for WriteBehindStream<W> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(error = %err, "write-behind stream failed while closing on drop");
        }
    }
}

impl<W: Write + Send + 'static> fmt::Debug for WriteBehindStream<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteBehindStream")
            .field("closed", &self.is_closed())
            .field("pending", &self.pending())
            .finish()
    }
}
