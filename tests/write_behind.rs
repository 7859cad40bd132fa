// ==============================================
// WRITE-BEHIND STREAM TESTS (integration)
// ==============================================
use std::io::{self, Write};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use parakit::task::WriteBehindStream;

/// Sink that records writes and is slow enough to build a backlog.
#[derive(Clone, Default)]
struct SlowSink {
    data: Arc<Mutex<Vec<u8>>>,
    flushes: Arc<Mutex<usize>>,
}

impl Write for SlowSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        thread::sleep(Duration::from_micros(50));
        self.data.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        *self.flushes.lock().unwrap() += 1;
        Ok(())
    }
}

#[test]
fn test_close_makes_all_writes_durable() {
    let sink = SlowSink::default();
    let stream = WriteBehindStream::new(sink.clone());

    let mut expected = Vec::new();
    for i in 0..200u32 {
        let chunk = i.to_le_bytes();
        expected.extend_from_slice(&chunk);
        stream.write_bytes(&chunk);
    }
    stream.close().unwrap();

    assert_eq!(*sink.data.lock().unwrap(), expected);
    assert_eq!(*sink.flushes.lock().unwrap(), 1);
}

#[test]
fn test_write_after_close_neither_fails_nor_appears() {
    let sink = SlowSink::default();
    let mut stream = WriteBehindStream::new(sink.clone());
    stream.write_all(b"before").unwrap();
    stream.close().unwrap();

    stream.write_all(b"after").unwrap();
    stream.write_bytes(b"after");
    assert!(stream.close().is_ok());
    assert_eq!(*sink.data.lock().unwrap(), b"before");
}

#[test]
fn test_concurrent_writers_keep_chunks_intact() {
    let num_threads = 4;
    let writes_per_thread = 50;
    let sink = SlowSink::default();
    let stream = Arc::new(WriteBehindStream::new(sink.clone()));
    let barrier = Arc::new(Barrier::new(num_threads));

    let handles: Vec<_> = (0..num_threads)
        .map(|thread_id| {
            let stream = stream.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..writes_per_thread {
                    stream.write_bytes(&[thread_id as u8; 8]);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    stream.close().unwrap();

    let data = sink.data.lock().unwrap();
    assert_eq!(data.len(), num_threads * writes_per_thread * 8);
    // Writes are never interleaved inside a chunk
    for chunk in data.chunks(8) {
        assert!(chunk.iter().all(|b| *b == chunk[0]));
    }
}

#[test]
fn test_into_inner_returns_the_drained_sink() {
    let stream = WriteBehindStream::new(Vec::new());
    for word in ["write", "-", "behind"] {
        stream.write_bytes(word.as_bytes());
    }
    assert_eq!(stream.into_inner().unwrap(), b"write-behind");
}

#[test]
fn test_second_close_waits_for_the_first_drain() {
    /// Sink whose writes take long enough for a second close to overlap.
    #[derive(Clone, Default)]
    struct DelayedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for DelayedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            thread::sleep(Duration::from_millis(50));
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    let sink = DelayedSink::default();
    let stream = Arc::new(WriteBehindStream::new(sink.clone()));
    for chunk in [b"w", b"x", b"y", b"z"] {
        stream.write_bytes(chunk);
    }

    let first = {
        let stream = stream.clone();
        thread::spawn(move || stream.close())
    };
    thread::sleep(Duration::from_millis(20));
    stream.close().unwrap();

    assert_eq!(*sink.0.lock().unwrap(), b"wxyz");
    first.join().unwrap().unwrap();
}

#[test]
fn test_failed_write_does_not_block_later_writes() {
    /// Rejects chunks starting with `!`.
    #[derive(Clone, Default)]
    struct PickySink(Arc<Mutex<Vec<u8>>>);

    impl Write for PickySink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if buf.first() == Some(&b'!') {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "rejected"));
            }
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    let sink = PickySink::default();
    let stream = WriteBehindStream::new(sink.clone());
    stream.write_bytes(b"a");
    stream.write_bytes(b"!b");
    stream.write_bytes(b"c");
    stream.write_bytes(b"d");

    let err = stream.close().unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    assert_eq!(*sink.0.lock().unwrap(), b"acd");
}
