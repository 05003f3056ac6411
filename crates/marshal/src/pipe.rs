//! Bounded in-memory byte pipe.
//!
//! Connects a producer thread writing XML to a consumer reading it. The
//! buffer holds at most `capacity` bytes; a writer facing a full buffer
//! blocks until the reader drains it. Dropping either end closes it: the
//! reader then sees end of stream once the buffer is drained, and the writer
//! gets [`io::ErrorKind::BrokenPipe`].

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

struct State {
    buffer: VecDeque<u8>,
    capacity: usize,
    writer_closed: bool,
    reader_closed: bool,
}

struct Shared {
    state: Mutex<State>,
    /// Signalled when bytes arrive or the writer closes
    readable: Condvar,
    /// Signalled when bytes are consumed or the reader closes
    writable: Condvar,
}

/// Creates a pipe holding up to `capacity` bytes (at least one).
///
/// With `write_timeout` set, a write that waits that long on a full buffer
/// fails with [`io::ErrorKind::TimedOut`].
pub fn pipe(capacity: usize, write_timeout: Option<Duration>) -> (PipeReader, PipeWriter) {
    let capacity = capacity.max(1);
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
            writer_closed: false,
            reader_closed: false,
        }),
        readable: Condvar::new(),
        writable: Condvar::new(),
    });
    (
        PipeReader {
            shared: Arc::clone(&shared),
        },
        PipeWriter {
            shared,
            write_timeout,
            closed: false,
        },
    )
}

/// Reading end of a [`pipe`].
pub struct PipeReader {
    shared: Arc<Shared>,
}

impl PipeReader {
    /// Reads the rest of the stream into a string.
    pub fn read_to_string_lossy(&mut self) -> io::Result<String> {
        let mut bytes = Vec::new();
        self.read_to_end(&mut bytes)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut state = self.shared.state.lock();
        loop {
            if !state.buffer.is_empty() {
                let count = buf.len().min(state.buffer.len());
                for (slot, byte) in buf.iter_mut().zip(state.buffer.drain(..count)) {
                    *slot = byte;
                }
                self.shared.writable.notify_all();
                return Ok(count);
            }
            if state.writer_closed {
                return Ok(0);
            }
            self.shared.readable.wait(&mut state);
        }
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.reader_closed = true;
        state.buffer.clear();
        self.shared.writable.notify_all();
    }
}

/// Writing end of a [`pipe`].
pub struct PipeWriter {
    shared: Arc<Shared>,
    write_timeout: Option<Duration>,
    closed: bool,
}

impl PipeWriter {
    /// Signals end of stream to the reader. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut state = self.shared.state.lock();
        state.writer_closed = true;
        self.shared.readable.notify_all();
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "write to a closed pipe",
            ));
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let mut state = self.shared.state.lock();
        loop {
            if state.reader_closed {
                return Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "pipe reader was dropped",
                ));
            }
            let free = state.capacity - state.buffer.len();
            if free > 0 {
                let count = free.min(buf.len());
                state.buffer.extend(&buf[..count]);
                self.shared.readable.notify_all();
                return Ok(count);
            }
            match self.write_timeout {
                Some(timeout) => {
                    let waited = self.shared.writable.wait_for(&mut state, timeout);
                    if waited.timed_out()
                        && !state.reader_closed
                        && state.buffer.len() >= state.capacity
                    {
                        return Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            format!("pipe reader made no progress for {:?}", timeout),
                        ));
                    }
                }
                None => self.shared.writable.wait(&mut state),
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_bytes_arrive_in_order() {
        let (mut reader, mut writer) = pipe(7, None);
        let producer = thread::spawn(move || {
            for chunk in 0..100u8 {
                writer.write_all(&[chunk; 13]).unwrap();
            }
        });
        let mut received = Vec::new();
        reader.read_to_end(&mut received).unwrap();
        producer.join().unwrap();

        let expected: Vec<u8> = (0..100u8).flat_map(|chunk| [chunk; 13]).collect();
        assert_eq!(received, expected);
    }

    #[test]
    fn test_reader_sees_eof_after_close() {
        let (mut reader, mut writer) = pipe(16, None);
        writer.write_all(b"abc").unwrap();
        writer.close();
        assert!(writer.write(b"d").is_err());
        assert_eq!(reader.read_to_string_lossy().unwrap(), "abc");
        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_dropping_writer_closes_stream() {
        let (mut reader, writer) = pipe(16, None);
        drop(writer);
        assert_eq!(reader.read_to_string_lossy().unwrap(), "");
    }

    #[test]
    fn test_dropping_reader_breaks_blocked_writer() {
        let (reader, mut writer) = pipe(4, None);
        let producer = thread::spawn(move || writer.write_all(&[1u8; 64]));
        thread::sleep(Duration::from_millis(50));
        drop(reader);
        let err = producer.join().unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_stalled_reader_times_out_writer() {
        let (_reader, mut writer) = pipe(4, Some(Duration::from_millis(20)));
        let err = writer.write_all(&[1u8; 8]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }
}
