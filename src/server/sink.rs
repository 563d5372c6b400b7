//! Channel-Backed Write Sink
//!
//! The engine streams values with a blocking `std::io::Write` sink while
//! axum wants an async byte stream for the response body. [`ChannelSink`]
//! bridges the two: the engine writes chunks into a bounded tokio channel
//! from inside `spawn_blocking`, and the response body drains the channel's
//! receiver.
//!
//! If the client disconnects, the body is dropped, the receiver closes, and
//! the next write fails with `BrokenPipe`. That surfaces inside the engine
//! as an ordinary sink write error, after which it releases its locks. The
//! bounded capacity gives natural backpressure for values larger than the
//! client can swallow at once.

use std::io;

use bytes::Bytes;
use tokio::sync::mpsc;

/// An `std::io::Write` adapter that forwards every chunk into a tokio
/// channel. Must be written to from outside the async runtime (the engine
/// runs under `spawn_blocking`).
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<Bytes>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }
}

impl io::Write for ChannelSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.tx
            .blocking_send(Bytes::copy_from_slice(buf))
            .map_err(|_| {
                io::Error::new(io::ErrorKind::BrokenPipe, "response body receiver dropped")
            })?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
