//! Destinations for session frames.

use std::future::Future;
use std::io;

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;

/// Where a session writes its frames.
///
/// `write` buffers; `flush` pushes buffered bytes to the peer.
pub trait FrameSink: Send {
    fn write(&mut self, frame: &str) -> io::Result<()>;

    fn flush(&mut self) -> impl Future<Output = io::Result<()>> + Send;

    /// Resolves once the peer can no longer receive anything.
    fn closed(&self) -> impl Future<Output = ()> + Send;
}

/// Feeds an HTTP response body through a bounded channel.
pub struct ChannelSink {
    buf: BytesMut,
    tx: mpsc::Sender<Result<Bytes, io::Error>>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Result<Bytes, io::Error>>) -> Self {
        Self {
            buf: BytesMut::new(),
            tx,
        }
    }
}

fn peer_gone() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "stream peer went away")
}

impl FrameSink for ChannelSink {
    fn write(&mut self, frame: &str) -> io::Result<()> {
        if self.tx.is_closed() {
            return Err(peer_gone());
        }
        self.buf.extend_from_slice(frame.as_bytes());
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = self.buf.split().freeze();
        self.tx.send(Ok(chunk)).await.map_err(|_| peer_gone())
    }

    async fn closed(&self) {
        self.tx.closed().await
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::sync::Notify;

    /// Collects flushed output in memory.
    #[derive(Clone, Default)]
    pub struct MemorySink {
        pending: Arc<Mutex<String>>,
        output: Arc<Mutex<String>>,
        flushes: Arc<Mutex<usize>>,
        fail_after_flushes: Option<usize>,
        gone: Arc<Notify>,
    }

    impl MemorySink {
        pub fn new() -> Self {
            Self::default()
        }

        /// Flushes fail once this many succeeded.
        pub fn failing_after(flushes: usize) -> Self {
            Self {
                fail_after_flushes: Some(flushes),
                ..Self::default()
            }
        }

        pub fn output(&self) -> String {
            self.output.lock().unwrap().clone()
        }

        /// Simulate the peer disconnecting.
        pub fn disconnect(&self) {
            self.gone.notify_one();
        }
    }

    impl FrameSink for MemorySink {
        fn write(&mut self, frame: &str) -> io::Result<()> {
            self.pending.lock().unwrap().push_str(frame);
            Ok(())
        }

        async fn flush(&mut self) -> io::Result<()> {
            let mut flushes = self.flushes.lock().unwrap();
            if self.fail_after_flushes.is_some_and(|max| *flushes >= max) {
                return Err(peer_gone());
            }
            *flushes += 1;
            let pending = std::mem::take(&mut *self.pending.lock().unwrap());
            self.output.lock().unwrap().push_str(&pending);
            Ok(())
        }

        async fn closed(&self) {
            self.gone.notified().await
        }
    }
}
