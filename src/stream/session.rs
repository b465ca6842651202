//! Streaming session writer.
//!
//! # Session Phases
//! ```text
//! Opening:  ": ping" + "events: stream opened", flushed
//! Running:  value     → "data: <json>"
//!           keep-alive → ": ping"
//!           deadline  → "events: stream timeout", then Draining
//!           producer done → Draining
//!           peer gone / cancelled → Closed (nothing more written)
//! Draining: "events: error\ndata: eof" + "events: stream closed"
//! ```
//!
//! # Design Decisions
//! - One writer task per session; it alone touches the sink
//! - Every write is guarded: once closed, later writes are no-ops
//! - A panic inside the writer ends the session, never the process

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue};
use axum::response::Response;
use futures_util::FutureExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::StreamingConfig;
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::observability::metrics;
use crate::rpc::server::panic_message;
use crate::stream::frame;
use crate::stream::publisher::{Handoff, Publisher};
use crate::stream::sink::{ChannelSink, FrameSink};

/// Chunks buffered between the writer and the HTTP connection.
const BODY_BUFFER: usize = 16;

/// Settings for one session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub keep_alive: Duration,
    pub timeout: Duration,
    /// Ends the session immediately when triggered.
    pub cancel: Option<ShutdownSignal>,
}

impl SessionOptions {
    pub fn from_config(config: &StreamingConfig) -> Self {
        Self {
            keep_alive: Duration::from_secs(config.keep_alive_secs),
            timeout: Duration::from_secs(config.session_timeout_secs),
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: ShutdownSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&StreamingConfig::default())
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// All producers finished; the terminal frames were written.
    Drained,
    /// The deadline passed; timeout and terminal frames were written.
    TimedOut,
    /// The request was cancelled; nothing further was written.
    Cancelled,
    /// The peer went away or a write failed.
    PeerGone,
}

/// The running writer of one session.
pub struct SessionHandle {
    task: JoinHandle<Option<SessionEnd>>,
}

impl SessionHandle {
    /// Wait for the writer to exit. `None` if it panicked.
    pub async fn finished(self) -> Option<SessionEnd> {
        self.task.await.ok().flatten()
    }
}

/// Open a session that streams into an HTTP response.
///
/// The response carries the event-stream headers; its body ends when the
/// session does.
pub fn open<T>(options: SessionOptions) -> (Publisher<T>, Response)
where
    T: Serialize + Send + 'static,
{
    let (body_tx, body_rx) = mpsc::channel(BODY_BUFFER);
    let (publisher, _handle) = open_with_sink(options, ChannelSink::new(body_tx));

    let chunks = futures_util::stream::unfold(body_rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    });
    let mut response = Response::new(Body::from_stream(chunks));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );

    (publisher, response)
}

/// Open a session writing into an arbitrary sink.
pub fn open_with_sink<T, S>(options: SessionOptions, sink: S) -> (Publisher<T>, SessionHandle)
where
    T: Serialize + Send + 'static,
    S: FrameSink + 'static,
{
    let (tx, rx) = mpsc::channel(1);

    let task = tokio::spawn(async move {
        metrics::session_opened();
        let result = AssertUnwindSafe(run(rx, sink, options)).catch_unwind().await;
        metrics::session_closed();

        match result {
            Ok(end) => {
                tracing::debug!(end = ?end, "Streaming session ended");
                Some(end)
            }
            Err(panic) => {
                tracing::error!(panic = %panic_message(&*panic), "Streaming session writer panicked");
                None
            }
        }
    });

    (Publisher::new(tx), SessionHandle { task })
}

/// Sink wrapper that turns the first failure into a permanent closed state.
struct Writer<S> {
    sink: S,
    closed: bool,
    cancel: Option<ShutdownSignal>,
}

impl<S: FrameSink> Writer<S> {
    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.is_triggered())
    }

    fn write(&mut self, frame: &str) -> bool {
        if self.closed || self.is_cancelled() {
            self.closed = true;
            return false;
        }
        if let Err(e) = self.sink.write(frame) {
            tracing::debug!(error = %e, "Streaming write failed");
            self.closed = true;
            return false;
        }
        true
    }

    async fn flush(&mut self) -> bool {
        if self.closed || self.is_cancelled() {
            self.closed = true;
            return false;
        }
        if let Err(e) = self.sink.flush().await {
            tracing::debug!(error = %e, "Streaming flush failed");
            self.closed = true;
            return false;
        }
        true
    }

    async fn emit(&mut self, frame: &str) -> bool {
        self.write(frame) && self.flush().await
    }
}

async fn cancelled(cancel: &mut Option<ShutdownSignal>) {
    match cancel {
        Some(signal) => signal.recv().await,
        None => std::future::pending().await,
    }
}

async fn run<T, S>(mut rx: mpsc::Receiver<Handoff<T>>, sink: S, options: SessionOptions) -> SessionEnd
where
    T: Serialize,
    S: FrameSink,
{
    let mut cancel = options.cancel.clone();
    let mut writer = Writer {
        sink,
        closed: false,
        cancel: options.cancel,
    };

    if !(writer.write(frame::PING) && writer.write(frame::OPENED) && writer.flush().await) {
        return end_early(&writer);
    }

    let mut keep_alive = tokio::time::interval_at(Instant::now() + options.keep_alive, options.keep_alive);
    keep_alive.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let deadline = tokio::time::sleep(options.timeout);
    tokio::pin!(deadline);

    let timed_out = loop {
        tokio::select! {
            biased;

            _ = cancelled(&mut cancel) => return SessionEnd::Cancelled,
            _ = writer.sink.closed() => return SessionEnd::PeerGone,
            _ = &mut deadline => {
                if !writer.emit(frame::TIMEOUT).await {
                    return end_early(&writer);
                }
                break true;
            }
            handoff = rx.recv() => {
                let Some(Handoff { value, ack }) = handoff else {
                    break false;
                };
                let _ = ack.send(());
                match serde_json::to_string(&value) {
                    Ok(json) => {
                        if !writer.emit(&frame::data(&json)).await {
                            return end_early(&writer);
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "Failed to serialize stream event, skipping"),
                }
            }
            _ = keep_alive.tick() => {
                if !writer.emit(frame::PING).await {
                    return end_early(&writer);
                }
            }
        }
    };

    writer.emit(frame::EOF).await;
    writer.emit(frame::CLOSED).await;
    if timed_out {
        SessionEnd::TimedOut
    } else {
        SessionEnd::Drained
    }
}

fn end_early<S: FrameSink>(writer: &Writer<S>) -> SessionEnd {
    if writer.is_cancelled() {
        SessionEnd::Cancelled
    } else {
        SessionEnd::PeerGone
    }
}
