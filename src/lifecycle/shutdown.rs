//! Shutdown coordination for the kernel.
//!
//! # Shutdown Sequence
//! ```text
//! signal ─▶ readiness=false ─▶ telemetry stop ─▶ log shipper close ─▶ flush logs
//!       ─▶ HTTP graceful drain (bounded) ─▶ module stop (same deadline) ─▶ root cancel
//! ```
//!
//! Root cancellation is what releases everything still running: the demux
//! accept loop, the RPC server and every open streaming session.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::health::Readiness;
use crate::http::HttpServerHandle;
use crate::kernel::module::Module;
use crate::lifecycle::stop::{stop_modules, StopContext};
use crate::observability::logging;
use crate::observability::metrics::Telemetry;
use crate::observability::shipping::LogShipper;

/// The root cancellation context.
///
/// Every long-running task subscribes; triggering is permanent.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: std::sync::Arc<watch::Sender<bool>>,
}

impl Shutdown {
    /// Create a new, untriggered root context.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            tx: std::sync::Arc::new(tx),
        }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Trigger the shutdown signal. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Get the number of active subscribers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// A subscription to the root context.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolves once shutdown has been triggered.
    ///
    /// Pending forever if the root context is dropped without triggering.
    pub async fn recv(&mut self) {
        if self.rx.wait_for(|triggered| *triggered).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }
}

/// What the shutdown sequence managed to do in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// The HTTP server drained before the deadline.
    pub http_graceful: bool,
    /// Every module released its stop guard before the deadline.
    pub modules_stopped: bool,
    /// The log shipping client flushed and closed cleanly.
    pub log_shipper_closed: bool,
}

/// Runs the ordered shutdown sequence once.
///
/// Every step is best-effort; a failing step is logged and the next one runs.
pub struct ShutdownCoordinator<'a> {
    pub readiness: Readiness,
    pub telemetry: Option<Telemetry>,
    pub log_shipper: Option<LogShipper>,
    pub http_server: Option<HttpServerHandle>,
    pub modules: &'a mut [Box<dyn Module>],
    pub root: Shutdown,
}

impl ShutdownCoordinator<'_> {
    pub async fn run(self, timeout: Duration) -> ShutdownReport {
        let mut report = ShutdownReport::default();

        tracing::info!("Shutting down server");
        self.readiness.set(false);

        if let Some(telemetry) = self.telemetry {
            telemetry.stop();
        }

        match self.log_shipper {
            Some(shipper) => match shipper.close().await {
                Ok(()) => report.log_shipper_closed = true,
                Err(e) => tracing::warn!(error = %e, "Log shipping client close failed"),
            },
            None => report.log_shipper_closed = true,
        }

        logging::flush();

        let deadline = Instant::now() + timeout;

        match self.http_server {
            Some(server) => match server.shutdown_until(deadline).await {
                Ok(()) => report.http_graceful = true,
                Err(e) => tracing::warn!(error = %e, "Server forced to shutdown"),
            },
            None => report.http_graceful = true,
        }

        let stop_ctx = StopContext::new(deadline, self.root.subscribe());
        report.modules_stopped = stop_modules(self.modules, stop_ctx).await;

        self.root.trigger();
        tracing::info!(
            http_graceful = report.http_graceful,
            modules_stopped = report.modules_stopped,
            "Server exiting"
        );

        report
    }
}
