//! The service kernel.
//!
//! # Data Flow
//! ```text
//! register modules (config hooks bound once)
//!     → start(): PreInit → Init → PostInit → Load → Start, all modules per stage
//!     → serve(): demux split → RPC loop, HTTP server, accept loop → ready
//!     → run_until(signal)
//!     → shutdown(): coordinator, then root cancel
//! ```
//!
//! # Design Decisions
//! - The context is an explicit object passed to each stage, never a global
//! - A stage failure is returned as a value; the binary decides to exit
//! - Only the accept loop failing is fatal; the two servers just log

pub mod context;
pub mod module;
pub mod reload;

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::config::KernelConfig;
use crate::http::HttpServer;
use crate::lifecycle::shutdown::{ShutdownCoordinator, ShutdownReport};
use crate::lifecycle::startup::{run_lifecycle, StartupError};
use crate::net::{Demux, Listener, ListenerError};
use crate::observability::{LogShipper, Telemetry};

pub use context::RuntimeContext;
pub use module::{ConfigHook, Module, ModuleError};
pub use reload::ConfigUpdater;

/// Why the kernel stopped waiting.
#[derive(Debug)]
pub enum ExitReason {
    /// Termination was requested.
    Signal,
    /// The accept loop died; the socket is unusable.
    ListenerFailed(String),
}

pub struct Kernel {
    ctx: RuntimeContext,
    modules: Vec<Box<dyn Module>>,
    telemetry: Option<Telemetry>,
    log_shipper: Option<LogShipper>,
    demux: Option<JoinHandle<Result<(), ListenerError>>>,
    local_addr: Option<SocketAddr>,
}

impl Kernel {
    pub fn new(config: KernelConfig) -> Self {
        Self {
            ctx: RuntimeContext::new(config),
            modules: Vec::new(),
            telemetry: None,
            log_shipper: None,
            demux: None,
            local_addr: None,
        }
    }

    /// Add a module. Registration order is stage order.
    pub fn register(&mut self, module: Box<dyn Module>) {
        if let Some(hook) = module.on_config_change() {
            self.ctx.add_config_hook(module.name(), hook);
        }
        tracing::debug!(module = module.name(), "Module registered");
        self.modules.push(module);
    }

    pub fn with_telemetry(mut self, telemetry: Option<Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_log_shipper(mut self, shipper: Option<LogShipper>) -> Self {
        self.log_shipper = shipper;
        self
    }

    pub fn context(&self) -> &RuntimeContext {
        &self.ctx
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Applies reloaded configuration to the live snapshot and the modules.
    pub fn config_updater(&self) -> ConfigUpdater {
        ConfigUpdater::new(self.ctx.live_config(), self.ctx.config_hooks())
    }

    /// Run every startup stage over every module.
    pub fn start(&mut self) -> Result<(), StartupError> {
        run_lifecycle(&mut self.modules, &mut self.ctx)
    }

    /// Start the three serving loops on the shared socket and mark ready.
    pub fn serve(&mut self, listener: Listener) -> std::io::Result<SocketAddr> {
        let config = self.ctx.config();
        let (demux, rpc_listener, http_listener) = Demux::split(listener, &config.listener)?;
        let addr = demux.local_addr()?;

        self.ctx.rpc_client().retarget(addr);

        let rpc = self.ctx.rpc_server().clone();
        tokio::spawn(rpc.serve(rpc_listener, self.ctx.shutdown_signal()));

        let app = self.ctx.build_app();
        let server = HttpServer::new(app, &config.http).spawn(http_listener);
        self.ctx.set_http_server(server);

        self.demux = Some(tokio::spawn(demux.serve(self.ctx.shutdown_signal())));
        self.local_addr = Some(addr);
        self.ctx.readiness().set(true);

        tracing::info!(
            bind = %config.listener.bind_address,
            address = %addr,
            loopback = %self.ctx.rpc_client().target(),
            gateway = %config.gateway.prefix,
            modules = self.modules.len(),
            "Service kernel ready"
        );
        Ok(addr)
    }

    /// Wait for `signal`, or for the accept loop to die.
    pub async fn run_until<F>(&mut self, signal: F) -> ExitReason
    where
        F: Future<Output = ()>,
    {
        let Some(demux) = self.demux.as_mut() else {
            signal.await;
            return ExitReason::Signal;
        };

        let finished = tokio::select! {
            _ = signal => None,
            res = demux => Some(res),
        };

        match finished {
            None => ExitReason::Signal,
            Some(res) => {
                self.demux = None;
                let reason = match res {
                    Ok(Ok(())) => "accept loop exited".to_string(),
                    Ok(Err(e)) => e.to_string(),
                    Err(join) => join.to_string(),
                };
                tracing::error!(error = %reason, "Listener failed");
                ExitReason::ListenerFailed(reason)
            }
        }
    }

    /// Run the shutdown sequence, then stop the modules and cancel the root.
    pub async fn shutdown(self) -> ShutdownReport {
        let Kernel {
            mut ctx,
            mut modules,
            telemetry,
            log_shipper,
            demux,
            ..
        } = self;

        let timeout = Duration::from_secs(ctx.config().shutdown.timeout_secs);
        let report = ShutdownCoordinator {
            readiness: ctx.readiness(),
            telemetry,
            log_shipper,
            http_server: ctx.take_http_server(),
            modules: &mut modules,
            root: ctx.root().clone(),
        }
        .run(timeout)
        .await;

        if let Some(demux) = demux {
            if let Ok(Ok(Err(e))) = tokio::time::timeout(Duration::from_secs(1), demux).await {
                tracing::warn!(error = %e, "Accept loop ended with error");
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ListenerConfig;
    use crate::lifecycle::stop::{StopContext, StopGuard};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct Flagged {
        stopped: Arc<AtomicBool>,
    }

    impl Module for Flagged {
        fn name(&self) -> &str {
            "flagged"
        }

        fn stop(&mut self, done: StopGuard, _ctx: StopContext) -> Result<(), ModuleError> {
            self.stopped.store(true, Ordering::SeqCst);
            done.done();
            Ok(())
        }
    }

    fn test_config() -> KernelConfig {
        let mut config = KernelConfig::default();
        config.listener = ListenerConfig {
            bind_address: "127.0.0.1:0".into(),
            ..ListenerConfig::default()
        };
        config.shutdown.timeout_secs = 2;
        config
    }

    #[tokio::test]
    async fn serve_then_shutdown() {
        let config = test_config();
        let stopped = Arc::new(AtomicBool::new(false));
        let mut kernel = Kernel::new(config.clone());
        kernel.register(Box::new(Flagged {
            stopped: stopped.clone(),
        }));

        kernel.start().unwrap();
        let listener = Listener::bind(&config.listener).await.unwrap();
        let addr = kernel.serve(listener).unwrap();

        assert_eq!(kernel.local_addr(), Some(addr));
        assert!(kernel.context().readiness().is_ready());
        assert_eq!(kernel.context().rpc_client().target(), addr);

        let reason = kernel.run_until(async {}).await;
        assert!(matches!(reason, ExitReason::Signal));

        let readiness = kernel.context().readiness();
        let root = kernel.context().root().clone();
        let report = kernel.shutdown().await;

        assert!(report.http_graceful);
        assert!(report.modules_stopped);
        assert!(stopped.load(Ordering::SeqCst));
        assert!(!readiness.is_ready());
        assert!(root.is_triggered());
    }
}
