//! Service kernel binary.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────┐
//!                      │                    SERVICE KERNEL                    │
//!                      │                                                      │
//!   TCP connection     │  ┌─────────┐  RPC   ┌────────────┐                   │
//!   ───────────────────┼─▶│  demux  │───────▶│ rpc server │◀──────┐           │
//!                      │  │ (sniff) │        └────────────┘       │ loopback  │
//!                      │  └────┬────┘                             │ client    │
//!                      │       │ HTTP/1   ┌─────────────┐   ┌─────┴──────┐    │
//!                      │       └─────────▶│ http server │──▶│  gateway   │    │
//!                      │                  │  (router)   │   │  /grpc/**  │    │
//!                      │                  └──────┬──────┘   └────────────┘    │
//!                      │                         │                            │
//!                      │                         ▼                            │
//!                      │                 module routes, /healthz,             │
//!                      │                 event streams                        │
//!                      │                                                      │
//!                      │  lifecycle: PreInit → Init → PostInit → Load → Start │
//!                      │  shutdown:  ready=false → telemetry → log shipper    │
//!                      │             → flush → http drain → Stop → cancel     │
//!                      └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use service_kernel::config::{load_config, ConfigWatcher, KernelConfig};
use service_kernel::kernel::{ExitReason, Kernel};
use service_kernel::lifecycle::signals::{spawn_reload_on_hangup, wait_for_termination};
use service_kernel::modules;
use service_kernel::net::Listener;
use service_kernel::observability::{logging, LogShipper, Telemetry};

#[derive(Parser, Debug)]
#[command(name = "service-kernel", version, about = "Service runtime kernel")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("failed to load config {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => KernelConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    let (shipper, shipping_layer) = match LogShipper::start(&config.log_shipping) {
        Ok(Some((shipper, layer))) => (Some(shipper), Some(layer)),
        Ok(None) => (None, None),
        Err(e) => {
            eprintln!("failed to start log shipping: {e}");
            (None, None)
        }
    };

    if let Err(e) = logging::init(&config, shipping_layer) {
        eprintln!("failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "service-kernel starting");

    let telemetry = match Telemetry::start(&config.observability) {
        Ok(telemetry) => telemetry,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start metrics exporter");
            None
        }
    };

    let mut kernel = Kernel::new(config.clone())
        .with_telemetry(telemetry)
        .with_log_shipper(shipper);
    for module in modules::registry() {
        kernel.register(module);
    }

    if let Err(e) = kernel.start() {
        tracing::error!(module = %e.module, stage = %e.stage, error = %e.source, "Startup aborted");
        logging::flush();
        return ExitCode::FAILURE;
    }

    // Kept alive for the life of the process.
    let _watcher = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            spawn_reload_on_hangup(path.clone(), watcher.sender());
            tokio::spawn(kernel.config_updater().run(updates));
            match watcher.run() {
                Ok(w) => Some(w),
                Err(e) => {
                    tracing::warn!(error = %e, "Config watcher unavailable, reload on SIGHUP only");
                    None
                }
            }
        }
        None => None,
    };

    let listener = match Listener::bind(&config.listener).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, address = %config.listener.bind_address, "Failed to bind");
            kernel.shutdown().await;
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = kernel.serve(listener) {
        tracing::error!(error = %e, "Failed to start serving");
        kernel.shutdown().await;
        return ExitCode::FAILURE;
    }

    let reason = kernel.run_until(wait_for_termination()).await;
    let report = kernel.shutdown().await;
    tracing::info!(?report, "Shutdown complete");

    match reason {
        ExitReason::Signal => ExitCode::SUCCESS,
        ExitReason::ListenerFailed(_) => ExitCode::FAILURE,
    }
}
