//! OS signal handling.
//!
//! # Responsibilities
//! - SIGTERM / SIGINT resolve the termination wait
//! - SIGHUP triggers a config reload, never a shutdown
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Only the first termination signal matters; the sequence runs once

use std::path::PathBuf;

use tokio::sync::mpsc::UnboundedSender;

use crate::config::watcher::reload_into;
use crate::config::KernelConfig;

/// Resolves on the first SIGINT or SIGTERM.
pub async fn wait_for_termination() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => tracing::info!(signal = "SIGINT", "Termination signal received"),
                    _ = term.recv() => tracing::info!(signal = "SIGTERM", "Termination signal received"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler, falling back to Ctrl-C");
                ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c().await;
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!(signal = "SIGINT", "Termination signal received");
}

/// Reload the config file on every SIGHUP and publish it to `tx`.
#[cfg(unix)]
pub fn spawn_reload_on_hangup(path: PathBuf, tx: UnboundedSender<KernelConfig>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install SIGHUP handler");
            return;
        }
    };

    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            tracing::info!(path = %path.display(), "SIGHUP received, reloading config");
            reload_into(&path, &tx);
        }
    });
}

#[cfg(not(unix))]
pub fn spawn_reload_on_hangup(_path: PathBuf, _tx: UnboundedSender<KernelConfig>) {}
