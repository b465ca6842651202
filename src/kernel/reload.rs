//! Applying hot-reloaded configuration.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::mpsc;

use crate::config::KernelConfig;
use crate::kernel::module::ConfigHook;

/// Swaps the live snapshot and runs every module's hook.
#[derive(Clone)]
pub struct ConfigUpdater {
    live: Arc<ArcSwap<KernelConfig>>,
    hooks: Arc<[(String, ConfigHook)]>,
}

impl ConfigUpdater {
    pub(crate) fn new(live: Arc<ArcSwap<KernelConfig>>, hooks: &[(String, ConfigHook)]) -> Self {
        Self {
            live,
            hooks: hooks.iter().cloned().collect(),
        }
    }

    /// Publish `config`, then notify modules. Hook failures are logged only.
    pub fn apply(&self, config: KernelConfig) {
        let config = Arc::new(config);
        self.live.store(config.clone());
        tracing::info!(hooks = self.hooks.len(), "Configuration reloaded");

        for (module, hook) in self.hooks.iter() {
            if let Err(e) = hook(&config) {
                tracing::warn!(module = %module, error = %e, "Config hook failed");
            }
        }
    }

    /// Apply every snapshot from the watcher until it goes away.
    pub async fn run(self, mut updates: mpsc::UnboundedReceiver<KernelConfig>) {
        while let Some(config) = updates.recv().await {
            self.apply(config);
        }
        tracing::debug!("Config update channel closed");
    }
}
