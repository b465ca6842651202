//! The feature-module contract.

use std::sync::Arc;

use thiserror::Error;

use crate::config::KernelConfig;
use crate::gateway::TemplateError;
use crate::kernel::context::RuntimeContext;
use crate::lifecycle::stop::{StopContext, StopGuard};

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Route(#[from] TemplateError),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ModuleError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

/// Runs with every new configuration snapshot.
pub type ConfigHook = Arc<dyn Fn(&KernelConfig) -> Result<(), ModuleError> + Send + Sync>;

/// A unit of features driven through the lifecycle stages.
///
/// Stage methods are synchronous and may only touch the context while they
/// run; long-running work is spawned. Every stage defaults to a no-op.
pub trait Module: Send {
    fn name(&self) -> &str;

    fn pre_init(&mut self, _ctx: &mut RuntimeContext) -> Result<(), ModuleError> {
        Ok(())
    }

    fn init(&mut self, _ctx: &mut RuntimeContext) -> Result<(), ModuleError> {
        Ok(())
    }

    fn post_init(&mut self, _ctx: &mut RuntimeContext) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Register routes and RPC services here.
    fn load(&mut self, _ctx: &mut RuntimeContext) -> Result<(), ModuleError> {
        Ok(())
    }

    fn start(&mut self, _ctx: &mut RuntimeContext) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Release resources. The guard must be released when the module is done,
    /// which dropping it does. May run even if startup never reached this module.
    fn stop(&mut self, done: StopGuard, _ctx: StopContext) -> Result<(), ModuleError> {
        drop(done);
        Ok(())
    }

    /// Bound once, at registration.
    fn on_config_change(&self) -> Option<ConfigHook> {
        None
    }
}
