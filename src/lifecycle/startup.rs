//! Startup orchestration.
//!
//! # Responsibilities
//! - Drive every registered module through the startup stages
//! - Stage-major order: all modules finish a stage before any enters the next
//! - Within a stage, modules run in registration order
//!
//! # Design Decisions
//! - Fail fast: the first error aborts startup and names the module and stage
//! - Nothing is rolled back; the process is expected to exit

use thiserror::Error;

use crate::kernel::context::RuntimeContext;
use crate::kernel::module::{Module, ModuleError};
use crate::lifecycle::stage::LifecycleStage;

/// A module failed to start.
#[derive(Debug, Error)]
#[error("module '{module}' failed during {stage}: {source}")]
pub struct StartupError {
    pub module: String,
    pub stage: LifecycleStage,
    #[source]
    pub source: ModuleError,
}

/// Run the startup stages over all modules.
pub fn run_lifecycle(
    modules: &mut [Box<dyn Module>],
    ctx: &mut RuntimeContext,
) -> Result<(), StartupError> {
    for stage in LifecycleStage::STARTUP {
        tracing::debug!(stage = %stage, modules = modules.len(), "Entering lifecycle stage");

        for module in modules.iter_mut() {
            if let Err(source) = enter(stage, module.as_mut(), ctx) {
                tracing::error!(
                    module = module.name(),
                    stage = %stage,
                    error = %source,
                    "Lifecycle stage failed"
                );
                return Err(StartupError {
                    module: module.name().to_string(),
                    stage,
                    source,
                });
            }
        }
    }

    tracing::info!(modules = modules.len(), "All modules started");
    Ok(())
}

fn enter(
    stage: LifecycleStage,
    module: &mut dyn Module,
    ctx: &mut RuntimeContext,
) -> Result<(), ModuleError> {
    match stage {
        LifecycleStage::PreInit => module.pre_init(ctx),
        LifecycleStage::Init => module.init(ctx),
        LifecycleStage::PostInit => module.post_init(ctx),
        LifecycleStage::Load => module.load(ctx),
        LifecycleStage::Start => module.start(ctx),
        // Stop needs a guard and a deadline; see lifecycle::stop.
        LifecycleStage::Stop => Err(ModuleError::msg("stop is not a startup stage")),
    }
}
