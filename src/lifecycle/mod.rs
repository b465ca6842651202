//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     PreInit → Init → PostInit → Load → Start, each across all modules
//!
//! Shutdown (shutdown.rs):
//!     Signal received → readiness off → drain HTTP → stop modules → root cancel
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Trigger config reload
//! ```
//!
//! # Design Decisions
//! - Ordered startup: a failing stage is fatal
//! - Shutdown has timeout: HTTP drain and module stop share one deadline

pub mod shutdown;
pub mod signals;
pub mod stage;
pub mod startup;
pub mod stop;

pub use shutdown::{Shutdown, ShutdownCoordinator, ShutdownReport, ShutdownSignal};
pub use stage::LifecycleStage;
pub use startup::{run_lifecycle, StartupError};
pub use stop::{StopContext, StopGroup, StopGuard};
