//! Lifecycle stages a module passes through.

use std::fmt;

/// One phase of a module's life.
///
/// Startup walks the first five in order; `Stop` is driven separately by the
/// shutdown sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleStage {
    PreInit,
    Init,
    PostInit,
    Load,
    Start,
    Stop,
}

impl LifecycleStage {
    /// Startup stages in execution order.
    pub const STARTUP: [LifecycleStage; 5] = [
        LifecycleStage::PreInit,
        LifecycleStage::Init,
        LifecycleStage::PostInit,
        LifecycleStage::Load,
        LifecycleStage::Start,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStage::PreInit => "pre_init",
            LifecycleStage::Init => "init",
            LifecycleStage::PostInit => "post_init",
            LifecycleStage::Load => "load",
            LifecycleStage::Start => "start",
            LifecycleStage::Stop => "stop",
        }
    }
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
