//! Feature modules shipped with the kernel.

pub mod ping;

use crate::kernel::Module;

/// Modules in dependency order.
pub fn registry() -> Vec<Box<dyn Module>> {
    vec![Box::new(ping::PingModule::new())]
}
