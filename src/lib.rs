//! Service runtime kernel.
//!
//! One TCP socket serving both RPC and plain HTTP, a staged module
//! lifecycle, an HTTP-to-RPC gateway, server-push sessions and an ordered
//! shutdown.

pub mod config;
pub mod gateway;
pub mod health;
pub mod http;
pub mod kernel;
pub mod lifecycle;
pub mod modules;
pub mod net;
pub mod observability;
pub mod rpc;
pub mod stream;

pub use config::schema::KernelConfig;
pub use kernel::{Kernel, Module, RuntimeContext};
pub use lifecycle::Shutdown;
