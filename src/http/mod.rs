//! Primary HTTP server.
//!
//! # Data Flow
//! ```text
//! plain HTTP connection (from the demux)
//!     → server.rs (axum serve loop, graceful drain)
//!     → middleware/access_log.rs (one structured line per request)
//!     → tower-http layers (request id, timeout, body limit, trace, CORS)
//!     → module routes / gateway bridge / healthz
//! ```

pub mod middleware;
pub mod server;

pub use server::{HttpServer, HttpServerHandle, HttpShutdownError};
