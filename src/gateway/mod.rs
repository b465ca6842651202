//! HTTP-to-RPC gateway.
//!
//! # Data Flow
//! ```text
//! GET /grpc/v1/books/7?x=1
//!     → bridge.rs (strip "/grpc", keep query)
//!     → mux.rs (routes.rs lookup, build message, headers.rs metadata)
//!     → RpcClient over the shared socket
//!     → envelope.rs ({"data": ...} or {"code", "message", "error"})
//! ```
//!
//! # Design Decisions
//! - Bindings are collected while modules register services; the bridge is
//!   mounted once, after every module has started
//! - Unknown RPC codes answer 500 with the raw code in the envelope

pub mod bridge;
pub mod envelope;
pub mod headers;
pub mod mux;
pub mod routes;

pub use bridge::mount;
pub use envelope::{error_response, success_response, ErrorEnvelope};
pub use headers::HeaderMatcher;
pub use mux::GatewayMux;
pub use routes::{PathTemplate, RouteMatch, RoutingTable, TemplateError};
