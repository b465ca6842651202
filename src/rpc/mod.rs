//! RPC subsystem.
//!
//! Unary calls served and made with tonic. Messages are JSON instead of
//! protobuf; framing, status trailers and metadata are tonic's.
//!
//! # Data Flow
//! ```text
//! demux rpc listener ─▶ server.rs (tonic Server) ─▶ codec.rs ─▶ handler
//!                                       ▲
//! gateway ─▶ client.rs (loopback) ──────┘ via the shared socket
//! ```

pub mod client;
pub mod codec;
pub mod server;
pub mod service;
pub mod status;

pub use client::RpcClient;
pub use codec::JsonCodec;
pub use server::RpcServer;
pub use service::{BodyRule, HttpRule, MethodDefinition, ServiceDefinition};
pub use status::{http_status_from_code, status_from_code, status_with_details, StatusExt};
pub use tonic::{Code, Status};
