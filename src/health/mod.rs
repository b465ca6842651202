//! Health reporting subsystem.
//!
//! # Data Flow
//! ```text
//! kernel startup done ─▶ Readiness = true
//! shutdown begins     ─▶ Readiness = false
//!
//! GET /healthz                       → readiness.rs (200 / 503)
//! grpc.health.v1.Health/Check        → service.rs (SERVING / NOT_SERVING)
//! GET <gateway prefix>/healthz       → gateway → Health/Check over loopback
//! ```
//!
//! # Design Decisions
//! - One flag drives every health surface, so they never disagree
//! - Not ready until every module has started and all listeners are serving

pub mod readiness;
pub mod service;

pub use readiness::{healthz, Readiness};
pub use service::{health_service, HealthCheckResponse, ServingStatus};
