//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → shipping.rs (batched JSON to a remote collector)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through HTTP logs and gateway metadata
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
pub mod shipping;

pub use metrics::Telemetry;
pub use shipping::{LogShipper, ShippingLayer};
