//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define kernel metrics (connections, requests, gateway calls, sessions)
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `kernel_connections_total` (counter): accepted connections by class
//! - `kernel_http_requests_total` (counter): HTTP requests by method, status
//! - `kernel_http_request_duration_seconds` (histogram): HTTP latency
//! - `kernel_rpc_calls_total` (counter): RPC calls by method, code
//! - `kernel_gateway_calls_total` (counter): bridged calls by HTTP status
//! - `kernel_streaming_sessions_active` (gauge): open server-push sessions
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed
//! - The exporter runs as one task, stopped first during shutdown

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::ObservabilityConfig;

pub fn record_connection(class: &'static str) {
    metrics::counter!("kernel_connections_total", "class" => class).increment(1);
}

pub fn record_http_request(method: &str, status: u16, start: Instant) {
    let method = method.to_string();
    let status = status.to_string();
    metrics::counter!("kernel_http_requests_total", "method" => method.clone(), "status" => status.clone())
        .increment(1);
    metrics::histogram!("kernel_http_request_duration_seconds", "method" => method, "status" => status)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rpc_call(method: &str, code: i32) {
    metrics::counter!("kernel_rpc_calls_total", "method" => method.to_string(), "code" => code.to_string())
        .increment(1);
}

pub fn record_gateway_call(status: u16) {
    metrics::counter!("kernel_gateway_calls_total", "status" => status.to_string()).increment(1);
}

pub fn session_opened() {
    metrics::gauge!("kernel_streaming_sessions_active").increment(1.0);
}

pub fn session_closed() {
    metrics::gauge!("kernel_streaming_sessions_active").decrement(1.0);
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid metrics address '{0}'")]
    Address(String),
    #[error("failed to build metrics exporter: {0}")]
    Build(#[from] metrics_exporter_prometheus::BuildError),
    #[error("failed to install metrics recorder: {0}")]
    Install(String),
}

/// The running metrics exporter.
#[derive(Debug)]
pub struct Telemetry {
    address: SocketAddr,
    exporter: JoinHandle<()>,
}

impl Telemetry {
    /// Install the global recorder and start serving the scrape endpoint.
    ///
    /// Returns `None` when metrics are disabled.
    pub fn start(config: &ObservabilityConfig) -> Result<Option<Telemetry>, TelemetryError> {
        if !config.metrics_enabled {
            return Ok(None);
        }

        let address: SocketAddr = config
            .metrics_address
            .parse()
            .map_err(|_| TelemetryError::Address(config.metrics_address.clone()))?;

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(address)
            .build()?;
        metrics::set_global_recorder(recorder).map_err(|e| TelemetryError::Install(e.to_string()))?;

        let exporter = tokio::spawn(async move {
            if let Err(e) = exporter.await {
                tracing::error!(error = ?e, "Metrics exporter failed");
            }
        });

        tracing::info!(address = %address, "Metrics endpoint started");
        Ok(Some(Telemetry { address, exporter }))
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Stop serving the scrape endpoint.
    pub fn stop(self) {
        self.exporter.abort();
        tracing::info!(address = %self.address, "Metrics endpoint stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_metrics_start_nothing() {
        let config = ObservabilityConfig::default();
        assert!(Telemetry::start(&config).unwrap().is_none());
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_connection("http");
        record_http_request("GET", 200, Instant::now());
        record_rpc_call("/ping.v1.PingService/Ping", 0);
        record_gateway_call(404);
        session_opened();
        session_closed();
    }

    #[test]
    fn bad_address_is_rejected() {
        let config = ObservabilityConfig {
            metrics_enabled: true,
            metrics_address: "nowhere".into(),
            ..ObservabilityConfig::default()
        };
        assert!(matches!(Telemetry::start(&config), Err(TelemetryError::Address(_))));
    }
}
