//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check cross-field constraints (keep-alive shorter than session timeout)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: KernelConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::HeaderName;
use thiserror::Error;

use crate::config::schema::KernelConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a configuration, collecting every error found.
pub fn validate_config(config: &KernelConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be > 0"));
    }
    if config.listener.sniff_timeout_ms == 0 {
        errors.push(ValidationError::new("listener.sniff_timeout_ms", "must be > 0"));
    }
    // Needs room for the HTTP/2 preface plus one frame header.
    if config.listener.max_sniff_bytes < 64 {
        errors.push(ValidationError::new("listener.max_sniff_bytes", "must be >= 64"));
    }

    let prefix = &config.gateway.prefix;
    if !prefix.starts_with('/') || prefix == "/" || prefix.ends_with('/') {
        errors.push(ValidationError::new(
            "gateway.prefix",
            format!("'{}' must start with '/', be non-root and have no trailing '/'", prefix),
        ));
    }
    for name in config
        .gateway
        .incoming_headers
        .iter()
        .chain(config.gateway.outgoing_headers.iter())
    {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                "gateway.headers",
                format!("'{}' is not a valid header name", name),
            ));
        }
    }

    if config.rpc.max_message_bytes == 0 {
        errors.push(ValidationError::new("rpc.max_message_bytes", "must be > 0"));
    }
    if config.rpc.max_concurrent_streams == Some(0) {
        errors.push(ValidationError::new("rpc.max_concurrent_streams", "must be > 0"));
    }
    if config.rpc.keepalive_interval_secs == Some(0) {
        errors.push(ValidationError::new("rpc.keepalive_interval_secs", "must be > 0"));
    }
    if config.http.request_timeout_secs == 0 {
        errors.push(ValidationError::new("http.request_timeout_secs", "must be > 0"));
    }

    let streaming = &config.streaming;
    if streaming.keep_alive_secs == 0 {
        errors.push(ValidationError::new("streaming.keep_alive_secs", "must be > 0"));
    }
    if streaming.keep_alive_secs >= streaming.session_timeout_secs {
        errors.push(ValidationError::new(
            "streaming.session_timeout_secs",
            "must be greater than keep_alive_secs",
        ));
    }

    if config.shutdown.timeout_secs == 0 {
        errors.push(ValidationError::new("shutdown.timeout_secs", "must be > 0"));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    let shipping = &config.log_shipping;
    if shipping.enabled {
        if shipping.endpoint.is_empty() {
            errors.push(ValidationError::new("log_shipping.endpoint", "required when enabled"));
        }
        if shipping.batch_size == 0 {
            errors.push(ValidationError::new("log_shipping.batch_size", "must be > 0"));
        }
        if shipping.flush_interval_ms == 0 {
            errors.push(ValidationError::new("log_shipping.flush_interval_ms", "must be > 0"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&KernelConfig::default()), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = KernelConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.gateway.prefix = "grpc/".into();
        config.streaming.keep_alive_secs = 3600;
        config.log_shipping.enabled = true;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "gateway.prefix",
                "streaming.session_timeout_secs",
                "log_shipping.endpoint",
            ]
        );
    }

    #[test]
    fn rejects_root_prefix_and_bad_header() {
        let mut config = KernelConfig::default();
        config.gateway.prefix = "/".into();
        config.gateway.incoming_headers.push("bad header".into());

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn zero_rpc_tuning_is_rejected() {
        let mut config = KernelConfig::default();
        config.rpc.max_concurrent_streams = Some(0);
        config.rpc.keepalive_interval_secs = Some(0);

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec!["rpc.max_concurrent_streams", "rpc.keepalive_interval_secs"]
        );
    }
}
