//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the kernel.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the service kernel.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct KernelConfig {
    /// Run mode. `debug` forces debug-level logging.
    pub mode: RunMode,

    /// Shared socket settings.
    pub listener: ListenerConfig,

    /// HTTP-to-RPC gateway settings.
    pub gateway: GatewayConfig,

    /// RPC server settings.
    pub rpc: RpcConfig,

    /// Primary HTTP router settings.
    pub http: HttpConfig,

    /// Server-push session defaults.
    pub streaming: StreamingConfig,

    /// Shutdown settings.
    pub shutdown: ShutdownConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Remote log shipping.
    pub log_shipping: LogShippingConfig,
}

impl KernelConfig {
    /// Returns true when the kernel runs in debug mode.
    pub fn is_debug(&self) -> bool {
        self.mode == RunMode::Debug
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Debug,
    #[default]
    Release,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// How long a new connection may take to reveal its protocol.
    pub sniff_timeout_ms: u64,

    /// Upper bound on bytes buffered while classifying a connection.
    pub max_sniff_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
            sniff_timeout_ms: 5_000,
            max_sniff_bytes: 16 * 1024,
        }
    }
}

/// Gateway bridge configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Path prefix the bridge is mounted under (e.g., "/grpc").
    pub prefix: String,

    /// Inbound HTTP headers copied into RPC call metadata.
    pub incoming_headers: Vec<String>,

    /// RPC response metadata copied back into HTTP response headers.
    pub outgoing_headers: Vec<String>,

    /// Serve `<prefix>/healthz` through the RPC health service.
    pub healthz: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            prefix: "/grpc".to_string(),
            incoming_headers: vec![
                "authorization".to_string(),
                "x-request-id".to_string(),
                "user-agent".to_string(),
                "x-forwarded-for".to_string(),
                "accept-language".to_string(),
            ],
            outgoing_headers: vec!["x-request-id".to_string()],
            healthz: true,
        }
    }
}

/// RPC server configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RpcConfig {
    /// Largest accepted request message in bytes.
    pub max_message_bytes: usize,

    /// Concurrent HTTP/2 streams per connection; unset keeps tonic's default.
    pub max_concurrent_streams: Option<u32>,

    /// HTTP/2 keepalive ping interval.
    pub keepalive_interval_secs: Option<u64>,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: 4 * 1024 * 1024,
            max_concurrent_streams: None,
            keepalive_interval_secs: None,
        }
    }
}

/// Primary HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    /// Time allowed to produce a response head, in seconds.
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Enable permissive CORS with credentials.
    pub cors: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            max_body_bytes: 2 * 1024 * 1024,
            cors: true,
        }
    }
}

/// Streaming session defaults.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StreamingConfig {
    /// Interval between keep-alive ping frames, in seconds.
    pub keep_alive_secs: u64,

    /// Absolute session lifetime, in seconds.
    pub session_timeout_secs: u64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            keep_alive_secs: 10,
            session_timeout_secs: 3600,
        }
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Deadline for draining the HTTP server and stopping modules, in seconds.
    pub timeout_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { timeout_secs: 5 }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Output format for the console logger.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Remote log shipping configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LogShippingConfig {
    pub enabled: bool,

    /// Collector URL receiving JSON arrays of log records.
    pub endpoint: String,

    /// Records per batch.
    pub batch_size: usize,

    /// Maximum time a partial batch waits before being sent.
    pub flush_interval_ms: u64,

    /// Time allowed for the final flush on close.
    pub close_timeout_ms: u64,
}

impl Default for LogShippingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            batch_size: 128,
            flush_interval_ms: 1_000,
            close_timeout_ms: 2_000,
        }
    }
}
