//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global subscriber once at startup
//! - Pick level and format from config, with `RUST_LOG` taking precedence
//! - Attach the remote shipping layer when enabled
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - Debug run mode forces debug level

use std::io::Write;

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::{KernelConfig, LogFormat};
use crate::observability::shipping::ShippingLayer;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),
    #[error("logging already initialized: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// The filter directive for a config, before `RUST_LOG` is consulted.
pub fn default_directive(config: &KernelConfig) -> String {
    let level = if config.is_debug() {
        "debug"
    } else {
        config.observability.log_level.as_str()
    };
    format!("{level},hyper=info,h2=info,tower_http={level}")
}

/// Install the global subscriber.
pub fn init(config: &KernelConfig, shipping: Option<ShippingLayer>) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive(config))?,
    };

    let console: Box<dyn Layer<Registry> + Send + Sync> = match config.observability.log_format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer().with_target(true).boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(false)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(shipping)
        .with(filter)
        .try_init()?;

    Ok(())
}

/// Flush buffered console output.
pub fn flush() {
    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();
}
