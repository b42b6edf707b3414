//! Tracing subscriber setup for the host process.
//!
//! This is the operator-facing diagnostic channel. Records shipped to the
//! log-aggregation endpoint go through [`crate::logs`] instead.

use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Console output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl LogFormat {
    /// Parse `TELEMETRY_LOG_FORMAT`; anything unrecognised is `Pretty`.
    pub fn from_env() -> Self {
        match std::env::var("TELEMETRY_LOG_FORMAT").as_deref() {
            Ok("json") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

#[derive(Debug, Error)]
pub enum LogInitError {
    #[error("invalid log filter: {0}")]
    InvalidFilter(String),
    #[error("subscriber already initialized")]
    AlreadyInitialized,
}

/// Install the global subscriber. `RUST_LOG` wins over `default_level`.
pub fn init_logging(format: LogFormat, default_level: &str) -> Result<(), LogInitError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_level)
            .map_err(|e| LogInitError::InvalidFilter(e.to_string()))?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json())
            .try_init()
            .map_err(|_| LogInitError::AlreadyInitialized),
        LogFormat::Pretty => registry
            .with(fmt::layer().compact())
            .try_init()
            .map_err(|_| LogInitError::AlreadyInitialized),
    }
}
