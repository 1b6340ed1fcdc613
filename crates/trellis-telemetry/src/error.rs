//! Telemetry error types.

use thiserror::Error;

/// Errors that can occur while installing logging.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Invalid level, directive or target.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// A global subscriber is already installed.
    #[error("initialization error: {0}")]
    InitError(String),

    /// IO error.
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
