//! Core error types.

use thiserror::Error;

/// Errors raised while constructing core values from untrusted input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The plugin identifier is malformed.
    #[error("invalid plugin id: {0}")]
    InvalidPluginId(String),

    /// The capability name is not one the host knows about.
    #[error("unknown capability: {0}")]
    UnknownCapability(String),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
