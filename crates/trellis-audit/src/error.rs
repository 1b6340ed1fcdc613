//! Audit-related error types.

use thiserror::Error;

/// Errors that can occur while reading or exporting the audit stream.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The in-memory log's lock was poisoned by a panicking writer.
    #[error("audit log unavailable: {0}")]
    Unavailable(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),
}

/// Result type for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;
