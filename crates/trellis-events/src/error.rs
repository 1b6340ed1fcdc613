//! Routing error types.

use thiserror::Error;
use trellis_core::PluginId;

/// Errors returned to callers of the router.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The recipient is not an active plugin.
    #[error("unknown recipient: {0}")]
    UnknownRecipient(PluginId),

    /// The plugin has no mailbox (it is not active).
    #[error("plugin is not active: {0}")]
    NotActive(PluginId),

    /// The plugin already has a mailbox.
    #[error("plugin is already active: {0}")]
    AlreadyActive(PluginId),

    /// Mailboxes are driven by tokio tasks and need a runtime.
    #[error("no tokio runtime available to drive the mailbox")]
    NoRuntime,

    /// The router's own state is unusable (poisoned lock).
    #[error("router state error: {0}")]
    StateError(String),

    /// The cross-process channel failed.
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Errors from a cross-process notification channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel has been shut down.
    #[error("notification channel closed")]
    Closed,

    /// The transport rejected the envelope.
    #[error("notification transport error: {0}")]
    Transport(String),
}

/// Error returned by an inbound message handler.
///
/// Handler errors are never propagated to the sender; the router reports
/// them to the audit hook and moves on to the next handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    /// Create a handler error with a description.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The description.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Result type for router operations.
pub type RouterResult<T> = Result<T, RouterError>;
