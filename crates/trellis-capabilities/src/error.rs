//! Capability error types.

use thiserror::Error;
use trellis_core::{Capability, PluginId};

/// Errors from permission ledger operations.
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// The capability is not in the plugin's requested set.
    #[error("plugin '{plugin_id}' did not request capability '{capability}'")]
    UnrequestedCapability {
        /// The plugin the grant was attempted for.
        plugin_id: PluginId,
        /// The capability that was not requested.
        capability: Capability,
    },

    /// The plugin has never been declared to the ledger.
    #[error("plugin not known to the ledger: {0}")]
    UnknownPlugin(PluginId),

    /// The ledger's own state is unusable (poisoned lock).
    #[error("ledger state error: {0}")]
    StateError(String),

    /// Persisting or restoring grants failed.
    #[error(transparent)]
    Storage(#[from] trellis_storage::StorageError),
}

/// Result type for capability operations.
pub type CapabilityResult<T> = Result<T, CapabilityError>;
