//! Plugin error types.

use std::path::PathBuf;

use trellis_capabilities::CapabilityError;
use trellis_core::{Capability, PluginId};
use trellis_events::RouterError;
use trellis_storage::StorageError;

use crate::descriptor::PluginStatus;
use crate::services::ServiceError;

/// Errors from registration, resolution, lifecycle and gated API calls.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// The plugin is not in the registry.
    #[error("plugin not found: {0}")]
    NotFound(PluginId),

    /// A plugin with this id is already registered.
    #[error("duplicate plugin id: {0}")]
    DuplicatePluginId(PluginId),

    /// The manifest failed validation.
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// A manifest file could not be read or parsed.
    #[error("manifest parse error in {path}: {message}")]
    ManifestParseError {
        /// Path to the manifest file.
        path: PathBuf,
        /// Parse error message.
        message: String,
    },

    /// The dependency graph contains a cycle. The path starts and ends
    /// with the same id.
    #[error("cyclic dependency: {}", join_chain(.cycle))]
    CyclicDependency {
        /// The offending cycle, e.g. `[A, B, A]`.
        cycle: Vec<PluginId>,
    },

    /// A dependency is not registered.
    #[error("missing dependency {dependency} required by {dependent} (chain: {})", join_chain(.chain))]
    MissingDependency {
        /// The plugin declaring the dependency.
        dependent: PluginId,
        /// The id that could not be found.
        dependency: PluginId,
        /// Path from the plugin being resolved to the missing id.
        chain: Vec<PluginId>,
    },

    /// An installed dependency does not satisfy the declared requirement.
    #[error("{dependent} requires {dependency} {required}, but {installed} is installed")]
    VersionIncompatible {
        /// The plugin declaring the dependency.
        dependent: PluginId,
        /// The dependency.
        dependency: PluginId,
        /// The requirement string from the manifest.
        required: String,
        /// The dependency's registered version.
        installed: String,
    },

    /// A dependency requirement uses an operator outside `X.Y.Z`, `^X.Y.Z`
    /// and `>=X.Y.Z`, or does not parse.
    #[error("unsupported version spec '{spec}' for dependency {dependency} of {dependent}")]
    UnsupportedVersionSpec {
        /// The plugin declaring the dependency.
        dependent: PluginId,
        /// The dependency.
        dependency: PluginId,
        /// The rejected requirement string.
        spec: String,
    },

    /// Resolution failed for a reason other than the graph itself, such
    /// as a dependency in the failed state.
    #[error("resolution failed for {plugin_id}: {reason}")]
    ResolutionFailed {
        /// The plugin being resolved.
        plugin_id: PluginId,
        /// What went wrong.
        reason: String,
    },

    /// The requested lifecycle action is not allowed from the current state.
    #[error("cannot {action} plugin {plugin_id} in state {status}")]
    InvalidTransition {
        /// The plugin.
        plugin_id: PluginId,
        /// Its current state.
        status: PluginStatus,
        /// The attempted action.
        action: &'static str,
    },

    /// The plugin lacks a grant for the capability.
    #[error("permission denied: {plugin_id} lacks capability '{capability}'")]
    PermissionDenied {
        /// The calling plugin.
        plugin_id: PluginId,
        /// The capability that was checked.
        capability: Capability,
    },

    /// The API handle was released by deactivation or unload.
    #[error("plugin api released: {0}")]
    ApiReleased(PluginId),

    /// The storage backend is unreachable. Safe to retry.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Any other storage failure.
    #[error("storage error: {0}")]
    Storage(StorageError),

    /// A host service failed.
    #[error("{capability} service error: {source}")]
    Service {
        /// The capability group the service backs.
        capability: Capability,
        /// The service failure.
        #[source]
        source: ServiceError,
    },

    /// Permission ledger error.
    #[error(transparent)]
    Capability(#[from] CapabilityError),

    /// Message router error.
    #[error(transparent)]
    Router(#[from] RouterError),

    /// The registry's own state is unusable (poisoned lock).
    #[error("registry state error: {0}")]
    StateError(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PluginError {
    /// Whether the same call may succeed if retried unchanged.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::StorageUnavailable(_) => true,
            Self::Storage(e) => e.is_retryable(),
            Self::Service { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

impl From<StorageError> for PluginError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Unavailable(message) => Self::StorageUnavailable(message),
            other => Self::Storage(other),
        }
    }
}

fn join_chain(ids: &[PluginId]) -> String {
    ids.iter()
        .map(PluginId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Result type for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_names_the_full_path() {
        let err = PluginError::CyclicDependency {
            cycle: vec![
                PluginId::from_static("A"),
                PluginId::from_static("B"),
                PluginId::from_static("A"),
            ],
        };
        assert_eq!(err.to_string(), "cyclic dependency: A -> B -> A");
    }

    #[test]
    fn unavailable_storage_maps_to_retryable_error() {
        let err: PluginError = StorageError::Unavailable("backend offline".into()).into();
        assert!(matches!(err, PluginError::StorageUnavailable(_)));
        assert!(err.is_retryable());

        let err: PluginError = StorageError::InvalidKey("".into()).into();
        assert!(matches!(err, PluginError::Storage(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn permission_denied_names_capability() {
        let err = PluginError::PermissionDenied {
            plugin_id: PluginId::from_static("A"),
            capability: Capability::Network,
        };
        assert!(err.to_string().contains("'network'"));
    }
}
