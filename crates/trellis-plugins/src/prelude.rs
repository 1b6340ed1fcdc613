//! Prelude module - commonly used types for convenient import.
//!
//! Use `use trellis_plugins::prelude::*;` to import all essential types.

// Errors
pub use crate::{PluginError, PluginResult};

// Registration
pub use crate::{PluginDescriptor, PluginManifest, PluginStatus};

// Lifecycle
pub use crate::{PermissionPolicy, PluginRegistry};

// Gated API
pub use crate::{CapabilityGate, PluginApi};

// Host services
pub use crate::{HostServices, ServiceError};
