//! Prelude module - commonly used types for convenient import.
//!
//! Use `use trellis_core::prelude::*;` to import all essential types.

pub use crate::{CoreError, CoreResult};

pub use crate::{Capability, PluginId};

pub use crate::{Version, VersionError, VersionReq, check_compatibility};
