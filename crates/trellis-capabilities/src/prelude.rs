//! Prelude module - commonly used types for convenient import.
//!
//! Use `use trellis_capabilities::prelude::*;` to import all essential types.

// Errors
pub use crate::{CapabilityError, CapabilityResult};

// Ledger
pub use crate::PermissionLedger;
