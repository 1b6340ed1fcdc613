//! Trellis Capabilities - the permission ledger.
//!
//! The ledger records, per plugin, which capabilities the manifest
//! *requested* and which of those have been *granted* by the user or by
//! policy. It is pure data with a synchronous query interface; the
//! capability gate asks it before every host call.
//!
//! # Rules
//!
//! - A capability outside the plugin's requested set can never be granted
//!   ([`CapabilityError::UnrequestedCapability`]).
//! - Grants are revocable at any time. Revocation takes effect on the next
//!   check and never reaches back into a call that already passed.
//!
//! # Example
//!
//! ```
//! use trellis_capabilities::PermissionLedger;
//! use trellis_core::{Capability, PluginId};
//!
//! let ledger = PermissionLedger::new();
//! let plugin = PluginId::new("notes").unwrap();
//!
//! ledger.declare(&plugin, [Capability::Storage]).unwrap();
//! ledger.grant(&plugin, Capability::Storage).unwrap();
//! assert!(ledger.has(&plugin, Capability::Storage));
//!
//! // Never requested, so it cannot be granted.
//! assert!(ledger.grant(&plugin, Capability::Network).is_err());
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod ledger;

pub use error::{CapabilityError, CapabilityResult};
pub use ledger::{LEDGER_NAMESPACE, PermissionLedger};
