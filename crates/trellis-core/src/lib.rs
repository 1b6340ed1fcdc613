//! Trellis Core - Foundation types shared by every part of the plugin host.
//!
//! This crate provides:
//! - [`PluginId`], the validated identifier every other component keys on
//! - [`Version`] and [`VersionReq`], the dependency compatibility policy
//! - [`Capability`], the closed set of host functionality a plugin can request

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod capability;
pub mod error;
pub mod id;
pub mod version;

pub use capability::Capability;
pub use error::{CoreError, CoreResult};
pub use id::PluginId;
pub use version::{Version, VersionError, VersionReq, check_compatibility};
