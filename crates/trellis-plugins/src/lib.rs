//! Trellis Plugins - registration, resolution, gating and lifecycle.
//!
//! This crate provides:
//! - [`PluginManifest`] parsing (TOML or JSON) and validation into a
//!   [`PluginDescriptor`]
//! - [`DependencyResolver`], which orders a plugin's dependency graph
//!   depth-first with an explicit stack, failing on cycles, missing ids and
//!   incompatible versions
//! - [`CapabilityGate`] and [`PluginApi`], the permission-checked surface
//!   handed to each active plugin
//! - [`PluginRegistry`], the lifecycle orchestrator wiring the permission
//!   ledger, namespaced storage and message router together
//!
//! # Capability groups
//!
//! A [`PluginApi`] exposes `storage`, `network`, `ui`, `messaging`,
//! `clipboard` and `notifications`. Every method checks the plugin's grant
//! for its group before delegating, and denials are reported once to the
//! audit hook. Nothing returned by the API gives access to the underlying
//! subsystem.
//!
//! # Example
//!
//! ```rust
//! use trellis_core::{Capability, PluginId};
//! use trellis_plugins::{PluginManifest, PluginRegistry};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = PluginRegistry::new();
//! registry.register(&PluginManifest::new("editor-core", "Editor Core", "2.1.0"))?;
//! let notes = registry.register(
//!     &PluginManifest::new("notes", "Notes", "1.0.0")
//!         .depends_on("editor-core", "^2.0.0")
//!         .requests("storage"),
//! )?;
//!
//! let order = registry.load(&notes).await?;
//! assert_eq!(order, vec![PluginId::new("editor-core")?, notes.clone()]);
//!
//! registry.grant(&notes, Capability::Storage)?;
//! let api = registry.activate(&notes, Vec::new())?;
//! api.storage().set("draft", b"hello".to_vec()).await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod api;
mod descriptor;
mod error;
mod gate;
mod manifest;
mod registry;
mod resolver;
mod services;

pub use api::{
    ClipboardApi, MessagingApi, NetworkApi, NotificationsApi, PluginApi, StorageApi, UiApi,
};
pub use descriptor::{PluginDescriptor, PluginStatus};
pub use error::{PluginError, PluginResult};
pub use gate::CapabilityGate;
pub use manifest::{MANIFEST_FILE_NAME, PluginManifest};
pub use registry::{PermissionPolicy, PluginRegistry, PluginRegistryBuilder};
pub use resolver::DependencyResolver;
pub use services::{
    ActionSpec, ClipboardService, HostServices, HttpRequest, HttpResponse, NetworkService,
    Notification, NotificationService, PanelSpec, PresentationService, ServiceError,
    ServiceResult, UiHandle, UnavailableService,
};
