//! Plugin descriptors and lifecycle states.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use trellis_core::{Capability, PluginId, Version};

/// Lifecycle state of a registered plugin.
///
/// ```text
/// Registered -> Resolving -> Loaded -> Active <-> Deactivated -> Unloaded
///                   \
///                    -> Failed
/// ```
///
/// Any state except `Unloaded` and `Failed` may jump straight to
/// `Unloaded` (forced teardown).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginStatus {
    /// Manifest accepted, nothing resolved yet.
    Registered,
    /// The dependency resolver is running for this plugin.
    Resolving,
    /// Dependencies resolved and loaded.
    Loaded,
    /// Running with a live API handle and message subscriptions.
    Active,
    /// API handle released and unsubscribed; storage retained.
    Deactivated,
    /// Torn down and removed from the registry.
    Unloaded,
    /// Resolution failed. Terminal until explicitly retried.
    Failed,
}

impl PluginStatus {
    /// Whether the plugin's dependencies are satisfied (it has been loaded
    /// and not torn down).
    #[must_use]
    pub fn is_loaded(self) -> bool {
        matches!(self, Self::Loaded | Self::Active | Self::Deactivated)
    }

    /// Whether a forced unload is permitted from this state.
    #[must_use]
    pub fn can_unload(self) -> bool {
        !matches!(self, Self::Unloaded | Self::Failed)
    }

    /// Stable lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Resolving => "resolving",
            Self::Loaded => "loaded",
            Self::Active => "active",
            Self::Deactivated => "deactivated",
            Self::Unloaded => "unloaded",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The registered metadata record for one plugin.
///
/// Built from a validated [`PluginManifest`](crate::PluginManifest). The
/// registry owns every status transition; callers only ever see clones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    id: PluginId,
    name: String,
    version: Version,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    entry: Option<String>,
    /// Dependency id to requirement string. Requirements are parsed at
    /// resolution time so unsupported operators surface there.
    dependencies: BTreeMap<PluginId, String>,
    requested_permissions: BTreeSet<Capability>,
    status: PluginStatus,
    #[serde(default)]
    failure: Option<String>,
}

impl PluginDescriptor {
    /// Create a descriptor in the [`PluginStatus::Registered`] state.
    #[must_use]
    pub fn new(id: PluginId, name: impl Into<String>, version: Version) -> Self {
        Self {
            id,
            name: name.into(),
            version,
            description: None,
            entry: None,
            dependencies: BTreeMap::new(),
            requested_permissions: BTreeSet::new(),
            status: PluginStatus::Registered,
            failure: None,
        }
    }

    /// Add a dependency with a requirement such as `^1.2.0`.
    #[must_use]
    pub fn with_dependency(mut self, id: PluginId, requirement: impl Into<String>) -> Self {
        self.dependencies.insert(id, requirement.into());
        self
    }

    /// Add a requested capability.
    #[must_use]
    pub fn with_permission(mut self, capability: Capability) -> Self {
        self.requested_permissions.insert(capability);
        self
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the opaque entry reference handed to the loader.
    #[must_use]
    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = Some(entry.into());
        self
    }

    /// The plugin id.
    #[must_use]
    pub fn id(&self) -> &PluginId {
        &self.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registered version.
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    /// Optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Opaque entry reference, not interpreted by the host.
    #[must_use]
    pub fn entry(&self) -> Option<&str> {
        self.entry.as_deref()
    }

    /// Declared dependencies, sorted by id.
    #[must_use]
    pub fn dependencies(&self) -> &BTreeMap<PluginId, String> {
        &self.dependencies
    }

    /// Whether this plugin declares a dependency on `id`.
    #[must_use]
    pub fn depends_on(&self, id: &PluginId) -> bool {
        self.dependencies.contains_key(id)
    }

    /// Capabilities requested by the manifest.
    #[must_use]
    pub fn requested_permissions(&self) -> &BTreeSet<Capability> {
        &self.requested_permissions
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> PluginStatus {
        self.status
    }

    /// Why the plugin entered [`PluginStatus::Failed`], if it did.
    #[must_use]
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub(crate) fn set_status(&mut self, status: PluginStatus) {
        self.status = status;
        if status != PluginStatus::Failed {
            self.failure = None;
        }
    }

    pub(crate) fn fail(&mut self, reason: impl Into<String>) {
        self.status = PluginStatus::Failed;
        self.failure = Some(reason.into());
    }
}
