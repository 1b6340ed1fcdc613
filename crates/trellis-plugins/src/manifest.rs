//! Plugin manifest types.
//!
//! A manifest (`plugin.toml`, or the equivalent JSON) describes a plugin's
//! identity, dependencies and requested capabilities. Fields are kept as
//! raw strings until [`PluginManifest::validate`] turns them into a
//! [`PluginDescriptor`], so every problem surfaces as
//! [`PluginError::InvalidManifest`] with a reason.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use trellis_core::{Capability, PluginId, Version};

use crate::descriptor::PluginDescriptor;
use crate::error::{PluginError, PluginResult};

/// Standard manifest file name.
pub const MANIFEST_FILE_NAME: &str = "plugin.toml";

/// A plugin manifest as written by the plugin author.
///
/// ```toml
/// id = "notes"
/// name = "Notes"
/// version = "1.2.0"
/// permissions = ["storage", "messaging"]
/// entry = "notes/main.js"
///
/// [dependencies]
/// editor-core = "^2.0.0"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Unique plugin identifier.
    pub id: String,
    /// Human-readable display name.
    pub name: String,
    /// `major.minor.patch` version string.
    pub version: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Dependency id to version requirement.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
    /// Requested capability names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,
    /// Opaque entry reference owned by the loader.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,
}

impl PluginManifest {
    /// Start a manifest with the required fields.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    /// Add a dependency.
    #[must_use]
    pub fn depends_on(mut self, id: impl Into<String>, requirement: impl Into<String>) -> Self {
        self.dependencies.insert(id.into(), requirement.into());
        self
    }

    /// Add a requested capability by name.
    #[must_use]
    pub fn requests(mut self, capability: impl Into<String>) -> Self {
        self.permissions.push(capability.into());
        self
    }

    /// Parse a manifest from TOML.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidManifest`] if the TOML is malformed or
    /// a required field is missing.
    pub fn from_toml_str(content: &str) -> PluginResult<Self> {
        toml::from_str(content).map_err(|e| PluginError::InvalidManifest(e.to_string()))
    }

    /// Parse a manifest from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidManifest`] if the JSON is malformed or
    /// a required field is missing.
    pub fn from_json_str(content: &str) -> PluginResult<Self> {
        serde_json::from_str(content).map_err(|e| PluginError::InvalidManifest(e.to_string()))
    }

    /// Load a manifest file. Files ending in `.json` are read as JSON,
    /// everything else as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::ManifestParseError`] if the file cannot be
    /// read or parsed.
    pub fn load(path: &Path) -> PluginResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| PluginError::ManifestParseError {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let parsed = if is_json {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        } else {
            toml::from_str(&content).map_err(|e| e.to_string())
        };
        parsed.map_err(|message| PluginError::ManifestParseError {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Validate the manifest and build a descriptor in the `Registered`
    /// state.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidManifest`] naming the first problem:
    /// an invalid id, an empty name, a version that is not
    /// `major.minor.patch`, an unknown capability, or an invalid
    /// dependency id.
    pub fn validate(&self) -> PluginResult<PluginDescriptor> {
        let id = PluginId::new(self.id.as_str())
            .map_err(|e| PluginError::InvalidManifest(e.to_string()))?;
        if self.name.trim().is_empty() {
            return Err(PluginError::InvalidManifest(format!(
                "plugin {id}: name must not be empty"
            )));
        }
        let version = Version::parse(&self.version)
            .map_err(|e| PluginError::InvalidManifest(format!("plugin {id}: {e}")))?;

        let mut descriptor = PluginDescriptor::new(id, self.name.trim(), version);
        for permission in &self.permissions {
            let capability: Capability = permission.parse().map_err(|e| {
                PluginError::InvalidManifest(format!("plugin {}: {e}", descriptor.id()))
            })?;
            descriptor = descriptor.with_permission(capability);
        }
        for (dependency, requirement) in &self.dependencies {
            let dependency = PluginId::new(dependency.as_str()).map_err(|e| {
                PluginError::InvalidManifest(format!(
                    "plugin {}: dependency {e}",
                    descriptor.id()
                ))
            })?;
            descriptor = descriptor.with_dependency(dependency, requirement.trim());
        }
        if let Some(description) = &self.description {
            descriptor = descriptor.with_description(description.clone());
        }
        if let Some(entry) = &self.entry {
            descriptor = descriptor.with_entry(entry.clone());
        }
        Ok(descriptor)
    }
}
