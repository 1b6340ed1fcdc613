//! Test fixtures for common types.

use trellis_core::PluginId;
use trellis_plugins::PluginManifest;

/// A plugin id, unchecked.
#[must_use]
pub fn plugin_id(id: &str) -> PluginId {
    PluginId::from_static(id)
}

/// A manifest whose display name equals its id.
#[must_use]
pub fn manifest(id: &str, version: &str) -> PluginManifest {
    PluginManifest::new(id, id, version)
}

/// A manifest with dependencies given as `(id, requirement)` pairs.
#[must_use]
pub fn manifest_with_deps(id: &str, version: &str, deps: &[(&str, &str)]) -> PluginManifest {
    deps.iter().fold(manifest(id, version), |m, (dep, req)| {
        m.depends_on(*dep, *req)
    })
}

/// A manifest requesting capabilities by name.
#[must_use]
pub fn manifest_requesting(id: &str, capabilities: &[&str]) -> PluginManifest {
    capabilities
        .iter()
        .fold(manifest(id, "1.0.0"), |m, cap| m.requests(*cap))
}
