//! Configuration struct definitions.
//!
//! Every section derives `Default` and uses `#[serde(default)]`, so a
//! config file only needs to name the fields it changes.

use serde::{Deserialize, Serialize};
use trellis_core::Capability;

/// Default buffer size of the cross-process notification channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default number of remote message ids remembered for deduplication.
pub const DEFAULT_DEDUPE_WINDOW: usize = 4096;

/// Root configuration for a plugin host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Logging and tracing settings.
    pub logging: LoggingSection,
    /// Message router settings.
    pub router: RouterSection,
    /// Permission policy settings.
    pub permissions: PermissionsSection,
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging and tracing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global log level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    pub level: String,
    /// Output format: `"pretty"`, `"compact"`, `"json"` or `"full"`.
    pub format: String,
    /// Per-crate tracing directives (e.g. `["trellis_events=debug"]`).
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "pretty".to_owned(),
            directives: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// RouterSection
// ---------------------------------------------------------------------------

/// Message router configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSection {
    /// Buffer size of the cross-process notification channel.
    pub channel_capacity: usize,
    /// Number of remote message ids remembered for deduplication.
    pub dedupe_window: usize,
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            dedupe_window: DEFAULT_DEDUPE_WINDOW,
        }
    }
}

// ---------------------------------------------------------------------------
// PermissionsSection
// ---------------------------------------------------------------------------

/// Permission policy configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionsSection {
    /// Capabilities granted automatically when a manifest requests them.
    pub auto_grant: Vec<String>,
}

impl PermissionsSection {
    /// The `auto_grant` entries that name known capabilities.
    ///
    /// Unknown names are skipped here; [`HostConfig::validate`] rejects
    /// them.
    #[must_use]
    pub fn auto_grant_capabilities(&self) -> Vec<Capability> {
        self.auto_grant
            .iter()
            .filter_map(|name| name.parse().ok())
            .collect()
    }
}
