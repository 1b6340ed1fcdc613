//! Plugin identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Maximum length of a plugin identifier, in bytes.
pub const MAX_PLUGIN_ID_LEN: usize = 128;

/// Unique, stable plugin identifier.
///
/// Plugin IDs are strings like `"word-count"` or `"Acme.Clipboard_Sync"`.
/// They must be non-empty, at most [`MAX_PLUGIN_ID_LEN`] bytes, and contain
/// only ASCII letters, digits, `-`, `_` and `.`. The character set excludes
/// `:` so a plugin id can never collide with a reserved `system:*` storage
/// namespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PluginId(String);

/// Deserialize with validation, so a crafted manifest cannot smuggle in a
/// malformed id.
impl<'de> Deserialize<'de> for PluginId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

impl PluginId {
    /// Create a new `PluginId`, validating the format.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidPluginId`] if the id is empty, too long,
    /// or contains characters outside the allowed set.
    pub fn new(id: impl Into<String>) -> CoreResult<Self> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Create a `PluginId` without validation (for tests and internal use).
    #[must_use]
    pub fn from_static(id: &str) -> Self {
        Self(id.to_string())
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check whether a string is a valid plugin ID without constructing one.
    #[must_use]
    pub fn is_valid_id(id: &str) -> bool {
        Self::validate(id).is_ok()
    }

    fn validate(id: &str) -> CoreResult<()> {
        if id.is_empty() {
            return Err(CoreError::InvalidPluginId(
                "plugin id must not be empty".into(),
            ));
        }
        if id.len() > MAX_PLUGIN_ID_LEN {
            return Err(CoreError::InvalidPluginId(format!(
                "plugin id must be at most {MAX_PLUGIN_ID_LEN} bytes, got {}",
                id.len()
            )));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(CoreError::InvalidPluginId(format!(
                "plugin id must contain only ASCII letters, digits, '-', '_' or '.', got: {id}"
            )));
        }
        Ok(())
    }
}

impl FromStr for PluginId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PluginId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_shapes() {
        for id in ["A", "b", "word-count", "acme.clipboard_sync", "v2"] {
            assert!(PluginId::is_valid_id(id), "{id} should be valid");
        }
    }

    #[test]
    fn rejects_empty_and_reserved_characters() {
        assert!(PluginId::new("").is_err());
        assert!(PluginId::new("system:ledger").is_err());
        assert!(PluginId::new("has space").is_err());
        assert!(PluginId::new("nul\0byte").is_err());
        assert!(PluginId::new("../escape").is_err());
    }

    #[test]
    fn rejects_overlong_id() {
        let id = "a".repeat(MAX_PLUGIN_ID_LEN + 1);
        assert!(PluginId::new(id).is_err());
        assert!(PluginId::new("a".repeat(MAX_PLUGIN_ID_LEN)).is_ok());
    }

    #[test]
    fn deserialize_validates() {
        let ok: PluginId = serde_json::from_str("\"notes\"").unwrap();
        assert_eq!(ok.as_str(), "notes");

        let bad: Result<PluginId, _> = serde_json::from_str("\"bad id\"");
        assert!(bad.is_err());
    }
}
