//! Capability names.
//!
//! A capability gates one group of host functionality. The set is closed:
//! a manifest naming anything else is rejected at registration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A named permission gating one category of host functionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Namespaced persistent key-value storage.
    Storage,
    /// Outbound network requests.
    Network,
    /// Presentation requests: actions, panels, in-app notifications.
    Ui,
    /// Point-to-point and broadcast messaging with other plugins.
    Messaging,
    /// System clipboard access.
    Clipboard,
    /// System-level notifications.
    Notifications,
}

impl Capability {
    /// Every capability, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Storage,
        Self::Network,
        Self::Ui,
        Self::Messaging,
        Self::Clipboard,
        Self::Notifications,
    ];

    /// The canonical lowercase name, as written in manifests.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Storage => "storage",
            Self::Network => "network",
            Self::Ui => "ui",
            Self::Messaging => "messaging",
            Self::Clipboard => "clipboard",
            Self::Notifications => "notifications",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|cap| cap.as_str() == s)
            .ok_or_else(|| CoreError::UnknownCapability(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_agree() {
        for cap in Capability::ALL {
            assert_eq!(cap.to_string().parse::<Capability>().unwrap(), cap);
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert_eq!(
            "camera".parse::<Capability>(),
            Err(CoreError::UnknownCapability("camera".into()))
        );
        // Names are case-sensitive.
        assert!("Storage".parse::<Capability>().is_err());
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&Capability::Notifications).unwrap();
        assert_eq!(json, "\"notifications\"");
        let cap: Capability = serde_json::from_str("\"ui\"").unwrap();
        assert_eq!(cap, Capability::Ui);
    }
}
