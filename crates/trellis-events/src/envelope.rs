//! Message envelopes and identifiers.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use trellis_core::PluginId;
use uuid::Uuid;

/// Unique message identifier, used for deduplication across processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one host process, stamped on every envelope it creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostInstanceId(Uuid);

impl HostInstanceId {
    /// Create a fresh random instance id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for HostInstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HostInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a message is addressed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "plugin_id", rename_all = "snake_case")]
pub enum Recipient {
    /// A single plugin.
    Plugin(PluginId),
    /// Every active plugin except the sender.
    Broadcast,
}

impl Recipient {
    /// Whether this is the broadcast marker.
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        matches!(self, Self::Broadcast)
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plugin(id) => write!(f, "{id}"),
            Self::Broadcast => f.write_str("*"),
        }
    }
}

/// A routed message.
///
/// Created by the router on `send`/`broadcast` and immutable afterwards;
/// handlers receive it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    message_id: MessageId,
    origin: HostInstanceId,
    from: PluginId,
    to: Recipient,
    payload: serde_json::Value,
    timestamp: DateTime<Utc>,
}

impl Envelope {
    pub(crate) fn new(
        origin: HostInstanceId,
        from: PluginId,
        to: Recipient,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            message_id: MessageId::new(),
            origin,
            from,
            to,
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Unique id of this message.
    #[must_use]
    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    /// The host process that created the envelope.
    #[must_use]
    pub fn origin(&self) -> HostInstanceId {
        self.origin
    }

    /// The sending plugin.
    #[must_use]
    pub fn sender(&self) -> &PluginId {
        &self.from
    }

    /// The addressee.
    #[must_use]
    pub fn recipient(&self) -> &Recipient {
        &self.to
    }

    /// The opaque message body.
    #[must_use]
    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// When the router created the envelope.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// JSON form attached to audit records.
    pub(crate) fn to_audit_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
