//! Audit record types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use trellis_core::{Capability, PluginId};
use uuid::Uuid;

/// Unique identifier of one audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditRecordId(Uuid);

impl AuditRecordId {
    /// Create a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AuditRecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AuditRecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of event an audit record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    /// A gated call was refused because the capability was not granted.
    PermissionDenied,
    /// An inbound message handler returned an error.
    HandlerError,
    /// Dependency resolution failed and the plugin moved to `Failed`.
    ResolutionFailed,
}

impl fmt::Display for AuditEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PermissionDenied => "permission_denied",
            Self::HandlerError => "handler_error",
            Self::ResolutionFailed => "resolution_failed",
        })
    }
}

/// One entry in the audit stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique record identifier.
    pub id: AuditRecordId,
    /// When the event happened.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub event: AuditEventKind,
    /// The plugin the event concerns. For handler errors this is the
    /// recipient whose handler failed.
    pub plugin_id: PluginId,
    /// Human-readable description.
    pub detail: String,
    /// Structured context (denied capability, failing envelope, ...).
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub context: serde_json::Value,
}

impl AuditRecord {
    /// Create a record stamped with the current time.
    #[must_use]
    pub fn new(event: AuditEventKind, plugin_id: PluginId, detail: impl Into<String>) -> Self {
        Self {
            id: AuditRecordId::new(),
            timestamp: Utc::now(),
            event,
            plugin_id,
            detail: detail.into(),
            context: serde_json::Value::Null,
        }
    }

    /// Attach structured context.
    #[must_use]
    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }

    /// A capability-gate refusal.
    #[must_use]
    pub fn permission_denied(plugin_id: &PluginId, capability: Capability) -> Self {
        Self::new(
            AuditEventKind::PermissionDenied,
            plugin_id.clone(),
            format!("capability '{capability}' is not granted"),
        )
        .with_context(serde_json::json!({ "capability": capability }))
    }

    /// A failed inbound handler. `envelope` is the message being delivered.
    #[must_use]
    pub fn handler_error(
        recipient: &PluginId,
        error: impl fmt::Display,
        envelope: serde_json::Value,
    ) -> Self {
        Self::new(
            AuditEventKind::HandlerError,
            recipient.clone(),
            format!("handler failed: {error}"),
        )
        .with_context(serde_json::json!({ "envelope": envelope }))
    }

    /// A terminal dependency-resolution failure.
    #[must_use]
    pub fn resolution_failed(plugin_id: &PluginId, reason: impl fmt::Display) -> Self {
        Self::new(
            AuditEventKind::ResolutionFailed,
            plugin_id.clone(),
            reason.to_string(),
        )
    }
}
