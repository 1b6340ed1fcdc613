//! Audit hooks: the consumers of the audit stream.

use std::fmt;
use std::sync::{Arc, RwLock};

use tracing::warn;
use trellis_core::PluginId;

use crate::entry::{AuditEventKind, AuditRecord};
use crate::error::{AuditError, AuditResult};

/// Receiver of audit records.
///
/// Called synchronously from the code path that observed the event, so
/// implementations should be quick and must not block on I/O. Producers
/// call `record` exactly once per event.
pub trait AuditHook: Send + Sync {
    /// Append one record to the stream.
    fn record(&self, record: AuditRecord);
}

impl fmt::Debug for dyn AuditHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn AuditHook")
    }
}

// ---------------------------------------------------------------------------
// In-memory log
// ---------------------------------------------------------------------------

/// Append-only in-memory audit log.
///
/// Useful as the operator-facing store in a single-process host and as the
/// assertion surface in tests.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    records: RwLock<Vec<AuditRecord>>,
}

impl MemoryAuditLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of every record, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.read().map(|r| r.clone()).unwrap_or_default()
    }

    /// Records of one kind, oldest first.
    #[must_use]
    pub fn of_kind(&self, kind: AuditEventKind) -> Vec<AuditRecord> {
        self.filtered(|r| r.event == kind)
    }

    /// Records about one plugin, oldest first.
    #[must_use]
    pub fn for_plugin(&self, plugin_id: &PluginId) -> Vec<AuditRecord> {
        self.filtered(|r| &r.plugin_id == plugin_id)
    }

    /// Number of records of one kind.
    #[must_use]
    pub fn count_of(&self, kind: AuditEventKind) -> usize {
        self.records
            .read()
            .map(|r| r.iter().filter(|rec| rec.event == kind).count())
            .unwrap_or(0)
    }

    /// Total number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Export the log as JSON Lines, one record per line.
    ///
    /// # Errors
    ///
    /// Returns an error if the log lock is poisoned or a record fails to
    /// serialize.
    pub fn export_jsonl(&self) -> AuditResult<String> {
        let records = self
            .records
            .read()
            .map_err(|e| AuditError::Unavailable(e.to_string()))?;
        let mut out = String::new();
        for record in records.iter() {
            let line = serde_json::to_string(record)
                .map_err(|e| AuditError::SerializationError(e.to_string()))?;
            out.push_str(&line);
            out.push('\n');
        }
        Ok(out)
    }

    fn filtered(&self, keep: impl Fn(&AuditRecord) -> bool) -> Vec<AuditRecord> {
        self.records
            .read()
            .map(|r| r.iter().filter(|rec| keep(rec)).cloned().collect())
            .unwrap_or_default()
    }
}

impl AuditHook for MemoryAuditLog {
    fn record(&self, record: AuditRecord) {
        match self.records.write() {
            Ok(mut records) => records.push(record),
            Err(e) => warn!(
                record_id = %record.id,
                event = %record.event,
                error = %e,
                "Dropping audit record: log lock poisoned"
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Tracing mirror
// ---------------------------------------------------------------------------

/// Hook that mirrors every record into the `tracing` log at `warn` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditHook;

impl AuditHook for TracingAuditHook {
    fn record(&self, record: AuditRecord) {
        warn!(
            target: "trellis::audit",
            record_id = %record.id,
            event = %record.event,
            plugin_id = %record.plugin_id,
            detail = %record.detail,
            "Audit event"
        );
    }
}

// ---------------------------------------------------------------------------
// Fan-out
// ---------------------------------------------------------------------------

/// Hook that forwards each record to several hooks, in order.
#[derive(Default)]
pub struct FanoutAuditHook {
    hooks: Vec<Arc<dyn AuditHook>>,
}

impl FanoutAuditHook {
    /// Create a fan-out with no targets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a target hook.
    #[must_use]
    pub fn with(mut self, hook: Arc<dyn AuditHook>) -> Self {
        self.hooks.push(hook);
        self
    }
}

impl fmt::Debug for FanoutAuditHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FanoutAuditHook")
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl AuditHook for FanoutAuditHook {
    fn record(&self, record: AuditRecord) {
        if let Some((last, rest)) = self.hooks.split_last() {
            for hook in rest {
                hook.record(record.clone());
            }
            last.record(record);
        }
    }
}
