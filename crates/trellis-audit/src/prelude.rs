//! Prelude module - commonly used types for convenient import.
//!
//! Use `use trellis_audit::prelude::*;` to import all essential types.

// Errors
pub use crate::{AuditError, AuditResult};

// Records
pub use crate::{AuditEventKind, AuditRecord, AuditRecordId};

// Hooks
pub use crate::{AuditHook, FanoutAuditHook, MemoryAuditLog, TracingAuditHook};
