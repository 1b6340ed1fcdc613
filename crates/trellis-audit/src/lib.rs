//! Trellis Audit - the host-side audit stream.
//!
//! This crate provides:
//! - [`AuditRecord`], one security-relevant event tied to a plugin
//! - The [`AuditHook`] trait consumed by the capability gate, the message
//!   router and the registry
//! - Ready-made hooks: [`MemoryAuditLog`], [`TracingAuditHook`] and
//!   [`FanoutAuditHook`]
//!
//! The stream is append-only. Producers report each event exactly once and
//! never retry, so hooks must not fail; a hook that cannot keep a record
//! drops it and logs the loss.
//!
//! # Example
//!
//! ```
//! use trellis_audit::{AuditEventKind, AuditHook, AuditRecord, MemoryAuditLog};
//! use trellis_core::{Capability, PluginId};
//!
//! let log = MemoryAuditLog::new();
//! let plugin = PluginId::new("notes").unwrap();
//!
//! log.record(AuditRecord::permission_denied(&plugin, Capability::Network));
//!
//! assert_eq!(log.count_of(AuditEventKind::PermissionDenied), 1);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod entry;
mod error;
mod hook;

pub use entry::{AuditEventKind, AuditRecord, AuditRecordId};
pub use error::{AuditError, AuditResult};
pub use hook::{AuditHook, FanoutAuditHook, MemoryAuditLog, TracingAuditHook};
