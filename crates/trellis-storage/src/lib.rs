//! Trellis Storage - per-plugin key-value spaces over one shared backend.
//!
//! The host owns a single [`KvStore`] backend. Each plugin is handed a
//! [`NamespacedStore`] whose namespace is fixed to the plugin id, so the
//! public contract has no way to name another plugin's records.
//!
//! The backend is a trait; [`MemoryKvStore`] is the built-in implementation
//! and partitions its locks by namespace so traffic in one namespace never
//! waits on another. Durable engines implement the same trait.
//!
//! Backend outages surface as [`StorageError::Unavailable`], which is
//! retryable. Nothing in this crate retries or queues on the caller's
//! behalf.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod error;
pub mod kv;

pub use error::{StorageError, StorageResult};
pub use kv::{KvStore, MemoryKvStore, NamespacedStore, SYSTEM_NAMESPACE_PREFIX};
