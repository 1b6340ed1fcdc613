//! Prelude module - commonly used types for convenient import.
//!
//! Use `use trellis_storage::prelude::*;` to import all essential types.

pub use crate::{StorageError, StorageResult};

pub use crate::{KvStore, MemoryKvStore, NamespacedStore};
