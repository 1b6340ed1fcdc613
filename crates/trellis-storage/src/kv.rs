//! Key-value backend contract and the per-plugin namespaced view.
//!
//! The [`KvStore`] trait is the generic async contract a durable backend
//! implements: `get` / `set` / `remove` / `list_keys` / `clear`, every call
//! addressed by `(namespace, key)`.
//!
//! # Namespacing
//!
//! Plugins never see namespaces. The host wraps the shared backend in a
//! [`NamespacedStore`] bound to the plugin id and hands only that out.
//! Host-internal state lives under `system:*` namespaces, which can never
//! collide with a plugin id because ids cannot contain `:`.
//!
//! # Concurrency
//!
//! Concurrent writes to the same key are last-writer-wins with no merge.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;
use trellis_core::PluginId;

use crate::error::{StorageError, StorageResult};

/// Prefix reserved for host-internal namespaces.
pub const SYSTEM_NAMESPACE_PREFIX: &str = "system:";

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Namespaces must be non-empty and must not contain the null byte.
fn validate_namespace(namespace: &str) -> StorageResult<()> {
    if namespace.is_empty() {
        return Err(StorageError::InvalidKey(
            "namespace must not be empty".into(),
        ));
    }
    if namespace.contains('\0') {
        return Err(StorageError::InvalidKey(
            "namespace must not contain null bytes".into(),
        ));
    }
    Ok(())
}

/// Keys must be non-empty and must not contain the null byte.
fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("key must not be empty".into()));
    }
    if key.contains('\0') {
        return Err(StorageError::InvalidKey(
            "key must not contain null bytes".into(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Async key-value backend shared by every plugin.
///
/// Implementations report transient outages as
/// [`StorageError::Unavailable`] and must not retry internally.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Get a value by namespace and key.
    ///
    /// Returns `None` if the key does not exist.
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Set a value for a namespace and key, overwriting any existing value.
    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()>;

    /// Remove a key from a namespace.
    ///
    /// Returns `true` if the key existed.
    async fn remove(&self, namespace: &str, key: &str) -> StorageResult<bool>;

    /// List all keys in a namespace, in ascending order.
    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>>;

    /// Remove every key in a namespace, returning how many were removed.
    async fn clear(&self, namespace: &str) -> StorageResult<u64>;

    /// Check if a key exists in a namespace.
    async fn exists(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        Ok(self.get(namespace, key).await?.is_some())
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

type Partition = Arc<RwLock<BTreeMap<String, Vec<u8>>>>;

/// In-memory key-value store.
///
/// Each namespace gets its own lock. The outer map is only touched long
/// enough to clone the partition handle, so readers and writers in
/// different namespaces never wait on each other.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    partitions: DashMap<String, Partition>,
}

impl MemoryKvStore {
    /// Create a new empty in-memory KV store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn partition(&self, namespace: &str) -> Option<Partition> {
        self.partitions
            .get(namespace)
            .map(|entry| Arc::clone(entry.value()))
    }

    fn partition_or_create(&self, namespace: &str) -> Partition {
        Arc::clone(
            self.partitions
                .entry(namespace.to_string())
                .or_default()
                .value(),
        )
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Internal(e.to_string())
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let Some(partition) = self.partition(namespace) else {
            return Ok(None);
        };
        let data = partition.read().map_err(poisoned)?;
        Ok(data.get(key).cloned())
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let partition = self.partition_or_create(namespace);
        let mut data = partition.write().map_err(poisoned)?;
        data.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let Some(partition) = self.partition(namespace) else {
            return Ok(false);
        };
        let mut data = partition.write().map_err(poisoned)?;
        Ok(data.remove(key).is_some())
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        validate_namespace(namespace)?;
        let Some(partition) = self.partition(namespace) else {
            return Ok(Vec::new());
        };
        let data = partition.read().map_err(poisoned)?;
        Ok(data.keys().cloned().collect())
    }

    async fn clear(&self, namespace: &str) -> StorageResult<u64> {
        validate_namespace(namespace)?;
        let Some(partition) = self.partition(namespace) else {
            return Ok(0);
        };
        let mut data = partition.write().map_err(poisoned)?;
        let removed = u64::try_from(data.len()).unwrap_or(u64::MAX);
        data.clear();
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// Namespaced store (namespace pre-bound)
// ---------------------------------------------------------------------------

/// A namespace-scoped view into a [`KvStore`].
///
/// This is the storage surface plugins get. The host creates one per plugin
/// with the namespace fixed to the plugin id; there is no method that
/// accepts a namespace, so cross-namespace access is impossible.
///
/// Also provides typed convenience via [`get_json`](Self::get_json) /
/// [`set_json`](Self::set_json).
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use trellis_core::PluginId;
/// use trellis_storage::{MemoryKvStore, NamespacedStore};
///
/// let backend = Arc::new(MemoryKvStore::new());
/// let store = NamespacedStore::for_plugin(backend, &PluginId::new("notes")?);
///
/// store.set("draft", b"hello".to_vec()).await?;
/// let val = store.get("draft").await?;
/// ```
#[derive(Clone)]
pub struct NamespacedStore {
    inner: Arc<dyn KvStore>,
    namespace: String,
}

impl std::fmt::Debug for NamespacedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespacedStore")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl NamespacedStore {
    /// Create a view scoped to a plugin's own namespace.
    #[must_use]
    pub fn for_plugin(store: Arc<dyn KvStore>, plugin_id: &PluginId) -> Self {
        Self {
            inner: store,
            namespace: plugin_id.as_str().to_string(),
        }
    }

    /// Create a view over a host-internal `system:{name}` namespace.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] if `name` is empty or contains
    /// null bytes.
    pub fn system(store: Arc<dyn KvStore>, name: &str) -> StorageResult<Self> {
        validate_key(name)?;
        Ok(Self {
            inner: store,
            namespace: format!("{SYSTEM_NAMESPACE_PREFIX}{name}"),
        })
    }

    /// The namespace this store is scoped to.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Get a raw byte value by key.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] for an invalid key, or the
    /// backend's error (including [`StorageError::Unavailable`]).
    pub async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_key(key)?;
        self.inner.get(&self.namespace, key).await
    }

    /// Set a raw byte value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] for an invalid key, or the
    /// backend's error.
    pub async fn set(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        validate_key(key)?;
        self.inner.set(&self.namespace, key, value).await
    }

    /// Remove a key. Returns `true` if the key existed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] for an invalid key, or the
    /// backend's error.
    pub async fn remove(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        self.inner.remove(&self.namespace, key).await
    }

    /// Check if a key exists.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] for an invalid key, or the
    /// backend's error.
    pub async fn exists(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        self.inner.exists(&self.namespace, key).await
    }

    /// List all keys in this namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store operation fails.
    pub async fn list_keys(&self) -> StorageResult<Vec<String>> {
        self.inner.list_keys(&self.namespace).await
    }

    /// Remove all keys in this namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store operation fails.
    pub async fn clear(&self) -> StorageResult<u64> {
        let removed = self.inner.clear(&self.namespace).await?;
        debug!(namespace = %self.namespace, removed, "Cleared namespace");
        Ok(removed)
    }

    // -- Typed convenience (JSON) --

    /// Deserialize a JSON value from the store.
    ///
    /// Returns `None` if the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if deserialization fails.
    pub async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> StorageResult<Option<T>> {
        let bytes = self.get(key).await?;
        bytes
            .map(|b| {
                serde_json::from_slice(&b).map_err(|e| StorageError::Serialization(e.to_string()))
            })
            .transpose()
    }

    /// Serialize a value as JSON and store it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if serialization fails.
    pub async fn set_json<T: serde::Serialize>(&self, key: &str, value: &T) -> StorageResult<()> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.set(key, bytes).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn plugin(id: &str) -> PluginId {
        PluginId::new(id).unwrap()
    }

    /// Backend that is always down.
    struct OfflineStore;

    #[async_trait]
    impl KvStore for OfflineStore {
        async fn get(&self, _: &str, _: &str) -> StorageResult<Option<Vec<u8>>> {
            Err(StorageError::Unavailable("backend offline".into()))
        }
        async fn set(&self, _: &str, _: &str, _: Vec<u8>) -> StorageResult<()> {
            Err(StorageError::Unavailable("backend offline".into()))
        }
        async fn remove(&self, _: &str, _: &str) -> StorageResult<bool> {
            Err(StorageError::Unavailable("backend offline".into()))
        }
        async fn list_keys(&self, _: &str) -> StorageResult<Vec<String>> {
            Err(StorageError::Unavailable("backend offline".into()))
        }
        async fn clear(&self, _: &str) -> StorageResult<u64> {
            Err(StorageError::Unavailable("backend offline".into()))
        }
    }

    // -- MemoryKvStore tests --

    #[tokio::test]
    async fn test_memory_get_set_overwrite() {
        let store = MemoryKvStore::new();
        assert_eq!(store.get("ns", "k").await.unwrap(), None);

        store.set("ns", "k", b"one".to_vec()).await.unwrap();
        store.set("ns", "k", b"two".to_vec()).await.unwrap();
        assert_eq!(store.get("ns", "k").await.unwrap(), Some(b"two".to_vec()));
    }

    #[tokio::test]
    async fn test_memory_remove() {
        let store = MemoryKvStore::new();
        store.set("ns", "k", b"v".to_vec()).await.unwrap();
        assert!(store.remove("ns", "k").await.unwrap());
        assert!(!store.remove("ns", "k").await.unwrap());
        assert!(!store.remove("never-written", "k").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_list_keys_sorted() {
        let store = MemoryKvStore::new();
        for key in ["b", "c", "a"] {
            store.set("ns", key, Vec::new()).await.unwrap();
        }
        assert_eq!(store.list_keys("ns").await.unwrap(), vec!["a", "b", "c"]);
        assert!(store.list_keys("empty").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_clear_only_touches_one_namespace() {
        let store = MemoryKvStore::new();
        store.set("a", "x", b"1".to_vec()).await.unwrap();
        store.set("a", "y", b"2".to_vec()).await.unwrap();
        store.set("b", "x", b"3".to_vec()).await.unwrap();

        assert_eq!(store.clear("a").await.unwrap(), 2);
        assert!(store.list_keys("a").await.unwrap().is_empty());
        assert_eq!(store.get("b", "x").await.unwrap(), Some(b"3".to_vec()));
        assert_eq!(store.clear("missing").await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_memory_concurrent_namespaces() {
        let store = Arc::new(MemoryKvStore::new());
        let writers = (0u8..8).map(|n| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let ns = format!("plugin-{n}");
                for i in 0..50 {
                    store.set(&ns, &format!("k{i}"), vec![n]).await.unwrap();
                }
            })
        });
        for result in futures::future::join_all(writers).await {
            result.unwrap();
        }
        for n in 0..8 {
            let keys = store.list_keys(&format!("plugin-{n}")).await.unwrap();
            assert_eq!(keys.len(), 50);
        }
    }

    // -- Validation tests --

    #[test]
    fn test_validate_namespace_rejects_empty_and_null() {
        assert!(validate_namespace("").is_err());
        assert!(validate_namespace("a\0b").is_err());
    }

    #[test]
    fn test_validate_key_rejects_empty_and_null() {
        assert!(validate_key("").is_err());
        assert!(validate_key("a\0b").is_err());
    }

    // -- NamespacedStore tests --

    #[tokio::test]
    async fn test_namespaced_isolation() {
        let backend: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let a = NamespacedStore::for_plugin(Arc::clone(&backend), &plugin("A"));
        let b = NamespacedStore::for_plugin(Arc::clone(&backend), &plugin("B"));

        a.set("key", b"a-value".to_vec()).await.unwrap();
        b.set("key", b"b-value".to_vec()).await.unwrap();

        assert_eq!(a.get("key").await.unwrap(), Some(b"a-value".to_vec()));
        assert_eq!(b.get("key").await.unwrap(), Some(b"b-value".to_vec()));

        // Records land under the plugin id in the shared backend.
        assert_eq!(
            backend.get("A", "key").await.unwrap(),
            Some(b"a-value".to_vec())
        );

        a.clear().await.unwrap();
        assert_eq!(b.get("key").await.unwrap(), Some(b"b-value".to_vec()));
    }

    #[tokio::test]
    async fn test_namespaced_remove_and_exists() {
        let store = NamespacedStore::for_plugin(Arc::new(MemoryKvStore::new()), &plugin("notes"));

        assert!(!store.exists("k").await.unwrap());
        store.set("k", b"v".to_vec()).await.unwrap();
        assert!(store.exists("k").await.unwrap());
        assert!(store.remove("k").await.unwrap());
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_namespaced_json_round_trip() {
        let store = NamespacedStore::for_plugin(Arc::new(MemoryKvStore::new()), &plugin("notes"));

        #[derive(serde::Serialize, serde::Deserialize, Debug, PartialEq)]
        struct Settings {
            theme: String,
            font_size: u32,
        }

        let settings = Settings {
            theme: "dark".into(),
            font_size: 14,
        };
        store.set_json("settings", &settings).await.unwrap();

        let loaded: Settings = store.get_json("settings").await.unwrap().unwrap();
        assert_eq!(loaded, settings);

        let missing: Option<Settings> = store.get_json("missing").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_namespaced_rejects_empty_key() {
        let store = NamespacedStore::for_plugin(Arc::new(MemoryKvStore::new()), &plugin("notes"));
        assert!(matches!(
            store.get("").await,
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_system_namespace_prefix() {
        let store = NamespacedStore::system(Arc::new(MemoryKvStore::new()), "ledger").unwrap();
        assert_eq!(store.namespace(), "system:ledger");
        assert!(NamespacedStore::system(Arc::new(MemoryKvStore::new()), "").is_err());
    }

    #[tokio::test]
    async fn test_unavailable_backend_is_retryable_and_not_retried() {
        let store = NamespacedStore::for_plugin(Arc::new(OfflineStore), &plugin("notes"));
        let err = store.set("k", b"v".to_vec()).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, StorageError::Unavailable(_)));

        let err = store.get("k").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
