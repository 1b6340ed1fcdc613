//! Permission ledger storage and queries.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use tracing::{debug, info, warn};
use trellis_core::{Capability, PluginId};
use trellis_storage::NamespacedStore;

use crate::error::{CapabilityError, CapabilityResult};

/// System namespace the ledger persists grants under.
pub const LEDGER_NAMESPACE: &str = "ledger";

#[derive(Debug, Default, Clone)]
struct LedgerEntry {
    requested: BTreeSet<Capability>,
    granted: BTreeSet<Capability>,
}

/// Per-plugin record of requested and granted capabilities.
///
/// All methods are synchronous and take the ledger lock only for the
/// duration of the update, so checks are bounded-time.
#[derive(Default)]
pub struct PermissionLedger {
    entries: RwLock<HashMap<PluginId, LedgerEntry>>,
}

impl PermissionLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the capabilities a plugin's manifest requests.
    ///
    /// Re-declaring replaces the requested set; grants that are no longer
    /// requested are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::StateError`] if the ledger lock is poisoned.
    pub fn declare(
        &self,
        plugin_id: &PluginId,
        requested: impl IntoIterator<Item = Capability>,
    ) -> CapabilityResult<()> {
        let requested: BTreeSet<Capability> = requested.into_iter().collect();
        let mut entries = self.write()?;
        let entry = entries.entry(plugin_id.clone()).or_default();
        entry.granted.retain(|cap| requested.contains(cap));
        entry.requested = requested;
        debug!(plugin_id = %plugin_id, requested = ?entry.requested, "Declared requested capabilities");
        Ok(())
    }

    /// Grant a capability.
    ///
    /// Granting an already-granted capability is a no-op.
    ///
    /// # Errors
    ///
    /// - [`CapabilityError::UnknownPlugin`] if the plugin was never declared.
    /// - [`CapabilityError::UnrequestedCapability`] if the manifest did not
    ///   request `capability`.
    pub fn grant(&self, plugin_id: &PluginId, capability: Capability) -> CapabilityResult<()> {
        let mut entries = self.write()?;
        let entry = entries
            .get_mut(plugin_id)
            .ok_or_else(|| CapabilityError::UnknownPlugin(plugin_id.clone()))?;
        if !entry.requested.contains(&capability) {
            return Err(CapabilityError::UnrequestedCapability {
                plugin_id: plugin_id.clone(),
                capability,
            });
        }
        if entry.granted.insert(capability) {
            info!(plugin_id = %plugin_id, capability = %capability, "Granted capability");
        }
        Ok(())
    }

    /// Revoke a capability. Returns `true` if it was granted.
    ///
    /// Revoking from an unknown plugin, or revoking something never granted,
    /// returns `false`.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::StateError`] if the ledger lock is poisoned.
    pub fn revoke(&self, plugin_id: &PluginId, capability: Capability) -> CapabilityResult<bool> {
        let mut entries = self.write()?;
        let revoked = entries
            .get_mut(plugin_id)
            .is_some_and(|entry| entry.granted.remove(&capability));
        if revoked {
            info!(plugin_id = %plugin_id, capability = %capability, "Revoked capability");
        }
        Ok(revoked)
    }

    /// Whether `capability` is currently granted to `plugin_id`.
    ///
    /// A poisoned ledger answers `false`.
    #[must_use]
    pub fn has(&self, plugin_id: &PluginId, capability: Capability) -> bool {
        self.entries
            .read()
            .map(|entries| {
                entries
                    .get(plugin_id)
                    .is_some_and(|entry| entry.granted.contains(&capability))
            })
            .unwrap_or(false)
    }

    /// The capabilities currently granted to a plugin.
    #[must_use]
    pub fn granted(&self, plugin_id: &PluginId) -> BTreeSet<Capability> {
        self.entries
            .read()
            .ok()
            .and_then(|entries| entries.get(plugin_id).map(|e| e.granted.clone()))
            .unwrap_or_default()
    }

    /// The capabilities a plugin's manifest requested.
    #[must_use]
    pub fn requested(&self, plugin_id: &PluginId) -> BTreeSet<Capability> {
        self.entries
            .read()
            .ok()
            .and_then(|entries| entries.get(plugin_id).map(|e| e.requested.clone()))
            .unwrap_or_default()
    }

    /// Whether the plugin has been declared.
    #[must_use]
    pub fn is_declared(&self, plugin_id: &PluginId) -> bool {
        self.entries
            .read()
            .map(|entries| entries.contains_key(plugin_id))
            .unwrap_or(false)
    }

    /// Drop everything recorded for a plugin. Returns `true` if it was known.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::StateError`] if the ledger lock is poisoned.
    pub fn forget(&self, plugin_id: &PluginId) -> CapabilityResult<bool> {
        let removed = self.write()?.remove(plugin_id).is_some();
        if removed {
            debug!(plugin_id = %plugin_id, "Forgot plugin permissions");
        }
        Ok(removed)
    }

    // -- Persistence --

    /// Save every plugin's grants to `store`, one key per plugin id.
    ///
    /// Keys for plugins the ledger no longer knows are removed, so the
    /// store mirrors the ledger after a successful call.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::Storage`] if the backend fails.
    pub async fn persist(&self, store: &NamespacedStore) -> CapabilityResult<()> {
        let snapshot: Vec<(PluginId, Vec<Capability>)> = {
            let entries = self.read()?;
            entries
                .iter()
                .map(|(id, entry)| (id.clone(), entry.granted.iter().copied().collect()))
                .collect()
        };

        for key in store.list_keys().await? {
            if !snapshot.iter().any(|(id, _)| id.as_str() == key) {
                store.remove(&key).await?;
            }
        }
        for (plugin_id, granted) in &snapshot {
            store.set_json(plugin_id.as_str(), granted).await?;
        }

        debug!(namespace = store.namespace(), plugins = snapshot.len(), "Persisted ledger");
        Ok(())
    }

    /// Re-apply grants saved by [`persist`](Self::persist).
    ///
    /// Only plugins already declared are restored, and only grants still in
    /// their requested set are applied. Returns the number of grants applied.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::Storage`] if the backend fails or a saved
    /// entry cannot be decoded.
    pub async fn restore(&self, store: &NamespacedStore) -> CapabilityResult<usize> {
        let mut saved = Vec::new();
        for key in store.list_keys().await? {
            let Ok(plugin_id) = PluginId::new(key.as_str()) else {
                warn!(key = %key, "Skipping ledger entry with invalid plugin id");
                continue;
            };
            if let Some(granted) = store.get_json::<Vec<Capability>>(&key).await? {
                saved.push((plugin_id, granted));
            }
        }

        let mut applied: usize = 0;
        let mut entries = self.write()?;
        for (plugin_id, granted) in saved {
            let Some(entry) = entries.get_mut(&plugin_id) else {
                debug!(plugin_id = %plugin_id, "Saved grants for undeclared plugin ignored");
                continue;
            };
            for capability in granted {
                if entry.requested.contains(&capability) && entry.granted.insert(capability) {
                    applied = applied.saturating_add(1);
                }
            }
        }

        info!(applied, "Restored ledger grants");
        Ok(applied)
    }

    fn read(
        &self,
    ) -> CapabilityResult<std::sync::RwLockReadGuard<'_, HashMap<PluginId, LedgerEntry>>> {
        self.entries
            .read()
            .map_err(|e| CapabilityError::StateError(e.to_string()))
    }

    fn write(
        &self,
    ) -> CapabilityResult<std::sync::RwLockWriteGuard<'_, HashMap<PluginId, LedgerEntry>>> {
        self.entries
            .write()
            .map_err(|e| CapabilityError::StateError(e.to_string()))
    }
}

impl std::fmt::Debug for PermissionLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let plugins = self.entries.read().map(|e| e.len()).unwrap_or(0);
        f.debug_struct("PermissionLedger")
            .field("plugins", &plugins)
            .finish()
    }
}
