//! Plugin registry.
//!
//! Owns every plugin's descriptor and lifecycle state, and wires the
//! dependency resolver, permission ledger, capability gate and message
//! router together.
//!
//! State transitions are synchronous and serialized by the registry lock.
//! Resolution additionally holds an async mutex for its whole run, so two
//! `load` calls never interleave their graph snapshots.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use trellis_audit::{AuditHook, AuditRecord, TracingAuditHook};
use trellis_capabilities::{LEDGER_NAMESPACE, PermissionLedger};
use trellis_core::{Capability, PluginId};
use trellis_events::{MessageHandler, MessageRouter, NotificationChannel};
use trellis_storage::{KvStore, MemoryKvStore, NamespacedStore};

use crate::api::PluginApi;
use crate::descriptor::{PluginDescriptor, PluginStatus};
use crate::error::{PluginError, PluginResult};
use crate::gate::{ApiLease, CapabilityGate};
use crate::manifest::PluginManifest;
use crate::resolver::DependencyResolver;
use crate::services::HostServices;

// ---------------------------------------------------------------------------
// PermissionPolicy
// ---------------------------------------------------------------------------

/// Which requested capabilities are granted without an explicit call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionPolicy {
    auto_grant: BTreeSet<Capability>,
}

impl PermissionPolicy {
    /// A policy that grants nothing automatically.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant these capabilities at registration to any plugin requesting
    /// them.
    #[must_use]
    pub fn auto_grant(mut self, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        self.auto_grant.extend(capabilities);
        self
    }

    /// Whether `capability` is granted at registration.
    #[must_use]
    pub fn grants_automatically(&self, capability: Capability) -> bool {
        self.auto_grant.contains(&capability)
    }
}

#[cfg(feature = "config")]
impl From<&trellis_config::PermissionsSection> for PermissionPolicy {
    fn from(section: &trellis_config::PermissionsSection) -> Self {
        Self::new().auto_grant(section.auto_grant_capabilities())
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for [`PluginRegistry`].
///
/// Everything is optional: the defaults are an in-memory store, a tracing
/// audit hook, no cross-process channel and no host services.
#[derive(Default)]
pub struct PluginRegistryBuilder {
    audit: Option<Arc<dyn AuditHook>>,
    store: Option<Arc<dyn KvStore>>,
    channel: Option<Arc<dyn NotificationChannel>>,
    services: HostServices,
    policy: PermissionPolicy,
    dedupe_window: Option<usize>,
}

impl PluginRegistryBuilder {
    /// Report denials, handler failures and resolution failures here.
    #[must_use]
    pub fn audit(mut self, audit: Arc<dyn AuditHook>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// The shared storage backend.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn KvStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Publish broadcasts on, and accept them from, this channel.
    #[must_use]
    pub fn channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Services behind the `network`, `ui`, `clipboard` and
    /// `notifications` groups.
    #[must_use]
    pub fn services(mut self, services: HostServices) -> Self {
        self.services = services;
        self
    }

    /// Automatic grant policy.
    #[must_use]
    pub fn policy(mut self, policy: PermissionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Remote message ids remembered for deduplication.
    #[must_use]
    pub fn dedupe_window(mut self, capacity: usize) -> Self {
        self.dedupe_window = Some(capacity);
        self
    }

    /// Apply the router and permission sections of a host config. A local
    /// channel sized by `router.channel_capacity` is installed unless one
    /// was already set.
    #[cfg(feature = "config")]
    #[must_use]
    pub fn config(mut self, config: &trellis_config::HostConfig) -> Self {
        if self.channel.is_none() {
            self.channel = Some(Arc::new(
                trellis_events::LocalNotificationChannel::with_capacity(
                    config.router.channel_capacity,
                ),
            ));
        }
        self.dedupe_window = Some(config.router.dedupe_window);
        self.policy = PermissionPolicy::from(&config.permissions);
        self
    }

    /// Build the registry.
    #[must_use]
    pub fn build(self) -> PluginRegistry {
        let audit = self
            .audit
            .unwrap_or_else(|| Arc::new(TracingAuditHook) as Arc<dyn AuditHook>);
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryKvStore::new()) as Arc<dyn KvStore>);

        let mut router = MessageRouter::new(Arc::clone(&audit));
        if let Some(channel) = self.channel {
            router = router.with_channel(channel);
        }
        if let Some(capacity) = self.dedupe_window {
            router = router.with_dedupe_window(capacity);
        }
        let router = Arc::new(router);
        let ledger = Arc::new(PermissionLedger::new());
        let gate = CapabilityGate::new(
            Arc::clone(&ledger),
            Arc::clone(&audit),
            Arc::clone(&store),
            Arc::clone(&router),
            self.services,
        );

        PluginRegistry {
            entries: RwLock::new(HashMap::new()),
            resolution: Mutex::new(()),
            ledger,
            audit,
            store,
            router,
            gate,
            policy: self.policy,
        }
    }
}

impl fmt::Debug for PluginRegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistryBuilder")
            .field("policy", &self.policy)
            .field("dedupe_window", &self.dedupe_window)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// PluginRegistry
// ---------------------------------------------------------------------------

struct PluginEntry {
    descriptor: PluginDescriptor,
    lease: Option<Arc<ApiLease>>,
}

impl PluginEntry {
    fn release(&mut self) {
        if let Some(lease) = self.lease.take() {
            lease.revoke();
        }
    }
}

/// Lifecycle orchestrator for every plugin in one host.
///
/// ```text
/// Registered --load--> Resolving --> Loaded --activate--> Active
///     ^                    |                            |    ^
///     +--retry-- Failed <--+              deactivate    v    | activate
///                                              Deactivated --+
/// ```
///
/// `unload` tears a plugin down from any state but `Failed`;
/// `unregister` does the same from any state at all.
pub struct PluginRegistry {
    entries: RwLock<HashMap<PluginId, PluginEntry>>,
    resolution: Mutex<()>,
    ledger: Arc<PermissionLedger>,
    audit: Arc<dyn AuditHook>,
    store: Arc<dyn KvStore>,
    router: Arc<MessageRouter>,
    gate: CapabilityGate,
    policy: PermissionPolicy,
}

impl PluginRegistry {
    /// A registry with default collaborators.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start building a registry.
    #[must_use]
    pub fn builder() -> PluginRegistryBuilder {
        PluginRegistryBuilder::default()
    }

    /// The permission ledger.
    #[must_use]
    pub fn ledger(&self) -> &Arc<PermissionLedger> {
        &self.ledger
    }

    /// The message router.
    #[must_use]
    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.router
    }

    /// The capability gate.
    #[must_use]
    pub fn gate(&self) -> &CapabilityGate {
        &self.gate
    }

    // -- registration --

    /// Validate a manifest and register the plugin.
    ///
    /// Requested capabilities named by the [`PermissionPolicy`] are granted
    /// immediately.
    ///
    /// # Errors
    ///
    /// - [`PluginError::InvalidManifest`] if validation fails.
    /// - [`PluginError::DuplicatePluginId`] if the id is taken.
    pub fn register(&self, manifest: &PluginManifest) -> PluginResult<PluginId> {
        let descriptor = manifest.validate()?;
        let id = descriptor.id().clone();

        let mut entries = self.write()?;
        if entries.contains_key(&id) {
            return Err(PluginError::DuplicatePluginId(id));
        }

        let requested = descriptor.requested_permissions().clone();
        self.ledger.declare(&id, requested.iter().copied())?;
        for capability in requested
            .iter()
            .copied()
            .filter(|c| self.policy.grants_automatically(*c))
        {
            self.ledger.grant(&id, capability)?;
        }

        info!(
            plugin_id = %id,
            version = %descriptor.version(),
            dependencies = descriptor.dependencies().len(),
            "Registered plugin"
        );
        entries.insert(
            id.clone(),
            PluginEntry {
                descriptor,
                lease: None,
            },
        );
        Ok(id)
    }

    /// Load a manifest file and register it.
    ///
    /// # Errors
    ///
    /// [`PluginError::ManifestParseError`] if the file cannot be read or
    /// parsed, otherwise as for [`register`](Self::register).
    pub fn register_file(&self, path: &Path) -> PluginResult<PluginId> {
        let manifest = PluginManifest::load(path)?;
        self.register(&manifest)
    }

    /// Tear down and remove a plugin in any state, including `Failed`.
    ///
    /// Its grants are forgotten; its stored data is kept.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NotFound`] if the plugin is not registered.
    pub fn unregister(&self, id: &PluginId) -> PluginResult<PluginDescriptor> {
        let mut entries = self.write()?;
        let mut entry = entries
            .remove(id)
            .ok_or_else(|| PluginError::NotFound(id.clone()))?;
        self.teardown(&mut entry)?;
        info!(plugin_id = %id, status = %entry.descriptor.status(), "Unregistered plugin");
        Ok(entry.descriptor)
    }

    // -- resolution --

    /// Compute the load order for `id` without changing any state.
    ///
    /// # Errors
    ///
    /// Any resolver error: [`PluginError::NotFound`],
    /// [`PluginError::CyclicDependency`], [`PluginError::MissingDependency`],
    /// [`PluginError::VersionIncompatible`] or
    /// [`PluginError::UnsupportedVersionSpec`].
    pub fn resolve(&self, id: &PluginId) -> PluginResult<Vec<PluginId>> {
        let snapshot = self.snapshot()?;
        DependencyResolver::new(&snapshot).resolve(id)
    }

    /// Resolve `id` and move it and every not-yet-loaded dependency to
    /// `Loaded`, dependencies first.
    ///
    /// Returns the ids this call loaded, in load order. Loading a plugin
    /// that is already loaded returns an empty list.
    ///
    /// On failure the plugin enters `Failed`, the failure is reported to
    /// the audit hook, and the error is returned. Dependencies are left as
    /// they were.
    ///
    /// # Errors
    ///
    /// - [`PluginError::NotFound`] if `id` is not registered.
    /// - [`PluginError::InvalidTransition`] if `id` is `Failed`.
    /// - Any resolver error, or [`PluginError::ResolutionFailed`] if a
    ///   dependency has itself failed.
    pub async fn load(&self, id: &PluginId) -> PluginResult<Vec<PluginId>> {
        let _serialized = self.resolution.lock().await;

        let snapshot = {
            let mut entries = self.write()?;
            let entry = entries
                .get_mut(id)
                .ok_or_else(|| PluginError::NotFound(id.clone()))?;
            match entry.descriptor.status() {
                PluginStatus::Registered => entry.descriptor.set_status(PluginStatus::Resolving),
                status if status.is_loaded() => {
                    debug!(plugin_id = %id, status = %status, "Plugin already loaded");
                    return Ok(Vec::new());
                },
                status => {
                    return Err(PluginError::InvalidTransition {
                        plugin_id: id.clone(),
                        status,
                        action: "load",
                    });
                },
            }
            debug!(plugin_id = %id, "Resolving plugin");
            entries
                .iter()
                .map(|(k, e)| (k.clone(), e.descriptor.clone()))
                .collect::<HashMap<_, _>>()
        };

        let outcome = DependencyResolver::new(&snapshot)
            .resolve(id)
            .and_then(|order| self.apply_load(id, &order));

        match outcome {
            Ok(loaded) => {
                info!(plugin_id = %id, loaded = ?loaded, "Loaded plugin");
                Ok(loaded)
            },
            Err(e) => {
                self.fail(id, &e);
                Err(e)
            },
        }
    }

    /// Move a `Failed` plugin back to `Registered` so it can be loaded
    /// again.
    ///
    /// # Errors
    ///
    /// [`PluginError::NotFound`], or [`PluginError::InvalidTransition`] if
    /// the plugin has not failed.
    pub fn retry(&self, id: &PluginId) -> PluginResult<()> {
        let mut entries = self.write()?;
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| PluginError::NotFound(id.clone()))?;
        let status = entry.descriptor.status();
        if status != PluginStatus::Failed {
            return Err(PluginError::InvalidTransition {
                plugin_id: id.clone(),
                status,
                action: "retry",
            });
        }
        entry.descriptor.set_status(PluginStatus::Registered);
        info!(plugin_id = %id, "Plugin reset for retry");
        Ok(())
    }

    // -- activation --

    /// Activate a `Loaded` or `Deactivated` plugin.
    ///
    /// Opens the plugin's mailbox, subscribes `handlers` in order and
    /// returns a fresh API handle.
    ///
    /// # Errors
    ///
    /// - [`PluginError::NotFound`] or [`PluginError::InvalidTransition`].
    /// - [`PluginError::MissingDependency`] or
    ///   [`PluginError::ResolutionFailed`] if a dependency was unloaded or
    ///   is no longer loaded since this plugin was. The plugin is left
    ///   `Failed` and the error is audited.
    /// - [`PluginError::Router`] if no tokio runtime is running.
    pub fn activate(
        &self,
        id: &PluginId,
        handlers: impl IntoIterator<Item = Arc<dyn MessageHandler>>,
    ) -> PluginResult<PluginApi> {
        let mut entries = self.write()?;
        let entry = entries
            .get(id)
            .ok_or_else(|| PluginError::NotFound(id.clone()))?;
        let status = entry.descriptor.status();
        if !matches!(status, PluginStatus::Loaded | PluginStatus::Deactivated) {
            return Err(PluginError::InvalidTransition {
                plugin_id: id.clone(),
                status,
                action: "activate",
            });
        }
        if let Some(err) = unmet_dependency(id, &entry.descriptor, &entries) {
            self.report_failure(id, &err);
            if let Some(entry) = entries.get_mut(id) {
                entry.descriptor.fail(err.to_string());
            }
            return Err(err);
        }

        self.router.attach(id)?;
        for handler in handlers {
            if let Err(e) = self.router.subscribe(id, handler) {
                if let Err(detach_err) = self.router.detach(id) {
                    warn!(plugin_id = %id, error = %detach_err, "Failed to close mailbox");
                }
                return Err(e.into());
            }
        }

        let entry = entries
            .get_mut(id)
            .ok_or_else(|| PluginError::NotFound(id.clone()))?;
        let api = self.gate.build_api(&entry.descriptor);
        entry.release();
        entry.lease = Some(api.lease());
        entry.descriptor.set_status(PluginStatus::Active);
        info!(plugin_id = %id, handlers = self.router.handler_count(id), "Activated plugin");
        Ok(api)
    }

    /// Deactivate an `Active` plugin: release its API handle and close its
    /// mailbox. Stored data is kept.
    ///
    /// # Errors
    ///
    /// [`PluginError::NotFound`] or [`PluginError::InvalidTransition`].
    pub fn deactivate(&self, id: &PluginId) -> PluginResult<()> {
        let mut entries = self.write()?;
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| PluginError::NotFound(id.clone()))?;
        let status = entry.descriptor.status();
        if status != PluginStatus::Active {
            return Err(PluginError::InvalidTransition {
                plugin_id: id.clone(),
                status,
                action: "deactivate",
            });
        }
        self.router.detach(id)?;
        entry.release();
        entry.descriptor.set_status(PluginStatus::Deactivated);
        info!(plugin_id = %id, "Deactivated plugin");
        Ok(())
    }

    /// Forced teardown. Releases the API handle, closes the mailbox (queued
    /// messages are dropped undelivered), forgets grants and removes the
    /// descriptor, which is returned in the `Unloaded` state. Stored data
    /// is kept. Dependents are not unloaded.
    ///
    /// # Errors
    ///
    /// [`PluginError::NotFound`], or [`PluginError::InvalidTransition`] for
    /// a `Failed` plugin (use [`unregister`](Self::unregister)).
    pub fn unload(&self, id: &PluginId) -> PluginResult<PluginDescriptor> {
        let mut entries = self.write()?;
        let entry = entries
            .get(id)
            .ok_or_else(|| PluginError::NotFound(id.clone()))?;
        let status = entry.descriptor.status();
        if !status.can_unload() {
            return Err(PluginError::InvalidTransition {
                plugin_id: id.clone(),
                status,
                action: "unload",
            });
        }
        let mut entry = entries
            .remove(id)
            .ok_or_else(|| PluginError::NotFound(id.clone()))?;
        self.teardown(&mut entry)?;
        entry.descriptor.set_status(PluginStatus::Unloaded);

        let dependents = dependents_of(&entries, id);
        if dependents.is_empty() {
            info!(plugin_id = %id, from = %status, "Unloaded plugin");
        } else {
            warn!(plugin_id = %id, from = %status, dependents = ?dependents, "Unloaded plugin with remaining dependents");
        }
        Ok(entry.descriptor)
    }

    // -- permissions --

    /// Grant a requested capability.
    ///
    /// # Errors
    ///
    /// [`PluginError::Capability`] wrapping `UnrequestedCapability` or
    /// `UnknownPlugin`.
    pub fn grant(&self, id: &PluginId, capability: Capability) -> PluginResult<()> {
        Ok(self.ledger.grant(id, capability)?)
    }

    /// Revoke a capability. Returns `true` if it was granted. Takes effect
    /// on the plugin's next gated call.
    ///
    /// # Errors
    ///
    /// [`PluginError::Capability`] if the ledger is unusable.
    pub fn revoke(&self, id: &PluginId, capability: Capability) -> PluginResult<bool> {
        Ok(self.ledger.revoke(id, capability)?)
    }

    /// Whether `capability` is granted to `id`.
    #[must_use]
    pub fn has_permission(&self, id: &PluginId, capability: Capability) -> bool {
        self.ledger.has(id, capability)
    }

    /// Save all grants to the reserved ledger namespace of the store.
    ///
    /// # Errors
    ///
    /// Storage errors, including [`PluginError::StorageUnavailable`].
    pub async fn persist_permissions(&self) -> PluginResult<()> {
        let store = self.ledger_store()?;
        Ok(self.ledger.persist(&store).await?)
    }

    /// Re-apply saved grants for currently registered plugins. Returns the
    /// number of grants applied.
    ///
    /// # Errors
    ///
    /// Storage errors, including [`PluginError::StorageUnavailable`].
    pub async fn restore_permissions(&self) -> PluginResult<usize> {
        let store = self.ledger_store()?;
        Ok(self.ledger.restore(&store).await?)
    }

    // -- queries --

    /// Current state of a plugin.
    #[must_use]
    pub fn status(&self, id: &PluginId) -> Option<PluginStatus> {
        self.read()
            .ok()?
            .get(id)
            .map(|entry| entry.descriptor.status())
    }

    /// A copy of a plugin's descriptor.
    #[must_use]
    pub fn descriptor(&self, id: &PluginId) -> Option<PluginDescriptor> {
        self.read()
            .ok()?
            .get(id)
            .map(|entry| entry.descriptor.clone())
    }

    /// Every registered descriptor, sorted by id.
    #[must_use]
    pub fn list(&self) -> Vec<PluginDescriptor> {
        let Ok(entries) = self.read() else {
            return Vec::new();
        };
        let mut all: Vec<PluginDescriptor> =
            entries.values().map(|e| e.descriptor.clone()).collect();
        all.sort_by(|a, b| a.id().cmp(b.id()));
        all
    }

    /// Ids of `Active` plugins, sorted.
    #[must_use]
    pub fn active_plugins(&self) -> Vec<PluginId> {
        let Ok(entries) = self.read() else {
            return Vec::new();
        };
        let mut active: Vec<PluginId> = entries
            .iter()
            .filter(|(_, e)| e.descriptor.status() == PluginStatus::Active)
            .map(|(id, _)| id.clone())
            .collect();
        active.sort();
        active
    }

    /// Registered plugins that declare a direct dependency on `id`, sorted.
    #[must_use]
    pub fn dependents(&self, id: &PluginId) -> Vec<PluginId> {
        self.read()
            .map(|entries| dependents_of(&entries, id))
            .unwrap_or_default()
    }

    /// Number of registered plugins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether no plugins are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start delivering broadcasts from other host instances. See
    /// [`MessageRouter::listen`].
    ///
    /// # Errors
    ///
    /// [`PluginError::Router`] if no tokio runtime is running.
    pub fn listen(&self) -> PluginResult<Option<JoinHandle<()>>> {
        Ok(self.router.listen()?)
    }

    // -- internals --

    fn apply_load(&self, root: &PluginId, order: &[PluginId]) -> PluginResult<Vec<PluginId>> {
        let mut entries = self.write()?;

        // Validate everything before touching anything.
        for id in order {
            let entry = entries.get(id).ok_or_else(|| PluginError::ResolutionFailed {
                plugin_id: root.clone(),
                reason: format!("{id} was unregistered during resolution"),
            })?;
            let status = entry.descriptor.status();
            let ok = if id == root {
                status == PluginStatus::Resolving
            } else {
                status == PluginStatus::Registered || status.is_loaded()
            };
            if !ok {
                return Err(PluginError::ResolutionFailed {
                    plugin_id: root.clone(),
                    reason: format!("dependency {id} is {status}"),
                });
            }
        }

        let mut loaded = Vec::new();
        for id in order {
            if let Some(entry) = entries.get_mut(id)
                && !entry.descriptor.status().is_loaded()
            {
                entry.descriptor.set_status(PluginStatus::Loaded);
                debug!(plugin_id = %id, "Plugin loaded");
                loaded.push(id.clone());
            }
        }
        Ok(loaded)
    }

    fn report_failure(&self, id: &PluginId, error: &PluginError) {
        warn!(plugin_id = %id, error = %error, "Plugin resolution failed");
        self.audit.record(AuditRecord::resolution_failed(id, error));
    }

    fn fail(&self, id: &PluginId, error: &PluginError) {
        self.report_failure(id, error);
        match self.entries.write() {
            Ok(mut entries) => {
                if let Some(entry) = entries.get_mut(id)
                    && entry.descriptor.status() == PluginStatus::Resolving
                {
                    entry.descriptor.fail(error.to_string());
                }
            },
            Err(e) => warn!(plugin_id = %id, error = %e, "Registry state poisoned"),
        }
    }

    fn teardown(&self, entry: &mut PluginEntry) -> PluginResult<()> {
        let id = entry.descriptor.id().clone();
        self.router.detach(&id)?;
        entry.release();
        self.ledger.forget(&id)?;
        Ok(())
    }

    fn ledger_store(&self) -> PluginResult<NamespacedStore> {
        Ok(NamespacedStore::system(
            Arc::clone(&self.store),
            LEDGER_NAMESPACE,
        )?)
    }

    fn snapshot(&self) -> PluginResult<HashMap<PluginId, PluginDescriptor>> {
        Ok(self
            .read()?
            .iter()
            .map(|(k, e)| (k.clone(), e.descriptor.clone()))
            .collect())
    }

    fn read(&self) -> PluginResult<RwLockReadGuard<'_, HashMap<PluginId, PluginEntry>>> {
        self.entries
            .read()
            .map_err(|e| PluginError::StateError(e.to_string()))
    }

    fn write(&self) -> PluginResult<RwLockWriteGuard<'_, HashMap<PluginId, PluginEntry>>> {
        self.entries
            .write()
            .map_err(|e| PluginError::StateError(e.to_string()))
    }
}

fn dependents_of(entries: &HashMap<PluginId, PluginEntry>, id: &PluginId) -> Vec<PluginId> {
    let mut dependents: Vec<PluginId> = entries
        .values()
        .filter(|e| e.descriptor.depends_on(id))
        .map(|e| e.descriptor.id().clone())
        .collect();
    dependents.sort();
    dependents
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.len())
            .field("router", &self.router)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// The first dependency of `descriptor` that is gone or not loaded.
fn unmet_dependency(
    id: &PluginId,
    descriptor: &PluginDescriptor,
    entries: &HashMap<PluginId, PluginEntry>,
) -> Option<PluginError> {
    descriptor.dependencies().keys().find_map(|dependency| {
        match entries.get(dependency).map(|d| d.descriptor.status()) {
            None => Some(PluginError::MissingDependency {
                dependent: id.clone(),
                dependency: dependency.clone(),
                chain: vec![id.clone(), dependency.clone()],
            }),
            Some(status) if !status.is_loaded() => Some(PluginError::ResolutionFailed {
                plugin_id: id.clone(),
                reason: format!("dependency {dependency} is {status}"),
            }),
            Some(_) => None,
        }
    })
}
