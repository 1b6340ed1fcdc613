//! The capability gate: mints scoped API handles backed by the ledger.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};
use trellis_audit::{AuditHook, AuditRecord};
use trellis_capabilities::PermissionLedger;
use trellis_core::{Capability, PluginId};
use trellis_events::MessageRouter;
use trellis_storage::{KvStore, NamespacedStore};

use crate::api::PluginApi;
use crate::descriptor::PluginDescriptor;
use crate::error::{PluginError, PluginResult};
use crate::services::HostServices;

/// Revocable right to use one [`PluginApi`] and all its clones.
///
/// Revocation is observed at the start of the next call. A call that has
/// already passed its checks runs to completion.
pub(crate) struct ApiLease {
    plugin_id: PluginId,
    revoked: AtomicBool,
}

impl ApiLease {
    fn new(plugin_id: PluginId) -> Self {
        Self {
            plugin_id,
            revoked: AtomicBool::new(false),
        }
    }

    pub(crate) fn revoke(&self) {
        if !self.revoked.swap(true, Ordering::AcqRel) {
            debug!(plugin_id = %self.plugin_id, "API lease revoked");
        }
    }

    pub(crate) fn is_revoked(&self) -> bool {
        self.revoked.load(Ordering::Acquire)
    }
}

impl fmt::Debug for ApiLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiLease")
            .field("plugin_id", &self.plugin_id)
            .field("revoked", &self.is_revoked())
            .finish()
    }
}

/// Check one capability for one plugin.
///
/// A denial is reported to `audit` exactly once and returned as
/// [`PluginError::PermissionDenied`].
pub(crate) fn authorize(
    ledger: &PermissionLedger,
    audit: &dyn AuditHook,
    plugin_id: &PluginId,
    capability: Capability,
) -> PluginResult<()> {
    if ledger.has(plugin_id, capability) {
        return Ok(());
    }
    debug!(plugin_id = %plugin_id, capability = %capability, "Capability denied");
    audit.record(AuditRecord::permission_denied(plugin_id, capability));
    Err(PluginError::PermissionDenied {
        plugin_id: plugin_id.clone(),
        capability,
    })
}

/// Builds the bounded API surface handed to each active plugin.
///
/// Every operation of every capability group checks the
/// [`PermissionLedger`] before touching the subsystem behind it. The
/// handle never exposes the store, router or services themselves.
#[derive(Clone)]
pub struct CapabilityGate {
    ledger: Arc<PermissionLedger>,
    audit: Arc<dyn AuditHook>,
    store: Arc<dyn KvStore>,
    router: Arc<MessageRouter>,
    services: HostServices,
}

impl CapabilityGate {
    /// Create a gate over the host's subsystems.
    #[must_use]
    pub fn new(
        ledger: Arc<PermissionLedger>,
        audit: Arc<dyn AuditHook>,
        store: Arc<dyn KvStore>,
        router: Arc<MessageRouter>,
        services: HostServices,
    ) -> Self {
        Self {
            ledger,
            audit,
            store,
            router,
            services,
        }
    }

    /// Mint a fresh API handle for `descriptor`'s plugin.
    ///
    /// Each call creates a new lease; releasing one handle does not affect
    /// handles built by other calls.
    #[must_use]
    pub fn build_api(&self, descriptor: &PluginDescriptor) -> PluginApi {
        let plugin_id = descriptor.id().clone();
        info!(
            plugin_id = %plugin_id,
            granted = ?self.ledger.granted(&plugin_id),
            "Built plugin API"
        );
        PluginApi::new(
            plugin_id.clone(),
            Arc::new(ApiLease::new(plugin_id.clone())),
            Arc::clone(&self.ledger),
            Arc::clone(&self.audit),
            NamespacedStore::for_plugin(Arc::clone(&self.store), &plugin_id),
            Arc::clone(&self.router),
            self.services.clone(),
        )
    }

    /// Check a capability outside of any API handle, reporting a denial
    /// like a gated call would.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::PermissionDenied`] if the grant is missing.
    pub fn check(&self, plugin_id: &PluginId, capability: Capability) -> PluginResult<()> {
        authorize(&self.ledger, self.audit.as_ref(), plugin_id, capability)
    }
}

impl fmt::Debug for CapabilityGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityGate")
            .field("router", &self.router)
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}
