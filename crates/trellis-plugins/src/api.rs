//! The scoped API handle given to an active plugin.
//!
//! [`PluginApi`] exposes one accessor per capability group. Every method
//! on a group first checks the handle's lease, then the permission ledger
//! for that group's capability, and only then delegates. The ledger is
//! consulted once per call: revoking a grant mid-call does not change the
//! outcome of that call.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use trellis_audit::AuditHook;
use trellis_capabilities::PermissionLedger;
use trellis_core::{Capability, PluginId};
use trellis_events::{MessageHandler, MessageId, MessageRouter, SubscriptionId};
use trellis_storage::NamespacedStore;

use crate::error::{PluginError, PluginResult};
use crate::gate::{ApiLease, authorize};
use crate::services::{
    ActionSpec, HostServices, HttpRequest, HttpResponse, Notification, PanelSpec, ServiceError,
    UiHandle,
};

struct ApiInner {
    plugin_id: PluginId,
    lease: Arc<ApiLease>,
    ledger: Arc<PermissionLedger>,
    audit: Arc<dyn AuditHook>,
    store: NamespacedStore,
    router: Arc<MessageRouter>,
    services: HostServices,
}

impl ApiInner {
    fn authorize(&self, capability: Capability) -> PluginResult<()> {
        if self.lease.is_revoked() {
            return Err(PluginError::ApiReleased(self.plugin_id.clone()));
        }
        authorize(&self.ledger, self.audit.as_ref(), &self.plugin_id, capability)
    }
}

fn service_error(capability: Capability) -> impl FnOnce(ServiceError) -> PluginError {
    move |source| PluginError::Service { capability, source }
}

/// Scoped, revocable API handle for one plugin.
///
/// Cheap to clone; all clones share one lease. Built by
/// [`CapabilityGate::build_api`](crate::CapabilityGate::build_api).
#[derive(Clone)]
pub struct PluginApi {
    inner: Arc<ApiInner>,
}

impl PluginApi {
    pub(crate) fn new(
        plugin_id: PluginId,
        lease: Arc<ApiLease>,
        ledger: Arc<PermissionLedger>,
        audit: Arc<dyn AuditHook>,
        store: NamespacedStore,
        router: Arc<MessageRouter>,
        services: HostServices,
    ) -> Self {
        Self {
            inner: Arc::new(ApiInner {
                plugin_id,
                lease,
                ledger,
                audit,
                store,
                router,
                services,
            }),
        }
    }

    pub(crate) fn lease(&self) -> Arc<ApiLease> {
        Arc::clone(&self.inner.lease)
    }

    /// The plugin this handle belongs to.
    #[must_use]
    pub fn plugin_id(&self) -> &PluginId {
        &self.inner.plugin_id
    }

    /// Whether the handle was released by deactivation or unload.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.inner.lease.is_revoked()
    }

    /// Whether the plugin currently holds `capability`.
    ///
    /// A query only: it is not audited and authorizes nothing.
    #[must_use]
    pub fn can(&self, capability: Capability) -> bool {
        !self.is_released() && self.inner.ledger.has(&self.inner.plugin_id, capability)
    }

    /// Namespaced key-value storage (`storage`).
    #[must_use]
    pub fn storage(&self) -> StorageApi<'_> {
        StorageApi { api: &self.inner }
    }

    /// Outbound network requests (`network`).
    #[must_use]
    pub fn network(&self) -> NetworkApi<'_> {
        NetworkApi { api: &self.inner }
    }

    /// Presentation requests (`ui`).
    #[must_use]
    pub fn ui(&self) -> UiApi<'_> {
        UiApi { api: &self.inner }
    }

    /// Messaging with other plugins (`messaging`).
    #[must_use]
    pub fn messaging(&self) -> MessagingApi<'_> {
        MessagingApi { api: &self.inner }
    }

    /// System clipboard (`clipboard`).
    #[must_use]
    pub fn clipboard(&self) -> ClipboardApi<'_> {
        ClipboardApi { api: &self.inner }
    }

    /// System notifications (`notifications`).
    #[must_use]
    pub fn notifications(&self) -> NotificationsApi<'_> {
        NotificationsApi { api: &self.inner }
    }
}

impl fmt::Debug for PluginApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginApi")
            .field("plugin_id", &self.inner.plugin_id)
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// storage
// ---------------------------------------------------------------------------

/// Storage scoped to the plugin's own namespace.
///
/// Backend outages surface as [`PluginError::StorageUnavailable`]; nothing
/// is retried or queued on the plugin's behalf.
pub struct StorageApi<'a> {
    api: &'a ApiInner,
}

impl StorageApi<'_> {
    /// Read raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::PermissionDenied`] without the `storage`
    /// grant, [`PluginError::ApiReleased`] after release, or a storage
    /// error.
    pub async fn get(&self, key: &str) -> PluginResult<Option<Vec<u8>>> {
        self.api.authorize(Capability::Storage)?;
        Ok(self.api.store.get(key).await?)
    }

    /// Write raw bytes. Concurrent writes to one key: last writer wins.
    ///
    /// # Errors
    ///
    /// As for [`get`](Self::get).
    pub async fn set(&self, key: &str, value: Vec<u8>) -> PluginResult<()> {
        self.api.authorize(Capability::Storage)?;
        Ok(self.api.store.set(key, value).await?)
    }

    /// Remove a key. Returns `true` if it existed.
    ///
    /// # Errors
    ///
    /// As for [`get`](Self::get).
    pub async fn remove(&self, key: &str) -> PluginResult<bool> {
        self.api.authorize(Capability::Storage)?;
        Ok(self.api.store.remove(key).await?)
    }

    /// Whether a key is present.
    ///
    /// # Errors
    ///
    /// As for [`get`](Self::get).
    pub async fn exists(&self, key: &str) -> PluginResult<bool> {
        self.api.authorize(Capability::Storage)?;
        Ok(self.api.store.exists(key).await?)
    }

    /// Every key in the namespace, sorted.
    ///
    /// # Errors
    ///
    /// As for [`get`](Self::get).
    pub async fn list_keys(&self) -> PluginResult<Vec<String>> {
        self.api.authorize(Capability::Storage)?;
        Ok(self.api.store.list_keys().await?)
    }

    /// Remove every key in the namespace. Returns the number removed.
    ///
    /// # Errors
    ///
    /// As for [`get`](Self::get).
    pub async fn clear(&self) -> PluginResult<u64> {
        self.api.authorize(Capability::Storage)?;
        Ok(self.api.store.clear().await?)
    }

    /// Read and deserialize a JSON value.
    ///
    /// # Errors
    ///
    /// As for [`get`](Self::get), plus deserialization failures.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> PluginResult<Option<T>> {
        self.api.authorize(Capability::Storage)?;
        Ok(self.api.store.get_json(key).await?)
    }

    /// Serialize and write a JSON value.
    ///
    /// # Errors
    ///
    /// As for [`get`](Self::get), plus serialization failures.
    pub async fn set_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> PluginResult<()> {
        self.api.authorize(Capability::Storage)?;
        Ok(self.api.store.set_json(key, value).await?)
    }
}

// ---------------------------------------------------------------------------
// network
// ---------------------------------------------------------------------------

/// Outbound network access.
pub struct NetworkApi<'a> {
    api: &'a ApiInner,
}

impl NetworkApi<'_> {
    /// Perform an HTTP request.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::PermissionDenied`] without the `network`
    /// grant, [`PluginError::ApiReleased`] after release, or
    /// [`PluginError::Service`] if the request fails.
    pub async fn fetch(&self, request: HttpRequest) -> PluginResult<HttpResponse> {
        self.api.authorize(Capability::Network)?;
        self.api
            .services
            .network
            .fetch(&self.api.plugin_id, request)
            .await
            .map_err(service_error(Capability::Network))
    }
}

// ---------------------------------------------------------------------------
// ui
// ---------------------------------------------------------------------------

/// Requests to the host's presentation layer.
pub struct UiApi<'a> {
    api: &'a ApiInner,
}

impl UiApi<'_> {
    /// Show an in-app notification.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::PermissionDenied`] without the `ui` grant,
    /// [`PluginError::ApiReleased`] after release, or
    /// [`PluginError::Service`] if the presentation layer fails.
    pub async fn show_notification(&self, notification: Notification) -> PluginResult<UiHandle> {
        self.api.authorize(Capability::Ui)?;
        self.api
            .services
            .presentation
            .show_notification(&self.api.plugin_id, notification)
            .await
            .map_err(service_error(Capability::Ui))
    }

    /// Register an action.
    ///
    /// # Errors
    ///
    /// As for [`show_notification`](Self::show_notification).
    pub async fn register_action(&self, action: ActionSpec) -> PluginResult<UiHandle> {
        self.api.authorize(Capability::Ui)?;
        self.api
            .services
            .presentation
            .register_action(&self.api.plugin_id, action)
            .await
            .map_err(service_error(Capability::Ui))
    }

    /// Show a panel.
    ///
    /// # Errors
    ///
    /// As for [`show_notification`](Self::show_notification).
    pub async fn show_panel(&self, panel: PanelSpec) -> PluginResult<UiHandle> {
        self.api.authorize(Capability::Ui)?;
        self.api
            .services
            .presentation
            .show_panel(&self.api.plugin_id, panel)
            .await
            .map_err(service_error(Capability::Ui))
    }

    /// Hide a panel.
    ///
    /// # Errors
    ///
    /// As for [`show_notification`](Self::show_notification).
    pub async fn hide_panel(&self, handle: &UiHandle) -> PluginResult<()> {
        self.api.authorize(Capability::Ui)?;
        self.api
            .services
            .presentation
            .hide_panel(&self.api.plugin_id, handle)
            .await
            .map_err(service_error(Capability::Ui))
    }
}

// ---------------------------------------------------------------------------
// messaging
// ---------------------------------------------------------------------------

/// Messaging with other active plugins.
pub struct MessagingApi<'a> {
    api: &'a ApiInner,
}

impl MessagingApi<'_> {
    /// Send to one active plugin.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::PermissionDenied`] without the `messaging`
    /// grant, [`PluginError::ApiReleased`] after release, or
    /// [`PluginError::Router`] wrapping `UnknownRecipient`.
    pub async fn send(&self, to: &PluginId, payload: serde_json::Value) -> PluginResult<MessageId> {
        self.api.authorize(Capability::Messaging)?;
        Ok(self.api.router.send(&self.api.plugin_id, to, payload).await?)
    }

    /// Send to every other active plugin.
    ///
    /// # Errors
    ///
    /// Only the permission and release checks can fail; delivery itself
    /// never does.
    pub async fn broadcast(&self, payload: serde_json::Value) -> PluginResult<MessageId> {
        self.api.authorize(Capability::Messaging)?;
        Ok(self.api.router.broadcast(&self.api.plugin_id, payload).await)
    }

    /// Add an inbound handler.
    ///
    /// # Errors
    ///
    /// As for [`send`](Self::send); the router rejects plugins that are not
    /// active.
    pub fn subscribe(&self, handler: Arc<dyn MessageHandler>) -> PluginResult<SubscriptionId> {
        self.api.authorize(Capability::Messaging)?;
        Ok(self.api.router.subscribe(&self.api.plugin_id, handler)?)
    }

    /// Remove an inbound handler. Returns `false` if it was not registered.
    ///
    /// # Errors
    ///
    /// As for [`send`](Self::send).
    pub fn unsubscribe(&self, id: SubscriptionId) -> PluginResult<bool> {
        self.api.authorize(Capability::Messaging)?;
        Ok(self.api.router.unsubscribe(&self.api.plugin_id, id)?)
    }
}

// ---------------------------------------------------------------------------
// clipboard / notifications
// ---------------------------------------------------------------------------

/// System clipboard access.
pub struct ClipboardApi<'a> {
    api: &'a ApiInner,
}

impl ClipboardApi<'_> {
    /// Read clipboard text.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::PermissionDenied`] without the `clipboard`
    /// grant, [`PluginError::ApiReleased`] after release, or
    /// [`PluginError::Service`].
    pub async fn read_text(&self) -> PluginResult<Option<String>> {
        self.api.authorize(Capability::Clipboard)?;
        self.api
            .services
            .clipboard
            .read_text(&self.api.plugin_id)
            .await
            .map_err(service_error(Capability::Clipboard))
    }

    /// Write clipboard text.
    ///
    /// # Errors
    ///
    /// As for [`read_text`](Self::read_text).
    pub async fn write_text(&self, text: impl Into<String>) -> PluginResult<()> {
        self.api.authorize(Capability::Clipboard)?;
        self.api
            .services
            .clipboard
            .write_text(&self.api.plugin_id, text.into())
            .await
            .map_err(service_error(Capability::Clipboard))
    }
}

/// System-level notifications.
pub struct NotificationsApi<'a> {
    api: &'a ApiInner,
}

impl NotificationsApi<'_> {
    /// Post a system notification.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::PermissionDenied`] without the
    /// `notifications` grant, [`PluginError::ApiReleased`] after release,
    /// or [`PluginError::Service`].
    pub async fn notify(&self, notification: Notification) -> PluginResult<()> {
        self.api.authorize(Capability::Notifications)?;
        self.api
            .services
            .notifications
            .notify(&self.api.plugin_id, notification)
            .await
            .map_err(service_error(Capability::Notifications))
    }
}

#[cfg(test)]
mod tests {
    use trellis_audit::{AuditEventKind, MemoryAuditLog};
    use trellis_core::Version;
    use trellis_storage::MemoryKvStore;

    use super::*;
    use crate::descriptor::PluginDescriptor;
    use crate::gate::CapabilityGate;

    struct Fixture {
        ledger: Arc<PermissionLedger>,
        audit: Arc<MemoryAuditLog>,
        api: PluginApi,
    }

    fn fixture(requested: &[Capability], granted: &[Capability]) -> Fixture {
        let ledger = Arc::new(PermissionLedger::new());
        let audit = Arc::new(MemoryAuditLog::new());
        let router = Arc::new(MessageRouter::new(audit.clone()));
        let gate = CapabilityGate::new(
            Arc::clone(&ledger),
            audit.clone(),
            Arc::new(MemoryKvStore::new()),
            router,
            HostServices::default(),
        );
        let mut descriptor =
            PluginDescriptor::new(PluginId::from_static("A"), "A", Version::new(1, 0, 0));
        for capability in requested {
            descriptor = descriptor.with_permission(*capability);
        }
        ledger
            .declare(descriptor.id(), requested.iter().copied())
            .unwrap();
        for capability in granted {
            ledger.grant(descriptor.id(), *capability).unwrap();
        }
        let api = gate.build_api(&descriptor);
        Fixture { ledger, audit, api }
    }

    #[tokio::test]
    async fn storage_only_plugin_cannot_fetch() {
        let f = fixture(&[Capability::Storage], &[Capability::Storage]);

        f.api.storage().set("k", b"v".to_vec()).await.unwrap();
        assert_eq!(f.api.storage().get("k").await.unwrap(), Some(b"v".to_vec()));

        let err = f
            .api
            .network()
            .fetch(HttpRequest::get("https://example.com"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PluginError::PermissionDenied { capability: Capability::Network, .. }
        ));
        let denials = f.audit.of_kind(AuditEventKind::PermissionDenied);
        assert_eq!(denials.len(), 1);
        assert_eq!(denials[0].plugin_id.as_str(), "A");
    }

    #[tokio::test]
    async fn every_group_is_gated() {
        let f = fixture(&[], &[]);
        let api = &f.api;

        assert!(api.storage().list_keys().await.is_err());
        assert!(api.ui().show_notification(Notification::new("t", "b")).await.is_err());
        assert!(api.messaging().broadcast(serde_json::json!(1)).await.is_err());
        assert!(api.clipboard().read_text().await.is_err());
        assert!(api.notifications().notify(Notification::new("t", "b")).await.is_err());

        assert_eq!(f.audit.count_of(AuditEventKind::PermissionDenied), 5);
    }

    #[tokio::test]
    async fn revoke_applies_to_the_next_call() {
        let f = fixture(&[Capability::Storage], &[Capability::Storage]);
        assert!(f.api.can(Capability::Storage));
        f.api.storage().set_json("n", &1u32).await.unwrap();

        f.ledger.revoke(f.api.plugin_id(), Capability::Storage).unwrap();
        assert!(!f.api.can(Capability::Storage));
        assert!(matches!(
            f.api.storage().get_json::<u32>("n").await,
            Err(PluginError::PermissionDenied { .. })
        ));
    }

    #[tokio::test]
    async fn released_api_rejects_without_auditing() {
        let f = fixture(&[Capability::Storage], &[Capability::Storage]);
        let clone = f.api.clone();
        f.api.lease().revoke();

        assert!(clone.is_released());
        assert!(matches!(
            clone.storage().get("k").await,
            Err(PluginError::ApiReleased(_))
        ));
        assert!(f.audit.is_empty());
    }

    #[tokio::test]
    async fn granted_call_reaches_unavailable_service() {
        let f = fixture(&[Capability::Clipboard], &[Capability::Clipboard]);
        let err = f.api.clipboard().write_text("hi").await.unwrap_err();
        assert!(matches!(
            err,
            PluginError::Service { capability: Capability::Clipboard, .. }
        ));
        assert!(err.is_retryable());
        assert!(f.audit.is_empty());
    }
}
