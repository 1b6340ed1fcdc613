//! A fully mocked plugin host.

use std::sync::Arc;

use trellis_audit::MemoryAuditLog;
use trellis_events::{MessageHandler, NotificationChannel};
use trellis_plugins::{
    HostServices, PermissionPolicy, PluginApi, PluginManifest, PluginRegistry, PluginResult,
};

use crate::mocks::{
    FlakyKvStore, MockClipboard, MockNetworkService, MockNotificationService,
    MockPresentationService,
};

/// A [`PluginRegistry`] wired to mocks, with the mocks kept for
/// inspection.
#[derive(Debug)]
pub struct TestHost {
    /// The registry under test.
    pub registry: PluginRegistry,
    /// Audit records produced by the registry, gate and router.
    pub audit: Arc<MemoryAuditLog>,
    /// Storage backend.
    pub store: Arc<FlakyKvStore>,
    /// Network collaborator.
    pub network: Arc<MockNetworkService>,
    /// Presentation collaborator.
    pub presentation: Arc<MockPresentationService>,
    /// Clipboard collaborator.
    pub clipboard: Arc<MockClipboard>,
    /// System notification collaborator.
    pub notifications: Arc<MockNotificationService>,
}

impl TestHost {
    /// A host with no cross-process channel and no automatic grants.
    #[must_use]
    pub fn new() -> Self {
        Self::build(None, PermissionPolicy::new())
    }

    /// A host publishing broadcasts on `channel`.
    #[must_use]
    pub fn with_channel(channel: Arc<dyn NotificationChannel>) -> Self {
        Self::build(Some(channel), PermissionPolicy::new())
    }

    /// A host with an automatic grant policy.
    #[must_use]
    pub fn with_policy(policy: PermissionPolicy) -> Self {
        Self::build(None, policy)
    }

    fn build(channel: Option<Arc<dyn NotificationChannel>>, policy: PermissionPolicy) -> Self {
        let audit = Arc::new(MemoryAuditLog::new());
        let store = Arc::new(FlakyKvStore::new());
        let network = Arc::new(MockNetworkService::new());
        let presentation = Arc::new(MockPresentationService::new());
        let clipboard = Arc::new(MockClipboard::new());
        let notifications = Arc::new(MockNotificationService::new());

        let services = HostServices::new()
            .with_network(network.clone())
            .with_presentation(presentation.clone())
            .with_clipboard(clipboard.clone())
            .with_notifications(notifications.clone());

        let mut builder = PluginRegistry::builder()
            .audit(audit.clone())
            .store(store.clone())
            .services(services)
            .policy(policy);
        if let Some(channel) = channel {
            builder = builder.channel(channel);
        }

        Self {
            registry: builder.build(),
            audit,
            store,
            network,
            presentation,
            clipboard,
            notifications,
        }
    }

    /// Register, load, grant every requested capability and activate.
    ///
    /// # Errors
    ///
    /// Whatever the first failing registry call returns.
    pub async fn install(
        &self,
        manifest: &PluginManifest,
        handlers: Vec<Arc<dyn MessageHandler>>,
    ) -> PluginResult<PluginApi> {
        let id = self.registry.register(manifest)?;
        self.registry.load(&id).await?;
        let descriptor = self
            .registry
            .descriptor(&id)
            .ok_or_else(|| trellis_plugins::PluginError::NotFound(id.clone()))?;
        for capability in descriptor.requested_permissions() {
            self.registry.grant(&id, *capability)?;
        }
        self.registry.activate(&id, handlers)
    }
}

impl Default for TestHost {
    fn default() -> Self {
        Self::new()
    }
}

/// Install a test-friendly `tracing` subscriber honoring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
