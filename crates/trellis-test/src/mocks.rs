//! Mock implementations for testing.
//!
//! Every mock uses `std::sync::Mutex` internally so it can be inspected
//! from sync assertions without a runtime.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};
use trellis_core::PluginId;
use trellis_events::{Envelope, HandlerError, MessageHandler};
use trellis_plugins::{
    ActionSpec, ClipboardService, HttpRequest, HttpResponse, NetworkService, Notification,
    NotificationService, PanelSpec, PresentationService, ServiceError, ServiceResult, UiHandle,
};
use trellis_storage::{KvStore, MemoryKvStore, StorageError, StorageResult};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// Network service returning queued responses.
///
/// When the queue is empty every request gets `200` with an empty body.
/// A [`gated`](Self::gated) mock holds each request until
/// [`release`](Self::release) lets it through.
#[derive(Debug, Default)]
pub struct MockNetworkService {
    responses: Mutex<VecDeque<ServiceResult<HttpResponse>>>,
    requests: Mutex<Vec<(PluginId, HttpRequest)>>,
    gate: Option<Semaphore>,
    entered: Notify,
}

impl MockNetworkService {
    /// Create a mock with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response.
    #[must_use]
    pub fn with_response(self, response: HttpResponse) -> Self {
        lock(&self.responses).push_back(Ok(response));
        self
    }

    /// Queue a failure.
    #[must_use]
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        lock(&self.responses).push_back(Err(ServiceError::Failed(message.into())));
        self
    }

    /// Hold every request until [`release`](Self::release) is called.
    #[must_use]
    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    /// Let `n` held requests complete.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Wait until a request has reached the service.
    pub async fn wait_for_request(&self) {
        self.entered.notified().await;
    }

    /// Every request seen, with the plugin that made it.
    #[must_use]
    pub fn requests(&self) -> Vec<(PluginId, HttpRequest)> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl NetworkService for MockNetworkService {
    async fn fetch(&self, plugin_id: &PluginId, request: HttpRequest) -> ServiceResult<HttpResponse> {
        lock(&self.requests).push((plugin_id.clone(), request));
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| ServiceError::Unavailable(e.to_string()))?
                .forget();
        }
        lock(&self.responses)
            .pop_front()
            .unwrap_or_else(|| Ok(HttpResponse::new(200, Vec::<u8>::new())))
    }
}

// ---------------------------------------------------------------------------
// Presentation
// ---------------------------------------------------------------------------

/// One request received by [`MockPresentationService`].
#[derive(Debug, Clone, PartialEq)]
pub enum PresentationCall {
    /// `show_notification`.
    Notification(PluginId, Notification),
    /// `register_action`.
    Action(PluginId, ActionSpec),
    /// `show_panel`.
    ShowPanel(PluginId, PanelSpec),
    /// `hide_panel`.
    HidePanel(PluginId, UiHandle),
}

/// Presentation collaborator that records requests and issues handles
/// `ui-1`, `ui-2`, ...
#[derive(Debug, Default)]
pub struct MockPresentationService {
    calls: Mutex<Vec<PresentationCall>>,
    next_handle: AtomicU64,
}

impl MockPresentationService {
    /// Create an empty mock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request received, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<PresentationCall> {
        lock(&self.calls).clone()
    }

    fn handle(&self) -> UiHandle {
        let n = self.next_handle.fetch_add(1, Ordering::Relaxed).saturating_add(1);
        UiHandle::new(format!("ui-{n}"))
    }
}

#[async_trait]
impl PresentationService for MockPresentationService {
    async fn show_notification(
        &self,
        plugin_id: &PluginId,
        notification: Notification,
    ) -> ServiceResult<UiHandle> {
        lock(&self.calls).push(PresentationCall::Notification(plugin_id.clone(), notification));
        Ok(self.handle())
    }

    async fn register_action(
        &self,
        plugin_id: &PluginId,
        action: ActionSpec,
    ) -> ServiceResult<UiHandle> {
        lock(&self.calls).push(PresentationCall::Action(plugin_id.clone(), action));
        Ok(self.handle())
    }

    async fn show_panel(&self, plugin_id: &PluginId, panel: PanelSpec) -> ServiceResult<UiHandle> {
        lock(&self.calls).push(PresentationCall::ShowPanel(plugin_id.clone(), panel));
        Ok(self.handle())
    }

    async fn hide_panel(&self, plugin_id: &PluginId, handle: &UiHandle) -> ServiceResult<()> {
        lock(&self.calls).push(PresentationCall::HidePanel(plugin_id.clone(), handle.clone()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Clipboard and system notifications
// ---------------------------------------------------------------------------

/// In-memory clipboard.
#[derive(Debug, Default)]
pub struct MockClipboard {
    text: Mutex<Option<String>>,
}

impl MockClipboard {
    /// An empty clipboard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current contents.
    #[must_use]
    pub fn contents(&self) -> Option<String> {
        lock(&self.text).clone()
    }
}

#[async_trait]
impl ClipboardService for MockClipboard {
    async fn read_text(&self, _plugin_id: &PluginId) -> ServiceResult<Option<String>> {
        Ok(lock(&self.text).clone())
    }

    async fn write_text(&self, _plugin_id: &PluginId, text: String) -> ServiceResult<()> {
        *lock(&self.text) = Some(text);
        Ok(())
    }
}

/// System notification sink that records what was posted.
#[derive(Debug, Default)]
pub struct MockNotificationService {
    sent: Mutex<Vec<(PluginId, Notification)>>,
}

impl MockNotificationService {
    /// An empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every notification posted, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<(PluginId, Notification)> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl NotificationService for MockNotificationService {
    async fn notify(&self, plugin_id: &PluginId, notification: Notification) -> ServiceResult<()> {
        lock(&self.sent).push((plugin_id.clone(), notification));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// In-memory backend that can be switched offline.
///
/// While offline every call fails with [`StorageError::Unavailable`].
#[derive(Debug)]
pub struct FlakyKvStore {
    inner: MemoryKvStore,
    online: AtomicBool,
}

impl FlakyKvStore {
    /// An online, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: MemoryKvStore::new(),
            online: AtomicBool::new(true),
        }
    }

    /// Take the backend offline or bring it back.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    fn check(&self) -> StorageResult<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::Unavailable("backend offline".into()))
        }
    }
}

impl Default for FlakyKvStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for FlakyKvStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.check()?;
        self.inner.get(namespace, key).await
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        self.check()?;
        self.inner.set(namespace, key, value).await
    }

    async fn remove(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        self.check()?;
        self.inner.remove(namespace, key).await
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        self.check()?;
        self.inner.list_keys(namespace).await
    }

    async fn clear(&self, namespace: &str) -> StorageResult<u64> {
        self.check()?;
        self.inner.clear(namespace).await
    }
}

// ---------------------------------------------------------------------------
// Message handlers
// ---------------------------------------------------------------------------

/// Handler that records every envelope it receives.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    received: Mutex<Vec<Arc<Envelope>>>,
    notify: Notify,
}

impl RecordingHandler {
    /// A new handler, already wrapped for registration.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Envelopes received so far, in delivery order.
    #[must_use]
    pub fn received(&self) -> Vec<Arc<Envelope>> {
        lock(&self.received).clone()
    }

    /// Payloads received so far, in delivery order.
    #[must_use]
    pub fn payloads(&self) -> Vec<serde_json::Value> {
        lock(&self.received)
            .iter()
            .map(|e| e.payload().clone())
            .collect()
    }

    /// Number of envelopes received.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.received).len()
    }

    /// Whether nothing has been received.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until at least `count` envelopes have arrived. Returns `false`
    /// on timeout.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.notify.notified();
                if self.len() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn handle(&self, envelope: Arc<Envelope>) -> Result<(), HandlerError> {
        lock(&self.received).push(envelope);
        self.notify.notify_waiters();
        Ok(())
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "recording"
    }
}

/// Handler that fails every delivery with a fixed message.
#[derive(Debug)]
pub struct FailingHandler {
    message: String,
    calls: AtomicUsize,
}

impl FailingHandler {
    /// A handler failing with `message`, already wrapped for registration.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            message: message.into(),
            calls: AtomicUsize::new(0),
        })
    }

    /// How many deliveries it has failed.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageHandler for FailingHandler {
    async fn handle(&self, _envelope: Arc<Envelope>) -> Result<(), HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(HandlerError::new(self.message.clone()))
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "failing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn network_mock_replays_queue_then_defaults() {
        let network = MockNetworkService::new()
            .with_response(HttpResponse::new(201, "made"))
            .with_failure("boom");
        let plugin = PluginId::from_static("A");

        let first = network
            .fetch(&plugin, HttpRequest::get("https://a.test"))
            .await;
        assert_eq!(first.map(|r| r.status).ok(), Some(201));
        assert!(network.fetch(&plugin, HttpRequest::get("https://b.test")).await.is_err());
        let third = network
            .fetch(&plugin, HttpRequest::get("https://c.test"))
            .await;
        assert_eq!(third.map(|r| r.status).ok(), Some(200));
        assert_eq!(network.requests().len(), 3);
    }

    #[tokio::test]
    async fn flaky_store_goes_offline() {
        let store = FlakyKvStore::new();
        store.set("ns", "k", b"v".to_vec()).await.ok();
        store.set_online(false);
        assert!(matches!(
            store.get("ns", "k").await,
            Err(StorageError::Unavailable(_))
        ));
        store.set_online(true);
        assert_eq!(store.get("ns", "k").await.ok().flatten(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn presentation_handles_are_sequential() {
        let ui = MockPresentationService::new();
        let plugin = PluginId::from_static("A");
        let a = ui
            .show_notification(&plugin, Notification::new("t", "b"))
            .await
            .ok();
        let b = ui
            .register_action(&plugin, ActionSpec { id: "x".into(), label: "X".into() })
            .await
            .ok();
        assert_eq!(a.map(|h| h.to_string()), Some("ui-1".to_string()));
        assert_eq!(b.map(|h| h.to_string()), Some("ui-2".to_string()));
        assert_eq!(ui.calls().len(), 2);
    }
}
