//! Host services behind the capability gate.
//!
//! Each gated capability group delegates to one of these traits. The host
//! supplies real implementations (an HTTP client, the UI shell, the system
//! clipboard); [`UnavailableService`] stands in for anything the host does
//! not provide.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use trellis_core::PluginId;

/// Failure reported by a host service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// The service is not provided by this host, or is temporarily down.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The service rejected or failed the request.
    #[error("{0}")]
    Failed(String),
}

impl ServiceError {
    /// Whether retrying later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Result type for host services.
pub type ServiceResult<T> = Result<T, ServiceError>;

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// An outbound HTTP request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRequest {
    /// HTTP method, upper case.
    pub method: String,
    /// Absolute URL.
    pub url: String,
    /// Request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Request body.
    #[serde(default)]
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// A `GET` request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".into(),
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// A `POST` request with a body.
    #[must_use]
    pub fn post(url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            method: "POST".into(),
            url: url.into(),
            headers: BTreeMap::new(),
            body: Some(body.into()),
        }
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Response to an [`HttpRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Response body.
    #[serde(default)]
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// A response with a status and body.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// Whether the status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The body as UTF-8, lossily.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Performs network requests on behalf of plugins.
#[async_trait]
pub trait NetworkService: Send + Sync {
    /// Execute `request` for `plugin_id`.
    async fn fetch(&self, plugin_id: &PluginId, request: HttpRequest) -> ServiceResult<HttpResponse>;
}

// ---------------------------------------------------------------------------
// Presentation
// ---------------------------------------------------------------------------

/// Opaque handle returned by the presentation collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UiHandle(String);

impl UiHandle {
    /// Wrap a collaborator-issued handle.
    #[must_use]
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// The raw handle value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UiHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An in-app notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Short title.
    pub title: String,
    /// Body text.
    pub body: String,
}

impl Notification {
    /// Create a notification.
    #[must_use]
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }
}

/// An action (command, menu entry) a plugin contributes to the host UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSpec {
    /// Plugin-local action id.
    pub id: String,
    /// Label shown to the user.
    pub label: String,
}

/// A panel a plugin asks the host to show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelSpec {
    /// Panel title.
    pub title: String,
    /// Opaque content description, rendered by the host.
    pub content: serde_json::Value,
}

/// The host UI collaborator. Rendering is entirely its business.
#[async_trait]
pub trait PresentationService: Send + Sync {
    /// Show an in-app notification.
    async fn show_notification(
        &self,
        plugin_id: &PluginId,
        notification: Notification,
    ) -> ServiceResult<UiHandle>;

    /// Register an action.
    async fn register_action(&self, plugin_id: &PluginId, action: ActionSpec)
    -> ServiceResult<UiHandle>;

    /// Show a panel.
    async fn show_panel(&self, plugin_id: &PluginId, panel: PanelSpec) -> ServiceResult<UiHandle>;

    /// Hide a panel previously shown.
    async fn hide_panel(&self, plugin_id: &PluginId, handle: &UiHandle) -> ServiceResult<()>;
}

// ---------------------------------------------------------------------------
// Clipboard and system notifications
// ---------------------------------------------------------------------------

/// System clipboard access.
#[async_trait]
pub trait ClipboardService: Send + Sync {
    /// Read the clipboard as text. `None` if it holds no text.
    async fn read_text(&self, plugin_id: &PluginId) -> ServiceResult<Option<String>>;

    /// Replace the clipboard contents with text.
    async fn write_text(&self, plugin_id: &PluginId, text: String) -> ServiceResult<()>;
}

/// System-level (OS) notifications.
#[async_trait]
pub trait NotificationService: Send + Sync {
    /// Post a system notification.
    async fn notify(&self, plugin_id: &PluginId, notification: Notification) -> ServiceResult<()>;
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Service that reports itself unavailable for every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableService;

fn unavailable<T>(what: &str) -> ServiceResult<T> {
    Err(ServiceError::Unavailable(format!(
        "{what} is not provided by this host"
    )))
}

#[async_trait]
impl NetworkService for UnavailableService {
    async fn fetch(&self, _plugin_id: &PluginId, _request: HttpRequest) -> ServiceResult<HttpResponse> {
        unavailable("network")
    }
}

#[async_trait]
impl PresentationService for UnavailableService {
    async fn show_notification(
        &self,
        _plugin_id: &PluginId,
        _notification: Notification,
    ) -> ServiceResult<UiHandle> {
        unavailable("presentation")
    }

    async fn register_action(
        &self,
        _plugin_id: &PluginId,
        _action: ActionSpec,
    ) -> ServiceResult<UiHandle> {
        unavailable("presentation")
    }

    async fn show_panel(&self, _plugin_id: &PluginId, _panel: PanelSpec) -> ServiceResult<UiHandle> {
        unavailable("presentation")
    }

    async fn hide_panel(&self, _plugin_id: &PluginId, _handle: &UiHandle) -> ServiceResult<()> {
        unavailable("presentation")
    }
}

#[async_trait]
impl ClipboardService for UnavailableService {
    async fn read_text(&self, _plugin_id: &PluginId) -> ServiceResult<Option<String>> {
        unavailable("clipboard")
    }

    async fn write_text(&self, _plugin_id: &PluginId, _text: String) -> ServiceResult<()> {
        unavailable("clipboard")
    }
}

#[async_trait]
impl NotificationService for UnavailableService {
    async fn notify(&self, _plugin_id: &PluginId, _notification: Notification) -> ServiceResult<()> {
        unavailable("notifications")
    }
}

/// The set of host services the capability gate delegates to.
#[derive(Clone)]
pub struct HostServices {
    pub(crate) network: Arc<dyn NetworkService>,
    pub(crate) presentation: Arc<dyn PresentationService>,
    pub(crate) clipboard: Arc<dyn ClipboardService>,
    pub(crate) notifications: Arc<dyn NotificationService>,
}

impl HostServices {
    /// Every service unavailable.
    #[must_use]
    pub fn new() -> Self {
        Self {
            network: Arc::new(UnavailableService),
            presentation: Arc::new(UnavailableService),
            clipboard: Arc::new(UnavailableService),
            notifications: Arc::new(UnavailableService),
        }
    }

    /// Provide the network service.
    #[must_use]
    pub fn with_network(mut self, service: Arc<dyn NetworkService>) -> Self {
        self.network = service;
        self
    }

    /// Provide the presentation service.
    #[must_use]
    pub fn with_presentation(mut self, service: Arc<dyn PresentationService>) -> Self {
        self.presentation = service;
        self
    }

    /// Provide the clipboard service.
    #[must_use]
    pub fn with_clipboard(mut self, service: Arc<dyn ClipboardService>) -> Self {
        self.clipboard = service;
        self
    }

    /// Provide the system notification service.
    #[must_use]
    pub fn with_notifications(mut self, service: Arc<dyn NotificationService>) -> Self {
        self.notifications = service;
        self
    }
}

impl Default for HostServices {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HostServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostServices").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_services_are_unavailable() {
        let services = HostServices::default();
        let plugin = PluginId::from_static("A");

        let err = services
            .network
            .fetch(&plugin, HttpRequest::get("https://example.com"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(services.clipboard.read_text(&plugin).await.is_err());
        assert!(
            services
                .notifications
                .notify(&plugin, Notification::new("t", "b"))
                .await
                .is_err()
        );
    }

    #[test]
    fn http_helpers() {
        let request = HttpRequest::post("https://example.com", "hi").with_header("x-id", "1");
        assert_eq!(request.method, "POST");
        assert_eq!(request.body.as_deref(), Some(b"hi".as_slice()));
        assert_eq!(request.headers.get("x-id").map(String::as_str), Some("1"));

        let response = HttpResponse::new(204, Vec::<u8>::new());
        assert!(response.is_success());
        assert!(!HttpResponse::new(404, "nope").is_success());
        assert_eq!(HttpResponse::new(200, "ok").text(), "ok");
    }
}
