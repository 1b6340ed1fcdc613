//! Every host API call is gated by the calling plugin's grants.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use trellis_audit::AuditEventKind;
use trellis_core::Capability;
use trellis_plugins::{
    ActionSpec, HostServices, HttpRequest, HttpResponse, Notification, PanelSpec, PermissionPolicy,
    PluginError, PluginRegistry,
};
use trellis_test::{
    MockNetworkService, PresentationCall, TestHost, manifest, manifest_requesting, plugin_id,
};

#[tokio::test]
async fn storage_only_plugin_cannot_reach_the_network() {
    let host = TestHost::new();
    let api = host
        .install(&manifest_requesting("notes", &["storage"]), Vec::new())
        .await
        .unwrap();

    api.storage().set("k", b"v".to_vec()).await.unwrap();
    match api.network().fetch(HttpRequest::get("https://example.com")).await {
        Err(PluginError::PermissionDenied {
            plugin_id: denied,
            capability,
        }) => {
            assert_eq!(denied, plugin_id("notes"));
            assert_eq!(capability, Capability::Network);
        },
        other => panic!("expected permission denied, got {other:?}"),
    }

    assert!(host.network.requests().is_empty());
    let denials = host.audit.of_kind(AuditEventKind::PermissionDenied);
    assert_eq!(denials.len(), 1);
    assert_eq!(denials[0].plugin_id, plugin_id("notes"));
}

#[tokio::test]
async fn granted_network_reaches_the_service() {
    let host = TestHost::new();
    let api = host
        .install(&manifest_requesting("sync", &["network"]), Vec::new())
        .await
        .unwrap();

    let response = api
        .network()
        .fetch(HttpRequest::get("https://example.com/feed").with_header("accept", "text/plain"))
        .await
        .unwrap();
    assert!(response.is_success());

    let requests = host.network.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0, plugin_id("sync"));
    assert_eq!(requests[0].1.url, "https://example.com/feed");
}

#[tokio::test]
async fn network_failure_is_a_service_error() {
    let network = Arc::new(
        MockNetworkService::new()
            .with_response(HttpResponse::new(404, "gone"))
            .with_failure("connection reset"),
    );
    let registry = PluginRegistry::builder()
        .services(HostServices::new().with_network(network.clone()))
        .build();
    let id = registry.register(&manifest_requesting("sync", &["network"])).unwrap();
    registry.load(&id).await.unwrap();
    registry.grant(&id, Capability::Network).unwrap();
    let api = registry.activate(&id, Vec::new()).unwrap();

    // A non-success status is still a response.
    let response = api.network().fetch(HttpRequest::get("https://x.test/a")).await.unwrap();
    assert_eq!(response.status, 404);
    assert_eq!(response.text(), "gone");

    let err = api
        .network()
        .fetch(HttpRequest::post("https://x.test/b", "{}"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PluginError::Service {
            capability: Capability::Network,
            ..
        }
    ));
    assert!(!err.is_retryable());
    assert_eq!(network.requests().len(), 2);
}

#[tokio::test]
async fn missing_collaborator_is_retryable() {
    let registry = PluginRegistry::new();
    let id = registry.register(&manifest_requesting("clipper", &["clipboard"])).unwrap();
    registry.load(&id).await.unwrap();
    registry.grant(&id, Capability::Clipboard).unwrap();
    let api = registry.activate(&id, Vec::new()).unwrap();

    let err = api.clipboard().read_text().await.unwrap_err();
    assert!(matches!(err, PluginError::Service { .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn ui_clipboard_and_notifications_go_through_collaborators() {
    let host = TestHost::new();
    let api = host
        .install(
            &manifest_requesting("clipper", &["ui", "clipboard", "notifications"]),
            Vec::new(),
        )
        .await
        .unwrap();

    let action = api
        .ui()
        .register_action(ActionSpec {
            id: "copy-all".into(),
            label: "Copy all".into(),
        })
        .await
        .unwrap();
    let panel = api
        .ui()
        .show_panel(PanelSpec {
            title: "History".into(),
            content: serde_json::json!({"items": []}),
        })
        .await
        .unwrap();
    assert_ne!(action, panel);
    api.ui().hide_panel(&panel).await.unwrap();
    api.ui()
        .show_notification(Notification::new("Copied", "3 items"))
        .await
        .unwrap();

    api.clipboard().write_text("hello").await.unwrap();
    assert_eq!(api.clipboard().read_text().await.unwrap().as_deref(), Some("hello"));
    assert_eq!(host.clipboard.contents().as_deref(), Some("hello"));

    api.notifications()
        .notify(Notification::new("Done", "clipboard updated"))
        .await
        .unwrap();
    assert_eq!(host.notifications.sent().len(), 1);

    let calls = host.presentation.calls();
    assert_eq!(calls.len(), 4);
    assert!(matches!(&calls[0], PresentationCall::Action(id, spec) if id.as_str() == "clipper" && spec.id == "copy-all"));
    assert!(matches!(&calls[2], PresentationCall::HidePanel(_, handle) if *handle == panel));
    assert_eq!(host.audit.count_of(AuditEventKind::PermissionDenied), 0);
}

#[tokio::test]
async fn revocation_applies_to_the_next_call() {
    let host = TestHost::new();
    let api = host
        .install(&manifest_requesting("clipper", &["clipboard"]), Vec::new())
        .await
        .unwrap();
    api.clipboard().write_text("one").await.unwrap();

    assert!(host.registry.revoke(&plugin_id("clipper"), Capability::Clipboard).unwrap());
    assert!(matches!(
        api.clipboard().write_text("two").await,
        Err(PluginError::PermissionDenied { .. })
    ));
    assert_eq!(host.clipboard.contents().as_deref(), Some("one"));

    host.registry.grant(&plugin_id("clipper"), Capability::Clipboard).unwrap();
    api.clipboard().write_text("three").await.unwrap();
    assert_eq!(host.clipboard.contents().as_deref(), Some("three"));
}

#[tokio::test]
async fn revocation_does_not_affect_a_call_in_flight() {
    let network = Arc::new(MockNetworkService::new().gated());
    let registry = PluginRegistry::builder()
        .services(HostServices::new().with_network(network.clone()))
        .build();
    let id = registry.register(&manifest_requesting("sync", &["network"])).unwrap();
    registry.load(&id).await.unwrap();
    registry.grant(&id, Capability::Network).unwrap();
    let api = registry.activate(&id, Vec::new()).unwrap();

    let in_flight = {
        let api = api.clone();
        tokio::spawn(async move { api.network().fetch(HttpRequest::get("https://x.test/slow")).await })
    };
    tokio::time::timeout(Duration::from_secs(2), network.wait_for_request())
        .await
        .unwrap();

    assert!(registry.revoke(&id, Capability::Network).unwrap());
    network.release(1);
    let response = in_flight.await.unwrap().unwrap();
    assert!(response.is_success());

    assert!(matches!(
        api.network().fetch(HttpRequest::get("https://x.test/next")).await,
        Err(PluginError::PermissionDenied { .. })
    ));
    assert_eq!(network.requests().len(), 1);
}

#[tokio::test]
async fn storage_outage_is_retryable() {
    let host = TestHost::new();
    let api = host
        .install(&manifest_requesting("notes", &["storage"]), Vec::new())
        .await
        .unwrap();

    host.store.set_online(false);
    let err = api.storage().set("k", b"v".to_vec()).await.unwrap_err();
    assert!(matches!(err, PluginError::StorageUnavailable(_)));
    assert!(err.is_retryable());

    host.store.set_online(true);
    api.storage().set("k", b"v".to_vec()).await.unwrap();
    assert!(api.storage().exists("k").await.unwrap());
}

#[tokio::test]
async fn storage_is_namespaced_per_plugin() {
    let host = TestHost::new();
    let a = host
        .install(&manifest_requesting("a", &["storage"]), Vec::new())
        .await
        .unwrap();
    let b = host
        .install(&manifest_requesting("b", &["storage"]), Vec::new())
        .await
        .unwrap();

    a.storage().set("shared-key", b"from a".to_vec()).await.unwrap();
    assert_eq!(b.storage().get("shared-key").await.unwrap(), None);
    b.storage().set("shared-key", b"from b".to_vec()).await.unwrap();

    assert_eq!(a.storage().clear().await.unwrap(), 1);
    assert_eq!(
        b.storage().get("shared-key").await.unwrap(),
        Some(b"from b".to_vec())
    );
}

#[tokio::test]
async fn auto_grant_policy_only_covers_requested_capabilities() {
    let host = TestHost::with_policy(PermissionPolicy::new().auto_grant([Capability::Storage]));
    host.registry
        .register(&manifest_requesting("notes", &["storage", "network"]))
        .unwrap();
    host.registry.register(&manifest("bare", "1.0.0")).unwrap();

    assert!(host.registry.has_permission(&plugin_id("notes"), Capability::Storage));
    assert!(!host.registry.has_permission(&plugin_id("notes"), Capability::Network));
    assert!(!host.registry.has_permission(&plugin_id("bare"), Capability::Storage));
}

#[tokio::test]
async fn unrequested_grant_is_refused() {
    let host = TestHost::new();
    host.registry.register(&manifest_requesting("notes", &["storage"])).unwrap();
    assert!(matches!(
        host.registry.grant(&plugin_id("notes"), Capability::Network),
        Err(PluginError::Capability(_))
    ));
    assert!(!host.registry.has_permission(&plugin_id("notes"), Capability::Network));
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

fn capability() -> impl Strategy<Value = Capability> {
    prop::sample::select(Capability::ALL.to_vec())
}

#[derive(Debug, Clone)]
enum Op {
    Grant(Capability),
    Revoke(Capability),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![capability().prop_map(Op::Grant), capability().prop_map(Op::Revoke)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// After any sequence of grants and revokes, `has_permission` reflects
    /// the last operation on each capability.
    #[test]
    fn grants_follow_the_last_operation(ops in prop::collection::vec(op(), 0..32)) {
        let registry = PluginRegistry::new();
        let names: Vec<&str> = Capability::ALL.into_iter().map(Capability::as_str).collect();
        let id = registry.register(&manifest_requesting("p", &names)).unwrap();

        let mut expected = std::collections::BTreeSet::new();
        for op in &ops {
            match op {
                Op::Grant(c) => {
                    registry.grant(&id, *c).unwrap();
                    expected.insert(*c);
                },
                Op::Revoke(c) => {
                    let was = registry.revoke(&id, *c).unwrap();
                    prop_assert_eq!(was, expected.remove(c));
                },
            }
        }
        for c in Capability::ALL {
            prop_assert_eq!(registry.has_permission(&id, c), expected.contains(&c));
        }
    }
}
