//! Inter-plugin messaging through the registry's router.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{Notify, Semaphore};
use trellis_audit::AuditEventKind;
use trellis_events::{Envelope, HandlerError, MessageHandler, handler_fn};
use trellis_plugins::{PluginApi, PluginError};
use trellis_test::{
    FailingHandler, RecordingHandler, TestHost, manifest, manifest_requesting, plugin_id,
};

const WAIT: Duration = Duration::from_secs(2);

async fn messenger(host: &TestHost, name: &str, inbox: &Arc<RecordingHandler>) -> PluginApi {
    host.install(
        &manifest_requesting(name, &["messaging"]),
        vec![inbox.clone() as Arc<dyn MessageHandler>],
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn point_to_point_is_exactly_once_and_ordered() {
    let host = TestHost::new();
    let (a_inbox, b_inbox) = (RecordingHandler::new(), RecordingHandler::new());
    let a = messenger(&host, "a", &a_inbox).await;
    messenger(&host, "b", &b_inbox).await;

    for n in 0..50 {
        a.messaging().send(&plugin_id("b"), json!(n)).await.unwrap();
    }
    assert!(b_inbox.wait_for(50, WAIT).await);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let expected: Vec<_> = (0..50).map(|n| json!(n)).collect();
    assert_eq!(b_inbox.payloads(), expected);
    assert!(b_inbox.received().iter().all(|e| e.sender() == &plugin_id("a")));
    assert!(a_inbox.is_empty());
}

#[tokio::test]
async fn broadcast_skips_the_sender() {
    let host = TestHost::new();
    let inboxes: Vec<_> = (0..4).map(|_| RecordingHandler::new()).collect();
    let mut apis = Vec::new();
    for (i, inbox) in inboxes.iter().enumerate() {
        apis.push(messenger(&host, &format!("p{i}"), inbox).await);
    }

    let id = apis[0].messaging().broadcast(json!({"kind": "saved"})).await.unwrap();
    for inbox in &inboxes[1..] {
        assert!(inbox.wait_for(1, WAIT).await);
        assert_eq!(inbox.received()[0].message_id(), id);
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(inboxes[0].is_empty());
    assert!(inboxes[1..].iter().all(|i| i.len() == 1));
}

#[tokio::test]
async fn failing_handler_does_not_stop_the_others() {
    let host = TestHost::new();
    let failing = FailingHandler::new("boom");
    let inbox = RecordingHandler::new();
    let sender = messenger(&host, "sender", &RecordingHandler::new()).await;
    host.install(
        &manifest("receiver", "1.0.0"),
        vec![
            failing.clone() as Arc<dyn MessageHandler>,
            inbox.clone() as Arc<dyn MessageHandler>,
        ],
    )
    .await
    .unwrap();

    let id = sender
        .messaging()
        .send(&plugin_id("receiver"), json!("hi"))
        .await
        .unwrap();
    assert!(inbox.wait_for(1, WAIT).await);
    assert_eq!(failing.calls(), 1);

    let errors = host.audit.of_kind(AuditEventKind::HandlerError);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].plugin_id, plugin_id("receiver"));
    assert!(errors[0].detail.contains("boom"));
    assert_eq!(
        errors[0].context["envelope"]["message_id"],
        serde_json::to_value(id).unwrap()
    );
}

struct PanickingHandler;

#[async_trait]
impl MessageHandler for PanickingHandler {
    async fn handle(&self, _envelope: Arc<Envelope>) -> Result<(), HandlerError> {
        panic!("handler exploded");
    }
}

#[tokio::test]
async fn panicking_handler_is_audited_and_contained() {
    let host = TestHost::new();
    let inbox = RecordingHandler::new();
    let sender = messenger(&host, "sender", &RecordingHandler::new()).await;
    host.install(
        &manifest("receiver", "1.0.0"),
        vec![
            Arc::new(PanickingHandler) as Arc<dyn MessageHandler>,
            inbox.clone() as Arc<dyn MessageHandler>,
        ],
    )
    .await
    .unwrap();

    for n in 0..3 {
        sender
            .messaging()
            .send(&plugin_id("receiver"), json!(n))
            .await
            .unwrap();
    }
    assert!(inbox.wait_for(3, WAIT).await);
    assert_eq!(host.audit.count_of(AuditEventKind::HandlerError), 3);
}

#[tokio::test]
async fn unload_drops_undelivered_messages() {
    let host = TestHost::new();
    let gate = Arc::new(Semaphore::new(0));
    let entered = Arc::new(Notify::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let inbox = RecordingHandler::new();

    let blocking = {
        let (gate, entered, calls) = (gate.clone(), entered.clone(), calls.clone());
        handler_fn(move |_envelope| {
            let (gate, entered, calls) = (gate.clone(), entered.clone(), calls.clone());
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                entered.notify_one();
                let _permit = gate
                    .acquire()
                    .await
                    .map_err(|e| HandlerError::new(e.to_string()))?;
                Ok::<(), HandlerError>(())
            }
        })
    };

    let sender = messenger(&host, "sender", &RecordingHandler::new()).await;
    host.install(
        &manifest("receiver", "1.0.0"),
        vec![blocking as Arc<dyn MessageHandler>, inbox.clone() as Arc<dyn MessageHandler>],
    )
    .await
    .unwrap();

    sender.messaging().send(&plugin_id("receiver"), json!(1)).await.unwrap();
    sender.messaging().send(&plugin_id("receiver"), json!(2)).await.unwrap();
    tokio::time::timeout(WAIT, entered.notified()).await.unwrap();

    host.registry.unload(&plugin_id("receiver")).unwrap();
    gate.add_permits(10);
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The in-flight handler finished, nothing after it ran.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(inbox.is_empty());
}

#[tokio::test]
async fn subscribe_and_unsubscribe_at_runtime() {
    let host = TestHost::new();
    let sender = messenger(&host, "sender", &RecordingHandler::new()).await;
    let receiver = messenger(&host, "receiver", &RecordingHandler::new()).await;

    let late = RecordingHandler::new();
    let sub = receiver.messaging().subscribe(late.clone()).unwrap();
    sender.messaging().send(&plugin_id("receiver"), json!("first")).await.unwrap();
    assert!(late.wait_for(1, WAIT).await);

    assert!(receiver.messaging().unsubscribe(sub).unwrap());
    assert!(!receiver.messaging().unsubscribe(sub).unwrap());
    sender.messaging().send(&plugin_id("receiver"), json!("second")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(late.len(), 1);
}

#[tokio::test]
async fn messaging_requires_the_capability() {
    let host = TestHost::new();
    let inbox = RecordingHandler::new();
    let mute = host
        .install(&manifest_requesting("mute", &["storage"]), Vec::new())
        .await
        .unwrap();
    messenger(&host, "receiver", &inbox).await;

    assert!(matches!(
        mute.messaging().send(&plugin_id("receiver"), json!(1)).await,
        Err(PluginError::PermissionDenied { .. })
    ));
    assert!(matches!(
        mute.messaging().broadcast(json!(1)).await,
        Err(PluginError::PermissionDenied { .. })
    ));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(inbox.is_empty());
    assert_eq!(host.audit.count_of(AuditEventKind::PermissionDenied), 2);
}

#[tokio::test]
async fn sending_to_an_inactive_plugin_fails() {
    let host = TestHost::new();
    let sender = messenger(&host, "sender", &RecordingHandler::new()).await;
    host.registry.register(&manifest("idle", "1.0.0")).unwrap();

    let err = sender
        .messaging()
        .send(&plugin_id("idle"), json!(1))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "unknown recipient: idle");
}
