//! The message router.

use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use trellis_audit::{AuditHook, AuditRecord};
use trellis_core::PluginId;

use crate::channel::NotificationChannel;
use crate::envelope::{Envelope, HostInstanceId, MessageId, Recipient};
use crate::error::{HandlerError, RouterError, RouterResult};
use crate::handler::{MessageHandler, SubscriptionId};

/// Number of remote message ids remembered for deduplication.
pub const DEFAULT_DEDUPE_WINDOW: usize = 4096;

// ---------------------------------------------------------------------------
// Mailboxes
// ---------------------------------------------------------------------------

struct MailboxState {
    active: bool,
    handlers: Vec<(SubscriptionId, Arc<dyn MessageHandler>)>,
}

/// Per-plugin handler list plus the flag the dispatcher checks before
/// every handler call.
struct Mailbox {
    state: Mutex<MailboxState>,
}

impl Mailbox {
    fn new() -> Self {
        Self {
            state: Mutex::new(MailboxState {
                active: true,
                handlers: Vec::new(),
            }),
        }
    }

    /// Subscription ids in registration order, or `None` once closed.
    fn subscriptions(&self) -> Option<Vec<SubscriptionId>> {
        let state = self.state.lock().ok()?;
        state
            .active
            .then(|| state.handlers.iter().map(|(id, _)| *id).collect())
    }

    /// Claim the handler for `id` if the mailbox is still open.
    ///
    /// The claim is the point a handler call counts as started: a `close`
    /// that takes the lock after it lets that call run, one that takes it
    /// before stops it.
    ///
    /// `Err(())` means the mailbox closed and dispatch must stop; `Ok(None)`
    /// means that one handler was unsubscribed in the meantime.
    fn handler(&self, id: SubscriptionId) -> Result<Option<Arc<dyn MessageHandler>>, ()> {
        let state = self.state.lock().map_err(|_| ())?;
        if !state.active {
            return Err(());
        }
        Ok(state
            .handlers
            .iter()
            .find(|(sub, _)| *sub == id)
            .map(|(_, h)| Arc::clone(h)))
    }

    fn close(&self) {
        match self.state.lock() {
            Ok(mut state) => {
                state.active = false;
                state.handlers.clear();
            },
            Err(poisoned) => {
                let mut state = poisoned.into_inner();
                state.active = false;
                state.handlers.clear();
            },
        }
    }
}

struct Slot {
    mailbox: Arc<Mailbox>,
    sender: mpsc::UnboundedSender<Arc<Envelope>>,
}

/// Ring of recently seen remote message ids.
struct DedupeWindow {
    capacity: usize,
    order: VecDeque<MessageId>,
    seen: HashSet<MessageId>,
}

impl DedupeWindow {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    /// Record `id`; returns `false` if it was already in the window.
    fn insert(&mut self, id: MessageId) -> bool {
        if !self.seen.insert(id) {
            return false;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.seen.remove(&old);
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Delivers messages between active plugins.
///
/// Each attached plugin gets a mailbox drained by its own tokio task, so
/// a slow handler only delays messages to that plugin. Queues are
/// unbounded: handlers may send to any plugin, themselves included,
/// without risk of two mailboxes waiting on each other.
///
/// Envelopes addressed to [`Recipient::Broadcast`] are also published on
/// the optional [`NotificationChannel`]; a router started with
/// [`MessageRouter::listen`] delivers broadcasts arriving from other host
/// instances to its own plugins.
pub struct MessageRouter {
    instance_id: HostInstanceId,
    audit: Arc<dyn AuditHook>,
    slots: RwLock<HashMap<PluginId, Slot>>,
    channel: Option<Arc<dyn NotificationChannel>>,
    dedupe: Mutex<DedupeWindow>,
}

impl MessageRouter {
    /// Create a router reporting handler failures to `audit`.
    #[must_use]
    pub fn new(audit: Arc<dyn AuditHook>) -> Self {
        Self {
            instance_id: HostInstanceId::new(),
            audit,
            slots: RwLock::new(HashMap::new()),
            channel: None,
            dedupe: Mutex::new(DedupeWindow::new(DEFAULT_DEDUPE_WINDOW)),
        }
    }

    /// Publish broadcasts on (and accept them from) a cross-process channel.
    #[must_use]
    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Set how many remote message ids are remembered for deduplication.
    #[must_use]
    pub fn with_dedupe_window(mut self, capacity: usize) -> Self {
        self.dedupe = Mutex::new(DedupeWindow::new(capacity));
        self
    }

    /// Identity stamped on envelopes created by this router.
    #[must_use]
    pub fn instance_id(&self) -> HostInstanceId {
        self.instance_id
    }

    /// Whether a cross-process channel is configured.
    #[must_use]
    pub fn has_channel(&self) -> bool {
        self.channel.is_some()
    }

    // -- mailbox lifecycle --

    /// Open a mailbox for `plugin_id` and start its dispatcher task.
    ///
    /// # Errors
    ///
    /// - [`RouterError::AlreadyActive`] if the plugin already has a mailbox.
    /// - [`RouterError::NoRuntime`] if called outside a tokio runtime.
    pub fn attach(&self, plugin_id: &PluginId) -> RouterResult<()> {
        let runtime = Handle::try_current().map_err(|_| RouterError::NoRuntime)?;
        let mut slots = self.write()?;
        if slots.contains_key(plugin_id) {
            return Err(RouterError::AlreadyActive(plugin_id.clone()));
        }

        let mailbox = Arc::new(Mailbox::new());
        let (sender, receiver) = mpsc::unbounded_channel();
        runtime.spawn(dispatch(
            plugin_id.clone(),
            Arc::clone(&mailbox),
            receiver,
            Arc::clone(&self.audit),
        ));
        slots.insert(plugin_id.clone(), Slot { mailbox, sender });

        debug!(plugin_id = %plugin_id, "Mailbox attached");
        Ok(())
    }

    /// Close the plugin's mailbox and drop every subscription.
    ///
    /// Once this returns no handler of the plugin is started again, and
    /// messages still queued for it are discarded. A handler call already
    /// in progress runs to completion. A call counts as in progress from
    /// the moment the dispatcher claims the handler under the mailbox lock,
    /// so it may still be about to poll its first step when this returns.
    /// `detach` does not wait for it.
    ///
    /// Returns `false` if the plugin had no mailbox.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::StateError`] if the router lock is poisoned.
    pub fn detach(&self, plugin_id: &PluginId) -> RouterResult<bool> {
        let slot = self.write()?.remove(plugin_id);
        let Some(slot) = slot else {
            return Ok(false);
        };
        slot.mailbox.close();
        debug!(plugin_id = %plugin_id, "Mailbox detached");
        Ok(true)
    }

    /// Whether the plugin has an open mailbox.
    #[must_use]
    pub fn is_active(&self, plugin_id: &PluginId) -> bool {
        self.slots
            .read()
            .map(|s| s.contains_key(plugin_id))
            .unwrap_or(false)
    }

    /// Ids of every plugin with an open mailbox, sorted.
    #[must_use]
    pub fn active_plugins(&self) -> Vec<PluginId> {
        let mut ids: Vec<PluginId> = self
            .slots
            .read()
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    // -- subscriptions --

    /// Register an inbound handler. Handlers run in registration order.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::NotActive`] if the plugin has no mailbox.
    pub fn subscribe(
        &self,
        plugin_id: &PluginId,
        handler: Arc<dyn MessageHandler>,
    ) -> RouterResult<SubscriptionId> {
        let slots = self.read()?;
        let slot = slots
            .get(plugin_id)
            .ok_or_else(|| RouterError::NotActive(plugin_id.clone()))?;
        let mut state = slot
            .mailbox
            .state
            .lock()
            .map_err(|e| RouterError::StateError(e.to_string()))?;
        if !state.active {
            return Err(RouterError::NotActive(plugin_id.clone()));
        }

        let id = SubscriptionId::new();
        trace!(plugin_id = %plugin_id, handler = handler.name(), subscription = %id, "Handler subscribed");
        state.handlers.push((id, handler));
        Ok(id)
    }

    /// Remove one handler. Returns `false` if it was not registered.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::StateError`] if a router lock is poisoned.
    pub fn unsubscribe(&self, plugin_id: &PluginId, id: SubscriptionId) -> RouterResult<bool> {
        let slots = self.read()?;
        let Some(slot) = slots.get(plugin_id) else {
            return Ok(false);
        };
        let mut state = slot
            .mailbox
            .state
            .lock()
            .map_err(|e| RouterError::StateError(e.to_string()))?;
        let before = state.handlers.len();
        state.handlers.retain(|(sub, _)| *sub != id);
        Ok(state.handlers.len() != before)
    }

    /// Number of handlers registered for the plugin.
    #[must_use]
    pub fn handler_count(&self, plugin_id: &PluginId) -> usize {
        self.slots
            .read()
            .ok()
            .and_then(|s| {
                s.get(plugin_id)
                    .and_then(|slot| slot.mailbox.state.lock().ok().map(|st| st.handlers.len()))
            })
            .unwrap_or(0)
    }

    // -- delivery --

    /// Send a message to one active plugin.
    ///
    /// Returns once the envelope is queued for the recipient; handler
    /// outcomes are reported to the audit hook, never to the sender.
    /// Messages from one sender to one recipient are delivered in the
    /// order they were sent.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::UnknownRecipient`] if `to` is not active.
    #[allow(clippy::unused_async)]
    pub async fn send(
        &self,
        from: &PluginId,
        to: &PluginId,
        payload: serde_json::Value,
    ) -> RouterResult<MessageId> {
        let envelope = Arc::new(Envelope::new(
            self.instance_id,
            from.clone(),
            Recipient::Plugin(to.clone()),
            payload,
        ));
        let message_id = envelope.message_id();

        let sender = self
            .read()?
            .get(to)
            .map(|slot| slot.sender.clone())
            .ok_or_else(|| RouterError::UnknownRecipient(to.clone()))?;
        sender
            .send(envelope)
            .map_err(|_| RouterError::UnknownRecipient(to.clone()))?;

        trace!(from = %from, to = %to, message_id = %message_id, "Message queued");
        Ok(message_id)
    }

    /// Deliver a message to every active plugin except `from`.
    ///
    /// Never fails: recipients detached concurrently are skipped and a
    /// channel publish failure is only logged.
    #[allow(clippy::unused_async)]
    pub async fn broadcast(&self, from: &PluginId, payload: serde_json::Value) -> MessageId {
        let envelope = Arc::new(Envelope::new(
            self.instance_id,
            from.clone(),
            Recipient::Broadcast,
            payload,
        ));
        let message_id = envelope.message_id();

        let delivered = self.fan_out(&envelope);
        trace!(from = %from, message_id = %message_id, delivered, "Broadcast queued");

        if let Some(channel) = &self.channel
            && let Err(e) = channel.publish(&envelope)
        {
            warn!(message_id = %message_id, error = %e, "Failed to publish broadcast to other instances");
        }
        message_id
    }

    /// Deliver a broadcast received from another host instance.
    ///
    /// Envelopes created by this router, point-to-point envelopes and
    /// message ids already seen are ignored. Returns the number of local
    /// plugins the envelope was queued for.
    pub fn ingest_remote(&self, envelope: Arc<Envelope>) -> usize {
        if envelope.origin() == self.instance_id || !envelope.recipient().is_broadcast() {
            return 0;
        }
        let fresh = match self.dedupe.lock() {
            Ok(mut window) => window.insert(envelope.message_id()),
            Err(e) => {
                warn!(error = %e, "Dedupe window poisoned, dropping remote envelope");
                false
            },
        };
        if !fresh {
            trace!(message_id = %envelope.message_id(), "Duplicate remote envelope ignored");
            return 0;
        }
        self.fan_out(&envelope)
    }

    /// Start delivering broadcasts from the configured channel.
    ///
    /// The subscription is opened before this returns, so every envelope
    /// published afterwards is seen. The task ends when the channel closes
    /// or the router is dropped.
    ///
    /// Returns `None` if no channel is configured.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::NoRuntime`] if called outside a tokio runtime.
    pub fn listen(self: &Arc<Self>) -> RouterResult<Option<JoinHandle<()>>> {
        let Some(channel) = &self.channel else {
            return Ok(None);
        };
        let runtime = Handle::try_current().map_err(|_| RouterError::NoRuntime)?;
        let mut subscription = channel.subscribe();
        let router: Weak<Self> = Arc::downgrade(self);
        let instance = self.instance_id;

        info!(instance = %instance, "Listening for broadcasts from other instances");
        Ok(Some(runtime.spawn(async move {
            while let Some(envelope) = subscription.recv().await {
                let Some(router) = router.upgrade() else {
                    break;
                };
                router.ingest_remote(envelope);
            }
            debug!(instance = %instance, "Cross-instance listener stopped");
        })))
    }

    fn fan_out(&self, envelope: &Arc<Envelope>) -> usize {
        let Ok(slots) = self.slots.read() else {
            warn!(message_id = %envelope.message_id(), "Router state poisoned, broadcast dropped");
            return 0;
        };
        let mut delivered = 0usize;
        for (plugin_id, slot) in slots.iter() {
            if plugin_id == envelope.sender() {
                continue;
            }
            if slot.sender.send(Arc::clone(envelope)).is_ok() {
                delivered = delivered.saturating_add(1);
            }
        }
        delivered
    }

    fn read(&self) -> RouterResult<RwLockReadGuard<'_, HashMap<PluginId, Slot>>> {
        self.slots
            .read()
            .map_err(|e| RouterError::StateError(e.to_string()))
    }

    fn write(&self) -> RouterResult<RwLockWriteGuard<'_, HashMap<PluginId, Slot>>> {
        self.slots
            .write()
            .map_err(|e| RouterError::StateError(e.to_string()))
    }
}

impl fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageRouter")
            .field("instance_id", &self.instance_id)
            .field("active_plugins", &self.active_plugins())
            .field("has_channel", &self.has_channel())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

async fn dispatch(
    plugin_id: PluginId,
    mailbox: Arc<Mailbox>,
    mut receiver: mpsc::UnboundedReceiver<Arc<Envelope>>,
    audit: Arc<dyn AuditHook>,
) {
    'envelopes: while let Some(envelope) = receiver.recv().await {
        let Some(subscriptions) = mailbox.subscriptions() else {
            break;
        };
        for id in subscriptions {
            // Checked per call: a detach between two handlers stops delivery.
            let handler = match mailbox.handler(id) {
                Ok(Some(handler)) => handler,
                Ok(None) => continue,
                Err(()) => break 'envelopes,
            };
            let outcome = AssertUnwindSafe(handler.handle(Arc::clone(&envelope)))
                .catch_unwind()
                .await;
            let error = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(panic) => HandlerError::new(format!("handler panicked: {}", panic_message(&*panic))),
            };
            warn!(
                plugin_id = %plugin_id,
                handler = handler.name(),
                message_id = %envelope.message_id(),
                error = %error,
                "Message handler failed"
            );
            audit.record(AuditRecord::handler_error(
                &plugin_id,
                &error,
                envelope.to_audit_value(),
            ));
        }
    }
    trace!(plugin_id = %plugin_id, "Mailbox dispatcher stopped");
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
