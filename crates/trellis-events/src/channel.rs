//! Cross-process notification channels.
//!
//! Broadcasts are also published on a [`NotificationChannel`] so other host
//! processes running the same application see them. Delivery over a
//! channel is at-most-once and unordered relative to in-process delivery.
//! The router deduplicates by message id and ignores its own envelopes.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::envelope::Envelope;
use crate::error::ChannelError;

/// Default buffer size for [`LocalNotificationChannel`].
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// A shared publish/subscribe transport between host processes.
///
/// Implementations wrap whatever IPC primitive the platform offers. The
/// router only needs fire-and-forget publish and a stream of envelopes.
pub trait NotificationChannel: Send + Sync {
    /// Publish an envelope to every other subscriber.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError`] if the transport rejects the envelope.
    /// Having no subscribers is not an error.
    fn publish(&self, envelope: &Envelope) -> Result<(), ChannelError>;

    /// Open a new subscription.
    fn subscribe(&self) -> Box<dyn NotificationSubscription>;
}

/// Receiving end of a [`NotificationChannel`].
#[async_trait]
pub trait NotificationSubscription: Send {
    /// Wait for the next envelope. `None` means the channel is closed.
    async fn recv(&mut self) -> Option<Arc<Envelope>>;
}

// ---------------------------------------------------------------------------
// In-process channel
// ---------------------------------------------------------------------------

/// [`NotificationChannel`] over a tokio broadcast channel.
///
/// Connects several host instances living in one process (tests, embedded
/// multi-window hosts). Slow subscribers lose the oldest envelopes, which
/// is within the at-most-once contract.
#[derive(Debug, Clone)]
pub struct LocalNotificationChannel {
    sender: broadcast::Sender<Arc<Envelope>>,
    capacity: usize,
}

impl LocalNotificationChannel {
    /// Create a channel with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a channel with the given capacity (minimum 1).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    /// The channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of open subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LocalNotificationChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationChannel for LocalNotificationChannel {
    fn publish(&self, envelope: &Envelope) -> Result<(), ChannelError> {
        match self.sender.send(Arc::new(envelope.clone())) {
            Ok(receivers) => {
                trace!(message_id = %envelope.message_id(), receivers, "Published envelope");
            },
            Err(_) => {
                trace!(message_id = %envelope.message_id(), "No subscribers for envelope");
            },
        }
        Ok(())
    }

    fn subscribe(&self) -> Box<dyn NotificationSubscription> {
        Box::new(LocalSubscription {
            receiver: self.sender.subscribe(),
        })
    }
}

struct LocalSubscription {
    receiver: broadcast::Receiver<Arc<Envelope>>,
}

#[async_trait]
impl NotificationSubscription for LocalSubscription {
    async fn recv(&mut self) -> Option<Arc<Envelope>> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) => return Some(envelope),
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(skipped = count, "Notification subscriber lagged, envelopes dropped");
                },
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
