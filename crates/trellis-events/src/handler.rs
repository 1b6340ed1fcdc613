//! Inbound message handlers.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::envelope::Envelope;
use crate::error::HandlerError;

/// Identifies one handler registration on a plugin's mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A plugin's inbound message handler.
///
/// A plugin may register several; they run in registration order for
/// every delivered envelope. An error (or panic) in one handler is audited
/// and does not stop the others.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle one delivered message.
    async fn handle(&self, envelope: Arc<Envelope>) -> Result<(), HandlerError>;

    /// Human-readable name for logs.
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "handler"
    }
}

/// Adapter turning an async closure into a [`MessageHandler`].
pub struct FnHandler<F, Fut> {
    f: F,
    _marker: PhantomData<fn() -> Fut>,
}

impl<F, Fut> fmt::Debug for FnHandler<F, Fut> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F, Fut>
where
    F: Fn(Arc<Envelope>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, envelope: Arc<Envelope>) -> Result<(), HandlerError> {
        (self.f)(envelope).await
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "fn-handler"
    }
}

/// Wrap an async closure as a shareable handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<FnHandler<F, Fut>>
where
    F: Fn(Arc<Envelope>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler {
        f,
        _marker: PhantomData,
    })
}
