//! Trellis Events - message routing between active plugins.
//!
//! This crate provides:
//! - [`Envelope`], the immutable unit of a routed message
//! - [`MessageRouter`], which delivers point-to-point and broadcast
//!   messages to the inbound [`MessageHandler`]s of active plugins
//! - The [`NotificationChannel`] trait for cross-process broadcast, with
//!   an in-process [`LocalNotificationChannel`] built on a tokio broadcast
//!   channel
//!
//! # Delivery model
//!
//! Every active plugin owns a mailbox: a queue drained by its own task.
//! Sends from one sender to one recipient therefore arrive in send order,
//! while different recipients are served concurrently. A message
//! accepted by the router cannot be withdrawn, but detaching a plugin
//! stops its mailbox at once: nothing queued for it is delivered after
//! [`MessageRouter::detach`] returns.
//!
//! Handler failures (errors or panics) are isolated per handler and
//! reported to the [`AuditHook`](trellis_audit::AuditHook) with the
//! recipient id and the envelope.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use trellis_audit::MemoryAuditLog;
//! use trellis_core::PluginId;
//! use trellis_events::{Envelope, HandlerError, MessageRouter, handler_fn};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let router = Arc::new(MessageRouter::new(Arc::new(MemoryAuditLog::new())));
//! let a = PluginId::new("A")?;
//! let b = PluginId::new("B")?;
//!
//! router.attach(&a)?;
//! router.attach(&b)?;
//! router.subscribe(&b, handler_fn(|envelope: Arc<Envelope>| async move {
//!     println!("B got {}", envelope.payload());
//!     Ok::<(), HandlerError>(())
//! }))?;
//!
//! let id = router.send(&a, &b, serde_json::json!({ "ping": 1 })).await?;
//! println!("sent {id}");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod channel;
mod envelope;
mod error;
mod handler;
mod router;

pub use channel::{
    DEFAULT_CHANNEL_CAPACITY, LocalNotificationChannel, NotificationChannel,
    NotificationSubscription,
};
pub use envelope::{Envelope, HostInstanceId, MessageId, Recipient};
pub use error::{ChannelError, HandlerError, RouterError, RouterResult};
pub use handler::{FnHandler, MessageHandler, SubscriptionId, handler_fn};
pub use router::{DEFAULT_DEDUPE_WINDOW, MessageRouter};
