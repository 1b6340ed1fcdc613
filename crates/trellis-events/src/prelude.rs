//! Prelude module - commonly used types for convenient import.
//!
//! Use `use trellis_events::prelude::*;` to import all essential types.

// Errors
pub use crate::{ChannelError, HandlerError, RouterError, RouterResult};

// Messages
pub use crate::{Envelope, HostInstanceId, MessageId, Recipient};

// Routing
pub use crate::{FnHandler, MessageHandler, MessageRouter, SubscriptionId, handler_fn};

// Cross-process delivery
pub use crate::{LocalNotificationChannel, NotificationChannel, NotificationSubscription};
