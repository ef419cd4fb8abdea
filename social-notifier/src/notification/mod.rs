//! Notification formatting and delivery.
//!
//! The scheduler only ever sees [`NotificationPayload`]; turning it into a
//! Discord embed or a webhook body is the job of the channel.

pub mod channels;
mod formatter;
mod payload;

pub use channels::{ChannelConfig, Dispatcher, Sink};
pub use formatter::{DEFAULT_MAX_BODY_CHARS, NotificationFormatter};
pub use payload::{NotificationPayload, PayloadAuthor, PayloadField};
