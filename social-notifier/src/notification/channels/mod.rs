//! Notification channels.
//!
//! This module provides the destinations a payload can be delivered to:
//! - Discord webhooks
//! - Generic webhooks (HTTP POST/PUT)
//! - The application log

mod discord;
mod log;
mod webhook;

pub use discord::{DiscordChannel, DiscordConfig};
pub use log::{LogChannel, LogConfig};
pub use webhook::{WebhookAuth, WebhookChannel, WebhookConfig};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::payload::NotificationPayload;
use crate::{Error, Result};

/// A destination for notifications.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Get the channel type name.
    fn channel_type(&self) -> &'static str;

    /// Check if the channel is enabled.
    fn is_enabled(&self) -> bool;

    /// Deliver one notification. `Ok` means the destination accepted it.
    async fn deliver(&self, payload: &NotificationPayload) -> Result<()>;
}

/// Channel configuration wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChannelConfig {
    /// Discord webhook channel.
    Discord(DiscordConfig),
    /// Generic webhook channel.
    Webhook(WebhookConfig),
    /// Log-only channel.
    Log(LogConfig),
}

impl ChannelConfig {
    /// Get the channel type name.
    pub fn channel_type(&self) -> &'static str {
        match self {
            Self::Discord(_) => "discord",
            Self::Webhook(_) => "webhook",
            Self::Log(_) => "log",
        }
    }

    /// Check if the channel is enabled.
    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Discord(c) => c.enabled && !c.webhook_url.trim().is_empty(),
            Self::Webhook(c) => c.enabled && !c.url.trim().is_empty(),
            Self::Log(c) => c.enabled,
        }
    }

    /// Build the channel. `timeout` bounds every HTTP request it makes.
    pub fn build(&self, timeout: Duration) -> Arc<dyn Sink> {
        match self {
            Self::Discord(c) => Arc::new(DiscordChannel::new(c.clone(), timeout)),
            Self::Webhook(c) => Arc::new(WebhookChannel::new(c.clone(), timeout)),
            Self::Log(c) => Arc::new(LogChannel::new(c.clone())),
        }
    }
}

/// Partially delivered items remembered at once; the record is reset past this.
const MAX_PENDING_ITEMS: usize = 256;

/// Fans a payload out to every enabled channel.
///
/// Delivery only counts as successful when every enabled channel accepted the
/// payload; otherwise the item stays unseen and is retried next cycle. Channels
/// that already accepted an item are not sent it again on retry.
#[derive(Clone, Default)]
pub struct Dispatcher {
    channels: Vec<Arc<dyn Sink>>,
    /// Channel indices that accepted a not yet fully delivered item.
    pending: Arc<Mutex<FxHashMap<String, FxHashSet<usize>>>>,
}

impl Dispatcher {
    pub fn new(channels: Vec<Arc<dyn Sink>>) -> Self {
        Self {
            channels,
            pending: Arc::default(),
        }
    }

    pub fn from_configs(configs: &[ChannelConfig], timeout: Duration) -> Self {
        Self::new(
            configs
                .iter()
                .filter(|c| c.is_enabled())
                .map(|c| c.build(timeout))
                .collect(),
        )
    }

    pub fn enabled_count(&self) -> usize {
        self.channels.iter().filter(|c| c.is_enabled()).count()
    }

    fn pending_key(payload: &NotificationPayload) -> String {
        format!(
            "{}:{}:{}:{}",
            payload.platform.as_str(),
            payload.account,
            payload.category,
            payload.item_id
        )
    }
}

#[async_trait]
impl Sink for Dispatcher {
    fn channel_type(&self) -> &'static str {
        "dispatcher"
    }

    fn is_enabled(&self) -> bool {
        self.enabled_count() > 0
    }

    async fn deliver(&self, payload: &NotificationPayload) -> Result<()> {
        let key = Self::pending_key(payload);
        let mut accepted = self.pending.lock().remove(&key).unwrap_or_default();
        let mut failures = Vec::new();
        let mut attempted = 0usize;

        for (index, channel) in self.channels.iter().enumerate() {
            if !channel.is_enabled() {
                continue;
            }
            attempted += 1;
            if accepted.contains(&index) {
                trace!(
                    channel = channel.channel_type(),
                    item_id = %payload.item_id,
                    "Already delivered, skipping"
                );
                continue;
            }
            match channel.deliver(payload).await {
                Ok(()) => {
                    accepted.insert(index);
                }
                Err(e) => {
                    warn!(
                        channel = channel.channel_type(),
                        item_id = %payload.item_id,
                        error = %e,
                        "Notification delivery failed"
                    );
                    failures.push(format!("{}: {e}", channel.channel_type()));
                }
            }
        }

        if attempted == 0 {
            return Err(Error::delivery("dispatcher", "no enabled channels"));
        }
        if !failures.is_empty() {
            if !accepted.is_empty() {
                warn!(
                    item_id = %payload.item_id,
                    delivered = accepted.len(),
                    failed = failures.len(),
                    "Partial delivery; only failed channels will be retried"
                );
                let mut pending = self.pending.lock();
                if pending.len() >= MAX_PENDING_ITEMS {
                    pending.clear();
                }
                pending.insert(key, accepted);
            }
            return Err(Error::delivery("dispatcher", failures.join("; ")));
        }

        debug!(channels = attempted, item_id = %payload.item_id, "Notification delivered");
        Ok(())
    }
}
