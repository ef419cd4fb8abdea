//! Log-only notification channel.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::Sink;
use crate::Result;
use crate::notification::payload::NotificationPayload;

/// Log channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Whether the channel is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Writes notifications to the application log. Useful for dry runs.
pub struct LogChannel {
    config: LogConfig,
}

impl LogChannel {
    pub fn new(config: LogConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Sink for LogChannel {
    fn channel_type(&self) -> &'static str {
        "log"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn deliver(&self, payload: &NotificationPayload) -> Result<()> {
        info!(
            platform = %payload.platform,
            account = %payload.account,
            category = %payload.category,
            item_id = %payload.item_id,
            url = %payload.url,
            "{}",
            payload.title
        );
        Ok(())
    }
}
