//! Discord webhook notification channel.
//!
//! Implements Discord's recommended rate limit handling:
//! - No hardcoded rate limits
//! - Parses response headers (X-RateLimit-*)
//! - Retries on 429 responses respecting Retry-After header

use std::time::Duration;

use async_trait::async_trait;
use platforms_feed::PlatformKind;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::Sink;
use crate::notification::formatter::truncate_chars;
use crate::notification::payload::NotificationPayload;
use crate::{Error, Result};

/// Maximum number of retries for rate-limited requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;
/// Longest single wait on a 429 before retrying.
const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

// Embed limits documented by Discord.
const TITLE_LIMIT: usize = 256;
const DESCRIPTION_LIMIT: usize = 4096;
const FIELD_NAME_LIMIT: usize = 256;
const FIELD_VALUE_LIMIT: usize = 1024;
const MAX_FIELDS: usize = 25;

/// Discord channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Whether the channel is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Discord webhook URL. May be supplied through `DISCORD_WEBHOOK_URL`.
    #[serde(default)]
    pub webhook_url: String,
    /// Optional username for the webhook.
    pub username: Option<String>,
    /// Optional avatar URL for the webhook.
    pub avatar_url: Option<String>,
    /// Optional message text sent with the embed, e.g. a role mention.
    pub content: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            webhook_url: String::new(),
            username: Some("social-notifier".to_string()),
            avatar_url: None,
            content: None,
        }
    }
}

/// Discord notification channel.
pub struct DiscordChannel {
    config: DiscordConfig,
    client: Client,
}

impl DiscordChannel {
    /// Create a new Discord channel.
    pub fn new(config: DiscordConfig, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    /// Get the embed color for a platform.
    fn get_color(platform: PlatformKind) -> u32 {
        match platform {
            PlatformKind::Youtube => 0xff0000,   // Red
            PlatformKind::Instagram => 0xe1306c, // Pink
            PlatformKind::Bluesky => 0x1185fe,   // Blue
        }
    }

    /// Build the webhook payload for a notification.
    fn build_payload(&self, payload: &NotificationPayload) -> serde_json::Value {
        let mut embed = json!({
            "title": truncate_chars(&payload.title, TITLE_LIMIT),
            "description": truncate_chars(&payload.body, DESCRIPTION_LIMIT),
            "url": payload.url,
            "color": Self::get_color(payload.platform),
            "timestamp": payload.timestamp.to_rfc3339(),
            "footer": {
                "text": format!("{} | {}", payload.platform.display_name(), payload.category)
            }
        });

        if let Some(author) = &payload.author {
            let mut block = json!({ "name": truncate_chars(&author.name, TITLE_LIMIT) });
            if let Some(url) = &author.url {
                block["url"] = json!(url);
            }
            if let Some(icon) = &author.icon_url {
                block["icon_url"] = json!(icon);
            }
            embed["author"] = block;
        }
        if let Some(image) = &payload.image_url {
            embed["image"] = json!({ "url": image });
        }
        if !payload.fields.is_empty() {
            let fields: Vec<_> = payload
                .fields
                .iter()
                .take(MAX_FIELDS)
                .map(|f| {
                    json!({
                        "name": truncate_chars(&f.name, FIELD_NAME_LIMIT),
                        "value": truncate_chars(&f.value, FIELD_VALUE_LIMIT),
                        "inline": false,
                    })
                })
                .collect();
            embed["fields"] = json!(fields);
        }

        let mut body = json!({
            "embeds": [embed]
        });

        if let Some(username) = &self.config.username {
            body["username"] = json!(username);
        }
        if let Some(avatar_url) = &self.config.avatar_url {
            body["avatar_url"] = json!(avatar_url);
        }
        if let Some(content) = &self.config.content {
            body["content"] = json!(content);
        }

        body
    }

    /// Send request with rate limit handling.
    /// Retries on 429 responses respecting the Retry-After header.
    async fn send_with_retry(&self, body: &serde_json::Value) -> Result<()> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            let response = self
                .client
                .post(&self.config.webhook_url)
                .json(body)
                .send()
                .await
                .map_err(|e| Error::delivery("discord", format!("request failed: {e}")))?;

            let status = response.status();

            if status.is_success() {
                return Ok(());
            }

            if status.as_u16() == 429 {
                let retry_after = parse_retry_after(response.headers());

                if attempts >= MAX_RATE_LIMIT_RETRIES {
                    warn!(
                        "Discord rate limit: max retries ({}) exceeded, last retry_after was {:?}",
                        MAX_RATE_LIMIT_RETRIES, retry_after
                    );
                    return Err(Error::delivery(
                        "discord",
                        format!("rate limit exceeded after {MAX_RATE_LIMIT_RETRIES} retries"),
                    ));
                }

                let wait_duration = retry_after
                    .unwrap_or(Duration::from_secs(1))
                    .min(MAX_RATE_LIMIT_WAIT);
                debug!(
                    "Discord rate limited (429), waiting {:?} before retry (attempt {}/{})",
                    wait_duration, attempts, MAX_RATE_LIMIT_RETRIES
                );
                tokio::time::sleep(wait_duration).await;
                continue;
            }

            // Other error - don't retry
            let text = response.text().await.unwrap_or_default();
            warn!("Discord webhook failed: {} - {}", status, text);
            return Err(Error::delivery(
                "discord",
                format!("webhook returned {status}: {text}"),
            ));
        }
    }
}

/// Parse the Retry-After duration from a 429 response.
fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    // Discord sets Retry-After; X-RateLimit-Reset-After is the fallback.
    ["Retry-After", "X-RateLimit-Reset-After"]
        .into_iter()
        .filter_map(|name| headers.get(name)?.to_str().ok()?.trim().parse::<f64>().ok())
        .find_map(|secs| Duration::try_from_secs_f64(secs).ok())
}

#[async_trait]
impl Sink for DiscordChannel {
    fn channel_type(&self) -> &'static str {
        "discord"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.webhook_url.is_empty()
    }

    async fn deliver(&self, payload: &NotificationPayload) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        let body = self.build_payload(payload);
        self.send_with_retry(&body).await?;

        debug!(item_id = %payload.item_id, "Discord notification sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::payload::{PayloadAuthor, PayloadField};
    use chrono::Utc;
    use platforms_feed::ContentCategory;

    fn payload() -> NotificationPayload {
        NotificationPayload {
            title: "New Bluesky post from goose.bsky.social".into(),
            body: "New album out now".into(),
            url: "https://bsky.app/profile/goose.bsky.social/post/3lb".into(),
            image_url: Some("https://cdn.example/thumb.jpg".into()),
            author: Some(PayloadAuthor {
                name: "Goose".into(),
                url: Some("https://bsky.app/profile/goose.bsky.social".into()),
                icon_url: Some("https://cdn.example/avatar.jpg".into()),
            }),
            fields: vec![PayloadField {
                name: "YouTube Link".into(),
                value: "https://youtu.be/abc".into(),
            }],
            category: ContentCategory::ExternalPost,
            platform: PlatformKind::Bluesky,
            account: "goose.bsky.social".into(),
            item_id: "at://x".into(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_discord_config_default() {
        let config = DiscordConfig::default();
        assert!(!config.enabled);
        assert!(config.webhook_url.is_empty());
    }

    #[test]
    fn test_discord_channel_disabled() {
        let channel = DiscordChannel::new(DiscordConfig::default(), Duration::from_secs(5));
        assert!(!channel.is_enabled());
    }

    #[test]
    fn test_get_color() {
        assert_eq!(DiscordChannel::get_color(PlatformKind::Youtube), 0xff0000);
        assert_eq!(DiscordChannel::get_color(PlatformKind::Bluesky), 0x1185fe);
    }

    #[test]
    fn test_build_payload() {
        let channel = DiscordChannel::new(DiscordConfig::default(), Duration::from_secs(5));
        let body = channel.build_payload(&payload());

        assert!(body["embeds"].is_array());
        let embed = &body["embeds"][0];
        assert_eq!(embed["title"], "New Bluesky post from goose.bsky.social");
        assert_eq!(embed["description"], "New album out now");
        assert_eq!(embed["color"], 0x1185fe);
        assert_eq!(embed["author"]["name"], "Goose");
        assert_eq!(embed["author"]["icon_url"], "https://cdn.example/avatar.jpg");
        assert_eq!(embed["image"]["url"], "https://cdn.example/thumb.jpg");
        assert_eq!(embed["fields"][0]["name"], "YouTube Link");
        assert_eq!(embed["fields"][0]["inline"], false);
        assert_eq!(embed["footer"]["text"], "Bluesky | external_post");
        assert_eq!(body["username"], "social-notifier");
    }

    #[test]
    fn test_build_payload_truncates_to_discord_limits() {
        let channel = DiscordChannel::new(
            DiscordConfig {
                enabled: true,
                webhook_url: "https://example.com".to_string(),
                username: Some("CustomBot".to_string()),
                avatar_url: Some("https://example.com/avatar.png".to_string()),
                content: Some("<@&123>".to_string()),
            },
            Duration::from_secs(5),
        );
        let mut long = payload();
        long.title = "t".repeat(400);
        long.body = "b".repeat(5000);
        long.fields = (0..30)
            .map(|i| PayloadField {
                name: format!("Link {i}"),
                value: "v".repeat(2000),
            })
            .collect();

        let body = channel.build_payload(&long);
        let embed = &body["embeds"][0];
        assert_eq!(embed["title"].as_str().unwrap().chars().count(), TITLE_LIMIT);
        assert_eq!(
            embed["description"].as_str().unwrap().chars().count(),
            DESCRIPTION_LIMIT
        );
        assert_eq!(embed["fields"].as_array().unwrap().len(), MAX_FIELDS);
        assert_eq!(
            embed["fields"][0]["value"].as_str().unwrap().chars().count(),
            FIELD_VALUE_LIMIT
        );
        assert_eq!(body["username"], "CustomBot");
        assert_eq!(body["avatar_url"], "https://example.com/avatar.png");
        assert_eq!(body["content"], "<@&123>");
    }

    #[test]
    fn test_parse_retry_after_headers() {
        use reqwest::header::{HeaderMap, HeaderValue};

        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert("X-RateLimit-Reset-After", HeaderValue::from_static("0.5"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_millis(500)));

        headers.insert("Retry-After", HeaderValue::from_static("2"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(2)));

        // Out-of-range values fall through instead of panicking.
        headers.insert("Retry-After", HeaderValue::from_static("1e20"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_millis(500)));
    }
}
