//! Generic webhook notification channel.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header::HeaderMap};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::Sink;
use crate::notification::payload::NotificationPayload;
use crate::{Error, Result};

/// Webhook channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Whether the channel is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Webhook URL.
    pub url: String,
    /// HTTP method (default: POST).
    #[serde(default = "default_method")]
    pub method: String,
    /// Custom headers.
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    /// Authentication type.
    pub auth: Option<WebhookAuth>,
}

fn default_true() -> bool {
    true
}

fn default_method() -> String {
    "POST".to_string()
}

/// Webhook authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WebhookAuth {
    /// Bearer token authentication.
    Bearer { token: String },
    /// Basic authentication.
    Basic { username: String, password: String },
    /// Custom header authentication.
    Header { name: String, value: String },
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            method: "POST".to_string(),
            headers: Vec::new(),
            auth: None,
        }
    }
}

/// Generic webhook notification channel.
pub struct WebhookChannel {
    config: WebhookConfig,
    client: Client,
}

impl WebhookChannel {
    /// Create a new Webhook channel.
    pub fn new(config: WebhookConfig, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self { config, client }
    }

    /// Build the request headers.
    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        for (name, value) in &self.config.headers {
            if let (Ok(name), Ok(value)) = (
                name.parse::<reqwest::header::HeaderName>(),
                value.parse::<reqwest::header::HeaderValue>(),
            ) {
                headers.insert(name, value);
            }
        }

        if let Some(auth) = &self.config.auth {
            match auth {
                WebhookAuth::Bearer { token } => {
                    if let Ok(value) = format!("Bearer {}", token).parse() {
                        headers.insert(reqwest::header::AUTHORIZATION, value);
                    }
                }
                WebhookAuth::Header { name, value } => {
                    if let (Ok(name), Ok(value)) = (
                        name.parse::<reqwest::header::HeaderName>(),
                        value.parse::<reqwest::header::HeaderValue>(),
                    ) {
                        headers.insert(name, value);
                    }
                }
                WebhookAuth::Basic { .. } => {
                    // Basic auth is handled separately in the request builder
                }
            }
        }

        headers
    }

    /// Build the JSON body.
    fn build_payload(&self, payload: &NotificationPayload) -> serde_json::Value {
        json!({
            "event_type": "new_item",
            "platform": payload.platform,
            "account": payload.account,
            "category": payload.category,
            "title": payload.title,
            "description": payload.body,
            "url": payload.url,
            "timestamp": payload.timestamp.to_rfc3339(),
            "data": payload
        })
    }
}

#[async_trait]
impl Sink for WebhookChannel {
    fn channel_type(&self) -> &'static str {
        "webhook"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.url.is_empty()
    }

    async fn deliver(&self, payload: &NotificationPayload) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        let body = self.build_payload(payload);
        let headers = self.build_headers();

        let mut request = match self.config.method.to_uppercase().as_str() {
            "PUT" => self.client.put(&self.config.url),
            _ => self.client.post(&self.config.url),
        };

        request = request.headers(headers).json(&body);

        if let Some(WebhookAuth::Basic { username, password }) = &self.config.auth {
            request = request.basic_auth(username, Some(password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::delivery("webhook", format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            warn!("Webhook failed: {} - {}", status, text);
            return Err(Error::delivery(
                "webhook",
                format!("endpoint returned {status}: {text}"),
            ));
        }

        debug!(item_id = %payload.item_id, "Webhook notification sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use platforms_feed::{ContentCategory, PlatformKind};

    #[test]
    fn test_webhook_config_default() {
        let config = WebhookConfig::default();
        assert!(!config.enabled);
        assert!(config.url.is_empty());
        assert_eq!(config.method, "POST");
    }

    #[test]
    fn test_build_headers_with_auth() {
        let channel = WebhookChannel::new(
            WebhookConfig {
                enabled: true,
                url: "https://hooks.example/notify".into(),
                headers: vec![("X-Source".into(), "social-notifier".into())],
                auth: Some(WebhookAuth::Bearer {
                    token: "secret".into(),
                }),
                ..Default::default()
            },
            Duration::from_secs(5),
        );

        let headers = channel.build_headers();
        assert_eq!(headers["authorization"], "Bearer secret");
        assert_eq!(headers["x-source"], "social-notifier");
    }

    #[test]
    fn test_build_payload() {
        let channel = WebhookChannel::new(WebhookConfig::default(), Duration::from_secs(5));
        let payload = NotificationPayload {
            title: "Goose is live on YouTube".into(),
            body: "Live from the Capitol Theatre".into(),
            url: "https://www.youtube.com/watch?v=live0001".into(),
            image_url: None,
            author: None,
            fields: vec![],
            category: ContentCategory::Live,
            platform: PlatformKind::Youtube,
            account: "@goose".into(),
            item_id: "live0001".into(),
            timestamp: Utc::now(),
        };

        let body = channel.build_payload(&payload);
        assert_eq!(body["event_type"], "new_item");
        assert_eq!(body["platform"], "youtube");
        assert_eq!(body["category"], "live");
        assert_eq!(body["data"]["item_id"], "live0001");
    }

    #[test]
    fn test_auth_from_toml() {
        let config: WebhookConfig = toml::from_str(
            r#"
            url = "https://hooks.example/notify"
            auth = { type = "header", name = "X-Api-Key", value = "k" }
            "#,
        )
        .unwrap();
        assert!(config.enabled);
        assert!(matches!(config.auth, Some(WebhookAuth::Header { .. })));
    }
}
