use chrono::{DateTime, Utc};
use platforms_feed::{ContentCategory, PlatformKind};
use serde::{Deserialize, Serialize};

/// Author block shown next to a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadAuthor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadField {
    pub name: String,
    pub value: String,
}

/// Destination-agnostic notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<PayloadAuthor>,
    #[serde(default)]
    pub fields: Vec<PayloadField>,
    pub category: ContentCategory,
    pub platform: PlatformKind,
    pub account: String,
    pub item_id: String,
    /// Publish time of the announced item.
    pub timestamp: DateTime<Utc>,
}
