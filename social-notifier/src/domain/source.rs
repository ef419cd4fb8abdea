//! Tracked source entity.

use platforms_feed::{ContentCategory, PlatformKind};
use serde::{Deserialize, Serialize};

use super::DedupKey;

/// One account on one platform, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackedSource {
    pub platform: PlatformKind,
    pub account: String,
    /// Name used in notifications; falls back to the account handle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl TrackedSource {
    pub fn new(platform: PlatformKind, account: impl Into<String>) -> Self {
        Self {
            platform,
            account: account.into().trim().to_string(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.display_name = (!name.trim().is_empty()).then_some(name);
        self
    }

    /// `platform:account`, unique per source.
    pub fn source_id(&self) -> String {
        format!("{}:{}", self.platform, self.account)
    }

    /// Human readable name of the account.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.account)
    }

    pub fn dedup_key(&self, category: ContentCategory) -> DedupKey {
        DedupKey::new(self.platform, &self.account, category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_ids() {
        let source = TrackedSource::new(PlatformKind::Bluesky, " goose.bsky.social ");
        assert_eq!(source.source_id(), "bluesky:goose.bsky.social");
        assert_eq!(source.label(), "goose.bsky.social");
        assert_eq!(
            source.dedup_key(ContentCategory::ExternalPost).as_str(),
            "bluesky:goose.bsky.social:external_post"
        );

        let named = source.with_display_name("Goose");
        assert_eq!(named.label(), "Goose");
    }
}
