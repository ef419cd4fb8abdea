use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use super::models::{GraphErrorResponse, Media, MediaListResponse};
use crate::adapter::SourceAdapter;
use crate::adapter::client::{decode_json, send_raw};
use crate::adapter::error::FetchError;
use crate::adapter::utils::{clamp_window, parse_timestamp};
use crate::media::links::extract_links;
use crate::media::{CategoryHints, FetchedItem, PlatformKind, item::sort_newest_first};

const MEDIA_FIELDS: &str = "id,caption,media_type,media_product_type,permalink,timestamp,thumbnail_url,media_url,username";

const MAX_LIMIT: usize = 100;

/// Graph API error codes that signal throttling rather than a broken request.
const THROTTLE_CODES: &[i64] = &[4, 17, 32, 613, 80002];

/// Expired or revoked access token.
const INVALID_TOKEN_CODE: i64 = 190;

/// Instagram Graph API adapter.
///
/// Accounts are Instagram professional account ids (or `me` for the token owner).
pub struct Instagram {
    client: Client,
    access_token: String,
    base_url: String,
    include_stories: bool,
}

impl Instagram {
    pub const BASE_URL: &str = "https://graph.instagram.com/v21.0";

    pub fn new(client: Client, access_token: impl Into<String>) -> Self {
        Self {
            client,
            access_token: access_token.into(),
            base_url: Self::BASE_URL.to_string(),
            include_stories: false,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Also poll the account's active stories.
    pub fn with_stories(mut self, include_stories: bool) -> Self {
        self.include_stories = include_stories;
        self
    }

    async fn list_edge(
        &self,
        account: &str,
        edge: &str,
        limit: usize,
    ) -> Result<Vec<Media>, FetchError> {
        let limit = limit.to_string();
        let request = self
            .client
            .get(format!("{}/{}/{}", self.base_url, account.trim(), edge))
            .query(&[
                ("fields", MEDIA_FIELDS),
                ("limit", limit.as_str()),
                ("access_token", self.access_token.as_str()),
            ]);
        let raw = send_raw(request).await?;
        let response: MediaListResponse = decode_json(raw, classify_error)?;
        Ok(response.data)
    }
}

#[async_trait]
impl SourceAdapter for Instagram {
    fn platform(&self) -> PlatformKind {
        PlatformKind::Instagram
    }

    async fn fetch_recent(
        &self,
        account: &str,
        window_size: usize,
    ) -> Result<Vec<FetchedItem>, FetchError> {
        let limit = clamp_window(window_size, MAX_LIMIT);
        let mut media = self.list_edge(account, "media", limit).await?;

        if self.include_stories {
            match self.list_edge(account, "stories", limit).await {
                Ok(stories) => media.extend(stories.into_iter().map(|mut s| {
                    s.media_product_type = Some("STORY".to_string());
                    s
                })),
                // Stories need extra permissions; a missing grant must not block the feed.
                Err(FetchError::Fatal(reason)) => {
                    warn!(account, %reason, "Instagram stories unavailable");
                }
                Err(e) => return Err(e),
            }
        }

        let mut items = items_from_media(media)?;
        items.truncate(window_size.max(1));
        Ok(items)
    }
}

/// Map a Graph API error body onto the fetch error taxonomy.
pub fn classify_error(status: StatusCode, retry_after: Option<Duration>, body: &str) -> FetchError {
    if let Ok(envelope) = serde_json::from_str::<GraphErrorResponse>(body) {
        let err = envelope.error;
        if THROTTLE_CODES.contains(&err.code) {
            return FetchError::RateLimited { retry_after };
        }
        if err.code == INVALID_TOKEN_CODE {
            return FetchError::fatal(format!("access token rejected: {}", err.message));
        }
        if err.is_transient {
            return FetchError::transient(err.message);
        }
    }
    FetchError::from_status(status, retry_after, body)
}

pub(crate) fn items_from_media(media: Vec<Media>) -> Result<Vec<FetchedItem>, FetchError> {
    let mut items = Vec::with_capacity(media.len());

    for m in media {
        let id = m
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| FetchError::malformed("media without id"))?;
        let Some(published_at) = m.timestamp.as_deref().and_then(parse_timestamp) else {
            warn!(media_id = %id, "Skipping Instagram media without a valid timestamp");
            continue;
        };

        let product = m.media_product_type.as_deref().unwrap_or("FEED");
        let media_type = m.media_type.as_deref().unwrap_or("IMAGE");
        let hints = CategoryHints {
            is_short: product == "REELS",
            is_story: product == "STORY",
            media_type: Some(media_type.to_string()),
            ..Default::default()
        };

        let caption = m.caption.unwrap_or_default();
        let title = caption.trim().to_string();
        let thumbnail = if media_type == "VIDEO" {
            m.thumbnail_url.or(m.media_url)
        } else {
            m.media_url.or(m.thumbnail_url)
        };
        let url = m
            .permalink
            .unwrap_or_else(|| format!("https://www.instagram.com/p/{id}/"));
        let author_url = m
            .username
            .as_deref()
            .map(|u| format!("https://www.instagram.com/{u}/"));

        debug!(media_id = %id, product, media_type, "Parsed Instagram media");

        items.push(
            FetchedItem::builder(id, PlatformKind::Instagram, published_at)
                .title(title)
                .url(url)
                .maybe_thumbnail_url(thumbnail)
                .author(m.username, author_url, None)
                .hints(hints)
                .secondary_links(
                    extract_links(&caption)
                        .into_iter()
                        .filter(|l| l.label != "Instagram Link")
                        .collect(),
                )
                .build(),
        );
    }

    sort_newest_first(&mut items);
    Ok(items)
}
