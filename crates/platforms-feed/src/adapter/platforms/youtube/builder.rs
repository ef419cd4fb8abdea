use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Client, StatusCode};
use tracing::debug;

use super::models::{
    ApiErrorResponse, ChannelListResponse, PlaylistItemsResponse, Video, VideoListResponse,
};
use crate::adapter::SourceAdapter;
use crate::adapter::client::{decode_json, send_raw};
use crate::adapter::error::FetchError;
use crate::adapter::utils::{clamp_window, parse_iso8601_duration, parse_timestamp};
use crate::cache::ResultCache;
use crate::media::links::extract_links;
use crate::media::{CategoryHints, FetchedItem, PlatformKind, item::sort_newest_first};

/// Channel lookups change rarely; keep them for a day.
const CHANNEL_CACHE_TTL: Duration = Duration::from_secs(24 * 3600);

/// Data API page size limit.
const MAX_RESULTS: usize = 50;

/// Resolved channel identity, cached per account handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub channel_id: String,
    pub uploads_playlist_id: String,
    pub title: String,
    pub avatar: Option<String>,
}

impl ChannelInfo {
    pub fn channel_url(&self) -> String {
        format!("https://www.youtube.com/channel/{}", self.channel_id)
    }
}

/// YouTube Data API v3 adapter.
pub struct Youtube {
    client: Client,
    api_key: String,
    base_url: String,
    channels: Mutex<ResultCache<String, ChannelInfo>>,
}

impl Youtube {
    pub const BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

    pub fn new(client: Client, api_key: impl Into<String>, cache_size: usize) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: Self::BASE_URL.to_string(),
            channels: Mutex::new(ResultCache::with_ttl(cache_size, CHANNEL_CACHE_TTL)),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Resolve an account (`@handle` or `UC…` channel id) to its channel info,
    /// consulting the lookup cache first.
    pub async fn resolve_channel(&self, account: &str) -> Result<ChannelInfo, FetchError> {
        let key = account.trim().to_string();
        if let Some(info) = self.channels.lock().get(&key) {
            return Ok(info);
        }

        let mut request = self
            .client
            .get(format!("{}/channels", self.base_url))
            .query(&[("part", "snippet,contentDetails"), ("key", &self.api_key)]);
        request = if is_channel_id(&key) {
            request.query(&[("id", key.as_str())])
        } else {
            let handle = if key.starts_with('@') {
                key.clone()
            } else {
                format!("@{key}")
            };
            request.query(&[("forHandle", handle)])
        };

        let raw = send_raw(request).await?;
        let response: ChannelListResponse = decode_json(raw, classify_error)?;
        let info = channel_info_from(response, &key)?;

        debug!(
            account = %key,
            channel_id = %info.channel_id,
            uploads = %info.uploads_playlist_id,
            "Resolved YouTube channel"
        );
        self.channels.lock().set(key, info.clone());
        Ok(info)
    }

    async fn list_upload_ids(
        &self,
        playlist_id: &str,
        window_size: usize,
    ) -> Result<Vec<String>, FetchError> {
        let max_results = clamp_window(window_size, MAX_RESULTS).to_string();
        let request = self
            .client
            .get(format!("{}/playlistItems", self.base_url))
            .query(&[
                ("part", "contentDetails"),
                ("playlistId", playlist_id),
                ("maxResults", max_results.as_str()),
                ("key", self.api_key.as_str()),
            ]);
        let raw = send_raw(request).await?;
        let response: PlaylistItemsResponse = decode_json(raw, classify_error)?;

        response
            .items
            .into_iter()
            .map(|item| {
                item.content_details
                    .and_then(|d| d.video_id)
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| FetchError::malformed("playlist item without videoId"))
            })
            .collect()
    }

    async fn get_videos(&self, ids: &[String]) -> Result<Vec<Video>, FetchError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let joined = ids.join(",");
        let request = self
            .client
            .get(format!("{}/videos", self.base_url))
            .query(&[
                ("part", "snippet,contentDetails,liveStreamingDetails"),
                ("id", joined.as_str()),
                ("key", self.api_key.as_str()),
            ]);
        let raw = send_raw(request).await?;
        let response: VideoListResponse = decode_json(raw, classify_error)?;
        Ok(response.items)
    }
}

#[async_trait]
impl SourceAdapter for Youtube {
    fn platform(&self) -> PlatformKind {
        PlatformKind::Youtube
    }

    async fn fetch_recent(
        &self,
        account: &str,
        window_size: usize,
    ) -> Result<Vec<FetchedItem>, FetchError> {
        let channel = self.resolve_channel(account).await?;
        let ids = self
            .list_upload_ids(&channel.uploads_playlist_id, window_size)
            .await?;
        let videos = self.get_videos(&ids).await?;
        items_from_videos(videos, &channel)
    }
}

/// Channel ids are 24 characters starting with `UC`.
fn is_channel_id(account: &str) -> bool {
    account.len() == 24 && account.starts_with("UC")
}

/// Map a Data API error body onto the fetch error taxonomy.
///
/// Quota exhaustion is reported as 403 but behaves like a rate limit: it
/// clears on its own and should not disable the source.
pub fn classify_error(status: StatusCode, retry_after: Option<Duration>, body: &str) -> FetchError {
    if let Ok(envelope) = serde_json::from_str::<ApiErrorResponse>(body) {
        let rate_limited = envelope.error.errors.iter().any(|e| {
            matches!(
                e.reason.as_str(),
                "quotaExceeded" | "rateLimitExceeded" | "userRateLimitExceeded"
            )
        });
        if rate_limited {
            return FetchError::RateLimited { retry_after };
        }
        if !envelope.error.message.is_empty() && !status.is_server_error() {
            return FetchError::from_status(status, retry_after, &envelope.error.message);
        }
    }
    FetchError::from_status(status, retry_after, body)
}

pub(crate) fn channel_info_from(
    response: ChannelListResponse,
    account: &str,
) -> Result<ChannelInfo, FetchError> {
    let channel = response
        .items
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::fatal(format!("YouTube channel not found: {account}")))?;

    let channel_id = channel
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| FetchError::malformed("channel without id"))?;
    let uploads_playlist_id = channel
        .content_details
        .and_then(|d| d.related_playlists.uploads)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| FetchError::fatal(format!("channel {channel_id} has no uploads playlist")))?;
    let (title, avatar) = match channel.snippet {
        Some(snippet) => (snippet.title, snippet.thumbnails.smallest()),
        None => (account.to_string(), None),
    };

    Ok(ChannelInfo {
        channel_id,
        uploads_playlist_id,
        title,
        avatar,
    })
}

/// Normalize `videos.list` results into newest-first items.
pub(crate) fn items_from_videos(
    videos: Vec<Video>,
    channel: &ChannelInfo,
) -> Result<Vec<FetchedItem>, FetchError> {
    let mut items = Vec::with_capacity(videos.len());

    for video in videos {
        let id = video
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| FetchError::malformed("video without id"))?;
        let Some(snippet) = video.snippet else {
            debug!(video_id = %id, "Skipping video without snippet");
            continue;
        };

        let broadcast = snippet.live_broadcast_content.as_deref().unwrap_or("none");
        let live_details = video.live_streaming_details.as_ref();
        let is_live = broadcast == "live"
            || live_details.is_some_and(|d| d.actual_start_time.is_some() && d.actual_end_time.is_none());
        let is_upcoming = broadcast == "upcoming";

        // A live broadcast is "published" when it starts, not when it was scheduled.
        let published_raw = if is_live {
            live_details
                .and_then(|d| d.actual_start_time.as_deref())
                .or(snippet.published_at.as_deref())
        } else {
            snippet.published_at.as_deref()
        };
        let Some(published_at) = published_raw.and_then(parse_timestamp) else {
            tracing::warn!(video_id = %id, "Skipping video without a valid publish time");
            continue;
        };

        let duration_secs = video
            .content_details
            .and_then(|d| d.duration)
            .and_then(|d| parse_iso8601_duration(&d))
            .filter(|secs| *secs > 0);

        let hints = CategoryHints {
            is_live,
            is_upcoming,
            duration_secs,
            media_type: Some("video".to_string()),
            ..Default::default()
        };

        let author = snippet
            .channel_title
            .clone()
            .unwrap_or_else(|| channel.title.clone());

        items.push(
            FetchedItem::builder(id.clone(), PlatformKind::Youtube, published_at)
                .title(snippet.title)
                .url(format!("https://www.youtube.com/watch?v={id}"))
                .maybe_thumbnail_url(snippet.thumbnails.best())
                .author(
                    Some(author),
                    Some(channel.channel_url()),
                    channel.avatar.clone(),
                )
                .hints(hints)
                .secondary_links(
                    extract_links(&snippet.description)
                        .into_iter()
                        .filter(|l| l.is_known_platform())
                        .collect(),
                )
                .build(),
        );
    }

    sort_newest_first(&mut items);
    Ok(items)
}
