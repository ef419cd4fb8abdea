use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use super::models::{AuthorFeedResponse, EmbedView, FeedViewPost, XrpcError};
use crate::adapter::SourceAdapter;
use crate::adapter::client::{decode_json, send_raw};
use crate::adapter::error::FetchError;
use crate::adapter::utils::{clamp_window, parse_timestamp};
use crate::media::links::{SecondaryLink, push_unique};
use crate::media::{CategoryHints, FetchedItem, PlatformKind, item::sort_newest_first};

const MAX_LIMIT: usize = 100;

/// Bluesky AppView adapter, reading `app.bsky.feed.getAuthorFeed`.
pub struct Bluesky {
    client: Client,
    service_url: String,
    access_jwt: Option<String>,
    include_reposts: bool,
}

impl Bluesky {
    /// Public, unauthenticated AppView.
    pub const SERVICE_URL: &str = "https://public.api.bsky.app";

    pub fn new(client: Client) -> Self {
        Self {
            client,
            service_url: Self::SERVICE_URL.to_string(),
            access_jwt: None,
            include_reposts: false,
        }
    }

    pub fn with_service_url(mut self, service_url: impl Into<String>) -> Self {
        self.service_url = service_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_access_jwt(mut self, jwt: Option<String>) -> Self {
        self.access_jwt = jwt.filter(|t| !t.is_empty());
        self
    }

    /// Keep reposts of other accounts' posts in the feed.
    pub fn with_reposts(mut self, include_reposts: bool) -> Self {
        self.include_reposts = include_reposts;
        self
    }
}

#[async_trait]
impl SourceAdapter for Bluesky {
    fn platform(&self) -> PlatformKind {
        PlatformKind::Bluesky
    }

    async fn fetch_recent(
        &self,
        account: &str,
        window_size: usize,
    ) -> Result<Vec<FetchedItem>, FetchError> {
        let limit = clamp_window(window_size, MAX_LIMIT).to_string();
        let actor = account.trim().trim_start_matches('@');
        let mut request = self
            .client
            .get(format!(
                "{}/xrpc/app.bsky.feed.getAuthorFeed",
                self.service_url
            ))
            .query(&[
                ("actor", actor),
                ("limit", limit.as_str()),
                ("filter", "posts_no_replies"),
            ]);
        if let Some(jwt) = &self.access_jwt {
            request = request.bearer_auth(jwt);
        }

        let raw = send_raw(request).await?;
        let response: AuthorFeedResponse = decode_json(raw, classify_error)?;
        items_from_feed(response.feed, self.include_reposts)
    }
}

/// Map an XRPC error body onto the fetch error taxonomy.
pub fn classify_error(status: StatusCode, retry_after: Option<Duration>, body: &str) -> FetchError {
    if let Ok(err) = serde_json::from_str::<XrpcError>(body) {
        if err.error == "RateLimitExceeded" {
            return FetchError::RateLimited { retry_after };
        }
        if !err.message.is_empty() && status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
            return FetchError::fatal(format!("{}: {}", err.error, err.message));
        }
    }
    FetchError::from_status(status, retry_after, body)
}

/// `at://did/app.bsky.feed.post/<rkey>` -> `<rkey>`
fn record_key(uri: &str) -> Option<&str> {
    uri.rsplit('/').next().filter(|k| !k.is_empty() && !k.contains(':'))
}

fn embed_thumbnail(embed: &EmbedView) -> Option<String> {
    if let Some(external) = &embed.external
        && let Some(thumb) = &external.thumb
    {
        return Some(thumb.clone());
    }
    if let Some(image) = embed.images.first() {
        return image.thumb.clone().or_else(|| image.fullsize.clone());
    }
    if let Some(thumb) = &embed.thumbnail {
        return Some(thumb.clone());
    }
    embed.media.as_deref().and_then(embed_thumbnail)
}

fn embed_external(embed: &EmbedView) -> Option<&super::models::ExternalView> {
    embed
        .external
        .as_ref()
        .or_else(|| embed.media.as_deref().and_then(|m| m.external.as_ref()))
}

pub(crate) fn items_from_feed(
    feed: Vec<FeedViewPost>,
    include_reposts: bool,
) -> Result<Vec<FetchedItem>, FetchError> {
    let mut items = Vec::with_capacity(feed.len());

    for entry in feed {
        let is_repost = entry
            .reason
            .as_ref()
            .is_some_and(|r| r.kind.ends_with("#reasonRepost"));
        if is_repost && !include_reposts {
            continue;
        }

        let post = entry.post;
        let uri = post
            .uri
            .filter(|u| !u.is_empty())
            .ok_or_else(|| FetchError::malformed("post without uri"))?;
        let published = post
            .record
            .created_at
            .as_deref()
            .and_then(parse_timestamp)
            .or_else(|| post.indexed_at.as_deref().and_then(parse_timestamp));
        let Some(published_at) = published else {
            warn!(uri = %uri, "Skipping Bluesky post without a valid timestamp");
            continue;
        };

        let handle = post.author.handle;
        let url = match record_key(&uri) {
            Some(rkey) if !handle.is_empty() => {
                format!("https://bsky.app/profile/{handle}/post/{rkey}")
            }
            _ => uri.clone(),
        };

        let external = post.embed.as_ref().and_then(embed_external);
        let mut links = Vec::new();
        if let Some(external) = external {
            push_unique(&mut links, SecondaryLink::from_url(&external.uri));
        }
        for feature in post.record.facets.iter().flat_map(|f| &f.features) {
            if feature.kind.ends_with("#link")
                && let Some(link) = &feature.uri
            {
                push_unique(&mut links, SecondaryLink::from_url(link));
            }
        }

        let text = post.record.text.trim();
        let title = if text.is_empty() {
            external.map(|e| e.title.clone()).unwrap_or_default()
        } else {
            text.to_string()
        };

        let hints = CategoryHints {
            has_external_embed: external.is_some(),
            is_repost,
            media_type: post.embed.as_ref().map(|e| e.kind.clone()),
            ..Default::default()
        };

        debug!(uri = %uri, external = hints.has_external_embed, is_repost, "Parsed Bluesky post");

        let profile_url = (!handle.is_empty()).then(|| format!("https://bsky.app/profile/{handle}"));
        let thumbnail = post.embed.as_ref().and_then(embed_thumbnail);
        let author_name = post
            .author
            .display_name
            .filter(|n| !n.trim().is_empty())
            .or_else(|| Some(handle.clone()));

        items.push(
            FetchedItem::builder(uri, PlatformKind::Bluesky, published_at)
                .title(title)
                .url(url)
                .maybe_thumbnail_url(thumbnail)
                .author(author_name, profile_url, post.author.avatar)
                .hints(hints)
                .secondary_links(links)
                .build(),
        );
    }

    sort_newest_first(&mut items);
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED_JSON: &str = include_str!("../../../../tests/fixtures/bluesky_feed.json");

    fn feed() -> Vec<FeedViewPost> {
        serde_json::from_str::<AuthorFeedResponse>(FEED_JSON).unwrap().feed
    }

    #[test]
    fn test_items_from_feed() {
        let items = items_from_feed(feed(), false).unwrap();
        assert_eq!(items.len(), 2);

        let newest = &items[0];
        assert_eq!(newest.id, "at://did:plc:goose/app.bsky.feed.post/3lbnewest");
        assert_eq!(newest.url, "https://bsky.app/profile/goose.bsky.social/post/3lbnewest");
        assert!(newest.hints.has_external_embed);
        assert_eq!(newest.author_name.as_deref(), Some("Goose"));
        assert_eq!(newest.author_avatar.as_deref(), Some("https://cdn.bsky.example/avatar.jpg"));
        assert_eq!(newest.thumbnail_url.as_deref(), Some("https://cdn.bsky.example/thumb.jpg"));

        let labels: Vec<_> = newest.secondary_links.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(labels, ["YouTube Link", "Spotify Link"]);

        let plain = &items[1];
        assert!(!plain.hints.has_external_embed);
        assert_eq!(plain.title, "Soundcheck done, doors at 7");
        // createdAt is missing on this record, indexedAt is used instead.
        assert_eq!(plain.published_at.to_rfc3339(), "2025-03-01T17:00:05+00:00");
    }

    #[test]
    fn test_reposts_are_opt_in() {
        let items = items_from_feed(feed(), true).unwrap();
        assert_eq!(items.len(), 3);
        assert!(items.iter().any(|i| i.hints.is_repost));
    }

    #[test]
    fn test_post_without_uri_is_malformed() {
        let feed: Vec<FeedViewPost> = serde_json::from_str(
            r#"[{"post": {"author": {"handle": "a.bsky.social"}, "indexedAt": "2025-03-01T00:00:00Z"}}]"#,
        )
        .unwrap();
        assert!(matches!(items_from_feed(feed, false), Err(FetchError::Transient(_))));
    }

    #[test]
    fn test_record_key() {
        assert_eq!(
            record_key("at://did:plc:goose/app.bsky.feed.post/3lbnewest"),
            Some("3lbnewest")
        );
        assert_eq!(record_key("at://did:plc:goose"), None);
    }

    #[test]
    fn test_classify_xrpc_errors() {
        let body = r#"{"error": "InvalidRequest", "message": "Profile not found"}"#;
        assert!(classify_error(StatusCode::BAD_REQUEST, None, body).is_fatal());

        let body = r#"{"error": "RateLimitExceeded", "message": "Rate Limit Exceeded"}"#;
        assert_eq!(
            classify_error(StatusCode::TOO_MANY_REQUESTS, Some(Duration::from_secs(30)), body),
            FetchError::RateLimited { retry_after: Some(Duration::from_secs(30)) }
        );

        assert!(matches!(
            classify_error(StatusCode::SERVICE_UNAVAILABLE, None, ""),
            FetchError::Transient(_)
        ));
    }
}
