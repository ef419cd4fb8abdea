use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use super::SourceAdapter;
use super::client::default_client;
use super::error::FetchError;
use super::platforms::{Bluesky, Instagram, Youtube};
use crate::cache::DEFAULT_MAXSIZE;
use crate::media::PlatformKind;

/// Credentials and endpoint overrides used to build adapters.
#[derive(Debug, Clone, Default)]
pub struct AdapterOptions {
    pub youtube_api_key: Option<String>,
    pub youtube_base_url: Option<String>,
    pub instagram_access_token: Option<String>,
    pub instagram_base_url: Option<String>,
    pub include_stories: bool,
    pub bluesky_access_jwt: Option<String>,
    pub bluesky_service_url: Option<String>,
    pub include_reposts: bool,
    /// Per-request HTTP timeout. `None` uses the client default.
    pub request_timeout: Option<Duration>,
    /// Capacity of per-adapter lookup caches.
    pub cache_size: usize,
}

impl AdapterOptions {
    fn cache_size(&self) -> usize {
        if self.cache_size == 0 {
            DEFAULT_MAXSIZE
        } else {
            self.cache_size
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Builds one adapter per platform, sharing a single HTTP client.
pub struct AdapterFactory {
    client: Client,
    options: AdapterOptions,
}

impl AdapterFactory {
    pub fn new(options: AdapterOptions) -> Self {
        let client = default_client(options.request_timeout);
        Self { client, options }
    }

    pub fn with_client(client: Client, options: AdapterOptions) -> Self {
        Self { client, options }
    }

    /// Create the adapter for `platform`.
    ///
    /// Fails with [`FetchError::Fatal`] when a required credential is missing,
    /// since no amount of retrying will fix that.
    pub fn create(&self, platform: PlatformKind) -> Result<Arc<dyn SourceAdapter>, FetchError> {
        let opts = &self.options;
        let adapter: Arc<dyn SourceAdapter> = match platform {
            PlatformKind::Youtube => {
                let key = non_empty(&opts.youtube_api_key)
                    .ok_or_else(|| FetchError::fatal("YouTube API key is not configured"))?;
                let mut yt = Youtube::new(self.client.clone(), key, opts.cache_size());
                if let Some(base) = non_empty(&opts.youtube_base_url) {
                    yt = yt.with_base_url(base);
                }
                Arc::new(yt)
            }
            PlatformKind::Instagram => {
                let token = non_empty(&opts.instagram_access_token).ok_or_else(|| {
                    FetchError::fatal("Instagram access token is not configured")
                })?;
                let mut ig = Instagram::new(self.client.clone(), token)
                    .with_stories(opts.include_stories);
                if let Some(base) = non_empty(&opts.instagram_base_url) {
                    ig = ig.with_base_url(base);
                }
                Arc::new(ig)
            }
            PlatformKind::Bluesky => {
                let mut bsky = Bluesky::new(self.client.clone())
                    .with_access_jwt(non_empty(&opts.bluesky_access_jwt).map(str::to_string))
                    .with_reposts(opts.include_reposts);
                if let Some(base) = non_empty(&opts.bluesky_service_url) {
                    bsky = bsky.with_service_url(base);
                }
                Arc::new(bsky)
            }
        };
        Ok(adapter)
    }
}
