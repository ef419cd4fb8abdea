//! Application configuration.
//!
//! Settings come from a TOML file, then environment variables override
//! secrets and account lists so credentials never have to live in the file.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use platforms_feed::{AdapterOptions, PlatformKind};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{BackoffPolicy, TrackedSource};
use crate::monitor::classifier::{ClassificationRule, Classifier, DEFAULT_SHORT_MAX_SECS};
use crate::monitor::rate_limiter::{RateLimiterConfig, RateLimiterManager};
use crate::notification::ChannelConfig;
use crate::notification::channels::DiscordConfig;
use crate::{Error, Result};

/// Config file used when none is given.
pub const DEFAULT_CONFIG_PATH: &str = "config/notifier.toml";

/// Largest accepted `staleness_hours` (one year).
pub const MAX_STALENESS_HOURS: u64 = 24 * 365;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Seconds between poll cycles.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Items older than this are never announced.
    #[serde(default = "default_staleness_hours")]
    pub staleness_hours: u64,
    /// Recent items requested per account and cycle.
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Timeout for every outbound HTTP request, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Transient failures in a row before a source is disabled.
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    /// Maximum characters of item text copied into a notification.
    #[serde(default = "default_max_body_chars")]
    pub max_body_chars: usize,
    /// Default rate limit, shared per platform.
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    /// Cooldown after rate-limit responses.
    #[serde(default)]
    pub backoff: BackoffPolicy,
    /// Shorts length ceiling used by the YouTube rules.
    #[serde(default = "default_short_max_duration_secs")]
    pub short_max_duration_secs: u64,
    #[serde(default)]
    pub youtube: PlatformSettings,
    #[serde(default)]
    pub instagram: PlatformSettings,
    #[serde(default)]
    pub bluesky: PlatformSettings,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

fn default_poll_interval_secs() -> u64 {
    600
}

fn default_staleness_hours() -> u64 {
    24
}

fn default_window_size() -> usize {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_consecutive_errors() -> u32 {
    5
}

fn default_state_file() -> PathBuf {
    PathBuf::from("data/state.json")
}

fn default_max_body_chars() -> usize {
    crate::notification::DEFAULT_MAX_BODY_CHARS
}

fn default_short_max_duration_secs() -> u64 {
    DEFAULT_SHORT_MAX_SECS
}

fn default_true() -> bool {
    true
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            staleness_hours: default_staleness_hours(),
            window_size: default_window_size(),
            request_timeout_secs: default_request_timeout_secs(),
            max_consecutive_errors: default_max_consecutive_errors(),
            state_file: default_state_file(),
            max_body_chars: default_max_body_chars(),
            rate_limit: RateLimitSettings::default(),
            backoff: BackoffPolicy::default(),
            short_max_duration_secs: default_short_max_duration_secs(),
            youtube: PlatformSettings::default(),
            instagram: PlatformSettings::default(),
            bluesky: PlatformSettings::default(),
            channels: Vec::new(),
            api: ApiSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// `max_requests` account fetches per `window_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

fn default_max_requests() -> u32 {
    30
}

fn default_window_secs() -> u64 {
    60
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
        }
    }
}

impl RateLimitSettings {
    fn to_limiter_config(self) -> RateLimiterConfig {
        RateLimiterConfig {
            max_requests: self.max_requests,
            window: Duration::from_secs(self.window_secs),
        }
    }
}

/// A tracked account, either a bare handle or a table with a display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AccountConfig {
    Handle(String),
    Detailed {
        account: String,
        #[serde(default)]
        name: Option<String>,
    },
}

impl AccountConfig {
    pub fn account(&self) -> &str {
        match self {
            Self::Handle(account) | Self::Detailed { account, .. } => account.trim(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Handle(_) => None,
            Self::Detailed { name, .. } => name.as_deref(),
        }
    }
}

/// Per-platform section (`[youtube]`, `[instagram]`, `[bluesky]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
    /// API key, access token or session JWT, depending on the platform.
    #[serde(default, alias = "api_key", alias = "access_token", alias = "access_jwt")]
    pub credential: Option<String>,
    /// Override of the platform API base URL.
    pub base_url: Option<String>,
    /// Override of the default rate limit for this platform.
    pub rate_limit: Option<RateLimitSettings>,
    /// Replacement classification rules, highest precedence first.
    pub rules: Option<Vec<ClassificationRule>>,
    /// Instagram: also poll stories.
    #[serde(default)]
    pub include_stories: bool,
    /// Bluesky: announce reposts too.
    #[serde(default)]
    pub include_reposts: bool,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            accounts: Vec::new(),
            credential: None,
            base_url: None,
            rate_limit: None,
            rules: None,
            include_stories: false,
            include_reposts: false,
        }
    }
}

impl PlatformSettings {
    fn credential(&self) -> Option<&str> {
        self.credential
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    fn active_accounts(&self) -> impl Iterator<Item = &AccountConfig> {
        self.accounts
            .iter()
            .filter(move |a| self.enabled && !a.account().is_empty())
    }
}

/// Status API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: default_bind(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Directory for daily rolling log files. Console only when unset.
    pub dir: Option<PathBuf>,
    /// Emit JSON lines instead of human readable text.
    #[serde(default)]
    pub json: bool,
    /// Filter directive, overridden by `RUST_LOG`.
    pub filter: Option<String>,
}

/// Where a loaded configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    File(PathBuf),
    /// The default file was missing.
    Defaults(PathBuf),
}

impl ConfigOrigin {
    /// Report the load once logging is up.
    pub fn log(&self, config: &NotifierConfig) {
        match self {
            Self::File(path) => info!(
                path = %path.display(),
                sources = config.tracked_sources().len(),
                "Configuration loaded"
            ),
            Self::Defaults(path) => warn!(
                path = %path.display(),
                sources = config.tracked_sources().len(),
                "Config file not found, using defaults and environment"
            ),
        }
    }
}

impl NotifierConfig {
    /// Load configuration from `path` and apply environment overrides.
    ///
    /// A missing file is only accepted for the default path, so that a
    /// purely environment-driven deployment still works. Nothing is logged
    /// here since logging is configured from the result; see
    /// [`ConfigOrigin::log`].
    pub fn load(path: &Path) -> Result<(Self, ConfigOrigin)> {
        let (mut config, origin) = match std::fs::read_to_string(path) {
            Ok(content) => {
                let config = Self::from_toml(&content)
                    .map_err(|e| Error::config(format!("{}: {e}", path.display())))?;
                (config, ConfigOrigin::File(path.to_path_buf()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && path == Path::new(DEFAULT_CONFIG_PATH) => {
                (Self::default(), ConfigOrigin::Defaults(path.to_path_buf()))
            }
            Err(e) => return Err(Error::io_path("reading config", path, e)),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok((config, origin))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(e.to_string()))
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(key) = get("YOUTUBE_API_KEY") {
            self.youtube.credential = Some(key);
        }
        if let Some(token) = get("INSTAGRAM_ACCESS_TOKEN") {
            self.instagram.credential = Some(token);
        }
        if let Some(jwt) = get("BLUESKY_ACCESS_JWT") {
            self.bluesky.credential = Some(jwt);
        }

        for (var, settings) in [
            ("YOUTUBE_CHANNELS", &mut self.youtube),
            ("INSTAGRAM_ACCOUNTS", &mut self.instagram),
            ("BLUESKY_ACCOUNTS", &mut self.bluesky),
        ] {
            if let Some(list) = get(var) {
                settings.accounts = list
                    .split(',')
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(|a| AccountConfig::Handle(a.to_string()))
                    .collect();
            }
        }

        if let Some(url) = get("DISCORD_WEBHOOK_URL") {
            let has_discord = self
                .channels
                .iter()
                .any(|c| matches!(c, ChannelConfig::Discord(_)));
            let unset = self.channels.iter_mut().find_map(|c| match c {
                ChannelConfig::Discord(d) if d.webhook_url.trim().is_empty() => Some(d),
                _ => None,
            });
            match unset {
                Some(discord) => discord.webhook_url = url,
                None if !has_discord => {
                    self.channels.push(ChannelConfig::Discord(DiscordConfig {
                        enabled: true,
                        webhook_url: url,
                        ..Default::default()
                    }));
                }
                None => {}
            }
        }
    }

    /// Reject configurations the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            return Err(Error::config("poll_interval_secs must be greater than 0"));
        }
        if self.window_size == 0 {
            return Err(Error::config("window_size must be greater than 0"));
        }
        if self.staleness_hours == 0 {
            return Err(Error::config("staleness_hours must be greater than 0"));
        }
        if self.staleness_hours > MAX_STALENESS_HOURS {
            return Err(Error::config(format!(
                "staleness_hours must not exceed {MAX_STALENESS_HOURS}"
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::config("request_timeout_secs must be greater than 0"));
        }
        if self.max_consecutive_errors == 0 {
            return Err(Error::config("max_consecutive_errors must be at least 1"));
        }
        if self.backoff.max_delay_secs < self.backoff.base_delay_secs {
            return Err(Error::config(
                "backoff.max_delay_secs must not be below backoff.base_delay_secs",
            ));
        }

        self.rate_limit.to_limiter_config().validate()?;
        for platform in PlatformKind::ALL {
            let settings = self.platform(platform);
            if let Some(limit) = settings.rate_limit {
                limit.to_limiter_config().validate().map_err(|e| {
                    Error::config(format!("[{platform}] {e}"))
                })?;
            }
            let has_accounts = settings.active_accounts().next().is_some();
            if has_accounts && platform != PlatformKind::Bluesky && settings.credential().is_none() {
                return Err(Error::config(format!(
                    "{} accounts are configured but no credential is set",
                    platform.display_name()
                )));
            }
        }

        if self.tracked_sources().is_empty() {
            return Err(Error::config("no accounts are configured on any enabled platform"));
        }
        if !self.channels.iter().any(ChannelConfig::is_enabled) {
            return Err(Error::config("no notification channel is enabled"));
        }
        if self.api.enabled {
            self.api
                .bind
                .parse::<SocketAddr>()
                .map_err(|e| Error::config(format!("invalid api.bind '{}': {e}", self.api.bind)))?;
        }
        Ok(())
    }

    pub fn platform(&self, platform: PlatformKind) -> &PlatformSettings {
        match platform {
            PlatformKind::Youtube => &self.youtube,
            PlatformKind::Instagram => &self.instagram,
            PlatformKind::Bluesky => &self.bluesky,
        }
    }

    /// Every enabled account, deduplicated, in platform order.
    pub fn tracked_sources(&self) -> Vec<TrackedSource> {
        let mut sources: Vec<TrackedSource> = Vec::new();
        for platform in PlatformKind::ALL {
            for account in self.platform(platform).active_accounts() {
                let mut source = TrackedSource::new(platform, account.account());
                if let Some(name) = account.name() {
                    source = source.with_display_name(name);
                }
                if !sources.iter().any(|s| s.source_id() == source.source_id()) {
                    sources.push(source);
                }
            }
        }
        sources
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn staleness(&self) -> chrono::Duration {
        let hours = self.staleness_hours.min(MAX_STALENESS_HOURS) as i64;
        chrono::Duration::try_hours(hours).unwrap_or(chrono::Duration::MAX)
    }

    pub fn adapter_options(&self) -> AdapterOptions {
        AdapterOptions {
            youtube_api_key: self.youtube.credential().map(str::to_string),
            youtube_base_url: self.youtube.base_url.clone(),
            instagram_access_token: self.instagram.credential().map(str::to_string),
            instagram_base_url: self.instagram.base_url.clone(),
            include_stories: self.instagram.include_stories,
            bluesky_access_jwt: self.bluesky.credential().map(str::to_string),
            bluesky_service_url: self.bluesky.base_url.clone(),
            include_reposts: self.bluesky.include_reposts,
            request_timeout: Some(self.request_timeout()),
            cache_size: 0,
        }
    }

    pub fn rate_limiter(&self) -> RateLimiterManager {
        let mut manager = RateLimiterManager::with_config(self.rate_limit.to_limiter_config());
        for platform in PlatformKind::ALL {
            if let Some(limit) = self.platform(platform).rate_limit {
                manager.set_platform_config(platform.as_str(), limit.to_limiter_config());
            }
        }
        manager
    }

    pub fn classifier(&self) -> Classifier {
        let mut classifier = Classifier::new(self.staleness(), self.short_max_duration_secs);
        for platform in PlatformKind::ALL {
            if let Some(rules) = &self.platform(platform).rules {
                classifier = classifier.with_rules(platform, rules.clone());
            }
        }
        classifier
    }
}
