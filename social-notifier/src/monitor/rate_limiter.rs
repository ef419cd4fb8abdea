//! Rate limiting for platform API calls.
//!
//! Implements a sliding-window limiter: at most `max_requests` permits may be
//! taken within any trailing `window`. Callers over budget are delayed, never
//! rejected.
//!
//! The scheduler takes one permit per account fetch. A fetch may issue several
//! HTTP calls (YouTube resolves the uploads playlist and then enriches videos),
//! so budgets are sized in fetches, not raw API calls.

use std::collections::VecDeque;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use rustc_hash::FxHashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::{Error, Result};

/// Configuration for a rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Maximum permits (account fetches) inside one window.
    pub max_requests: u32,
    /// Length of the trailing window.
    pub window: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: 30,
            window: Duration::from_secs(60),
        }
    }
}

impl RateLimiterConfig {
    pub fn new(max_requests: u32, window: Duration) -> Result<Self> {
        let config = Self {
            max_requests,
            window,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_requests == 0 {
            return Err(Error::config("rate limit max_requests must be at least 1"));
        }
        if self.window.is_zero() {
            return Err(Error::config("rate limit window must be non-zero"));
        }
        Ok(())
    }
}

/// Sliding-window rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    /// Issue times of requests still inside the window, oldest first.
    timestamps: VecDeque<Instant>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    /// Create a new rate limiter with the given configuration.
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            timestamps: VecDeque::with_capacity(config.max_requests as usize),
            max_requests: config.max_requests,
            window: config.window,
        }
    }

    /// Try to record a request now.
    ///
    /// Returns `true` if the request fits in the window, `false` if rate limited.
    pub fn try_acquire(&mut self) -> bool {
        let now = Instant::now();
        self.evict(now);

        if (self.timestamps.len() as u64) < u64::from(self.max_requests) {
            self.timestamps.push_back(now);
            true
        } else {
            false
        }
    }

    /// Number of requests currently counted against the window.
    pub fn in_window(&mut self) -> usize {
        self.evict(Instant::now());
        self.timestamps.len()
    }

    /// Get the time until one more request fits.
    pub fn time_until_available(&mut self) -> Duration {
        let now = Instant::now();
        self.evict(now);

        if (self.timestamps.len() as u64) < u64::from(self.max_requests) {
            return Duration::ZERO;
        }
        match self.timestamps.front() {
            Some(oldest) => (*oldest + self.window).saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }

    /// Drop timestamps that have left the window.
    fn evict(&mut self, now: Instant) {
        while let Some(oldest) = self.timestamps.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Manager for per-platform rate limiters.
///
/// All accounts of a platform share one budget, since quotas are enforced per
/// credential rather than per account.
#[derive(Debug, Clone)]
pub struct RateLimiterManager {
    /// Rate limiters by source key.
    limiters: Arc<Mutex<FxHashMap<String, RateLimiter>>>,
    /// Default configuration for new limiters.
    default_config: RateLimiterConfig,
    /// Platform-specific configurations.
    platform_configs: FxHashMap<String, RateLimiterConfig>,
}

impl RateLimiterManager {
    /// Create a new rate limiter manager with a default configuration.
    pub fn with_config(default_config: RateLimiterConfig) -> Self {
        Self {
            limiters: Arc::new(Mutex::new(FxHashMap::default())),
            default_config,
            platform_configs: FxHashMap::default(),
        }
    }

    /// Set a platform-specific configuration.
    pub fn set_platform_config(&mut self, key: &str, config: RateLimiterConfig) {
        self.platform_configs.insert(key.to_string(), config);
    }

    fn config_for(&self, key: &str) -> RateLimiterConfig {
        self.platform_configs
            .get(key)
            .copied()
            .unwrap_or(self.default_config)
    }

    /// Acquire permission for one request against `key`, waiting if necessary.
    ///
    /// Returns the duration waited. Fails immediately with
    /// [`Error::Configuration`] if the limiter for `key` allows zero requests.
    ///
    /// # Cancel Safety
    ///
    /// This method is cancel-safe. The lock is released before sleeping and a
    /// slot is only recorded when it is granted, so dropping the future leaves
    /// the window untouched.
    pub async fn acquire(&self, key: &str) -> Result<Duration> {
        let config = self.config_for(key);
        if config.max_requests == 0 {
            return Err(Error::config(format!(
                "rate limit for '{key}' allows zero requests"
            )));
        }

        let mut total_wait = Duration::ZERO;
        loop {
            // Check and record under the lock.
            let wait_duration = {
                let mut limiters = self.limiters.lock().await;
                let limiter = Self::get_or_create(&mut limiters, key, config);
                if limiter.try_acquire() {
                    if !total_wait.is_zero() {
                        debug!(key, waited = ?total_wait, "Rate limit slot granted after waiting");
                    }
                    return Ok(total_wait);
                }
                limiter.time_until_available()
            };

            trace!(key, wait = ?wait_duration, "rate limited");
            tokio::time::sleep(wait_duration).await;
            total_wait += wait_duration;
        }
    }

    /// Requests currently counted in `key`'s window.
    pub async fn in_window(&self, key: &str) -> usize {
        let config = self.config_for(key);
        let mut limiters = self.limiters.lock().await;
        Self::get_or_create(&mut limiters, key, config).in_window()
    }

    fn get_or_create<'a>(
        limiters: &'a mut FxHashMap<String, RateLimiter>,
        key: &str,
        config: RateLimiterConfig,
    ) -> &'a mut RateLimiter {
        match limiters.entry(key.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(RateLimiter::new(config)),
        }
    }
}

impl Default for RateLimiterManager {
    fn default() -> Self {
        Self::with_config(RateLimiterConfig::default())
    }
}
