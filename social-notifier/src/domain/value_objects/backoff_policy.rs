//! Cooldown policy for rate-limited sources.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential cooldown applied after consecutive rate limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Cooldown after the first rate limit, in seconds.
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,
    /// Upper bound for any cooldown, in seconds.
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    /// Whether to add jitter to delays.
    #[serde(default = "default_true")]
    pub use_jitter: bool,
}

fn default_base_delay_secs() -> u64 {
    60
}

fn default_max_delay_secs() -> u64 {
    3600
}

fn default_true() -> bool {
    true
}

impl BackoffPolicy {
    /// Policy without jitter, for deterministic schedules.
    pub fn fixed(base_delay_secs: u64, max_delay_secs: u64) -> Self {
        Self {
            base_delay_secs,
            max_delay_secs,
            use_jitter: false,
        }
    }

    /// Cooldown after the `n`-th consecutive rate limit (1-indexed):
    /// `base * 2^(n-1)`, capped at `max_delay_secs`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay_secs = self
            .base_delay_secs
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_secs);

        if self.use_jitter && delay_secs > 0 {
            // Add up to 10% jitter, never past the cap.
            let jitter = delay_secs as f64 * 0.1 * rand::random::<f64>();
            let jittered = Duration::from_secs_f64(delay_secs as f64 + jitter);
            jittered.min(Duration::from_secs(self.max_delay_secs))
        } else {
            Duration::from_secs(delay_secs)
        }
    }

    /// Cooldown honouring a server-provided `Retry-After`.
    ///
    /// The hint raises the delay but never past `max_delay_secs`.
    pub fn cooldown(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        let delay = match retry_after {
            Some(hint) => delay.max(hint),
            None => delay,
        };
        delay.min(Duration::from_secs(self.max_delay_secs))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_secs: default_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
            use_jitter: default_true(),
        }
    }
}
