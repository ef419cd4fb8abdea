//! Per-source health and the shared status view.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use platforms_feed::PlatformKind;
use serde::Serialize;

use crate::domain::TrackedSource;

/// Coarse health of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Last fetch succeeded.
    Healthy,
    /// Recent fetches failed, or too many failed and the source was disabled.
    Degraded,
    /// Disabled after a non-retryable error.
    Disabled,
    /// Not polled yet.
    Unknown,
}

/// Where the poll loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    #[default]
    Idle,
    Fetching,
    Classifying,
    Notifying,
}

/// Health of one tracked source.
#[derive(Debug, Clone, Serialize)]
pub struct SourceHealth {
    pub source_id: String,
    pub platform: PlatformKind,
    pub account: String,
    pub status: HealthStatus,
    pub enabled: bool,
    pub last_check: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub consecutive_errors: u32,
    pub consecutive_rate_limits: u32,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub notifications_sent: u64,
}

impl SourceHealth {
    pub fn new(source: &TrackedSource) -> Self {
        Self {
            source_id: source.source_id(),
            platform: source.platform,
            account: source.account.clone(),
            status: HealthStatus::Unknown,
            enabled: true,
            last_check: None,
            last_success: None,
            consecutive_errors: 0,
            consecutive_rate_limits: 0,
            cooldown_until: None,
            last_error: None,
            notifications_sent: 0,
        }
    }

    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }

    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.last_check = Some(now);
        self.last_success = Some(now);
        self.consecutive_errors = 0;
        self.consecutive_rate_limits = 0;
        self.cooldown_until = None;
        self.last_error = None;
        self.status = HealthStatus::Healthy;
    }

    /// Start a cooldown. Does not count toward the error ceiling.
    pub fn record_rate_limited(&mut self, now: DateTime<Utc>, cooldown: chrono::Duration, reason: String) {
        self.last_check = Some(now);
        self.consecutive_rate_limits += 1;
        self.cooldown_until = Some(
            now.checked_add_signed(cooldown).unwrap_or(DateTime::<Utc>::MAX_UTC),
        );
        self.last_error = Some(reason);
    }

    /// Count a transient failure. Returns `true` if the source got disabled.
    pub fn record_transient(&mut self, now: DateTime<Utc>, reason: String, max_errors: u32) -> bool {
        self.last_check = Some(now);
        self.consecutive_errors += 1;
        self.last_error = Some(reason);
        self.status = HealthStatus::Degraded;
        if self.consecutive_errors >= max_errors {
            self.enabled = false;
        }
        !self.enabled
    }

    pub fn disable(&mut self, now: DateTime<Utc>, reason: String) {
        self.last_check = Some(now);
        self.enabled = false;
        self.status = HealthStatus::Disabled;
        self.last_error = Some(reason);
    }
}

/// Point-in-time view of the scheduler.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSnapshot {
    pub phase: CyclePhase,
    pub cycles_completed: u64,
    pub last_cycle_started: Option<DateTime<Utc>>,
    pub last_cycle_finished: Option<DateTime<Utc>>,
    pub sources: Vec<SourceHealth>,
}

impl StatusSnapshot {
    pub fn source(&self, source_id: &str) -> Option<&SourceHealth> {
        self.sources.iter().find(|s| s.source_id == source_id)
    }

    /// Every enabled source is healthy or not polled yet.
    pub fn is_healthy(&self) -> bool {
        self.sources.iter().all(|s| {
            s.enabled && matches!(s.status, HealthStatus::Healthy | HealthStatus::Unknown)
        })
    }
}

/// Shared, read-mostly status. The scheduler is the only writer.
#[derive(Debug, Clone, Default)]
pub struct StatusHandle {
    inner: Arc<RwLock<StatusSnapshot>>,
}

impl StatusHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.inner.read().clone()
    }

    pub(crate) fn set_phase(&self, phase: CyclePhase) {
        self.inner.write().phase = phase;
    }

    pub(crate) fn cycle_started(&self, now: DateTime<Utc>) {
        self.inner.write().last_cycle_started = Some(now);
    }

    pub(crate) fn cycle_finished(&self, now: DateTime<Utc>) {
        let mut status = self.inner.write();
        status.phase = CyclePhase::Idle;
        status.cycles_completed += 1;
        status.last_cycle_finished = Some(now);
    }

    /// Insert or replace the health entry of one source.
    pub(crate) fn publish(&self, health: &SourceHealth) {
        let mut status = self.inner.write();
        match status
            .sources
            .iter_mut()
            .find(|s| s.source_id == health.source_id)
        {
            Some(existing) => *existing = health.clone(),
            None => status.sources.push(health.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn health() -> SourceHealth {
        SourceHealth::new(&TrackedSource::new(PlatformKind::Youtube, "@goose"))
    }

    #[test]
    fn test_transient_ceiling_disables() {
        let mut h = health();
        assert!(!h.record_transient(now(), "timeout".into(), 3));
        assert!(!h.record_transient(now(), "timeout".into(), 3));
        assert!(h.record_transient(now(), "timeout".into(), 3));
        assert!(!h.enabled);
        assert_eq!(h.status, HealthStatus::Degraded);
    }

    #[test]
    fn test_rate_limit_sets_cooldown_only() {
        let mut h = health();
        h.record_rate_limited(now(), chrono::Duration::seconds(60), "429".into());
        assert!(h.in_cooldown(now()));
        assert!(!h.in_cooldown(now() + chrono::Duration::seconds(60)));
        assert_eq!(h.consecutive_errors, 0);
        assert!(h.enabled);

        h.record_success(now());
        assert_eq!(h.consecutive_rate_limits, 0);
        assert!(h.cooldown_until.is_none());
        assert_eq!(h.status, HealthStatus::Healthy);
    }

    #[test]
    fn test_oversized_cooldown_saturates() {
        let mut h = health();
        h.record_rate_limited(now(), chrono::Duration::MAX, "429".into());
        assert_eq!(h.cooldown_until, Some(DateTime::<Utc>::MAX_UTC));
        assert!(h.in_cooldown(now()));
    }

    #[test]
    fn test_publish_replaces_entry() {
        let handle = StatusHandle::new();
        let mut h = health();
        handle.publish(&h);
        h.disable(now(), "unknown channel".into());
        handle.publish(&h);

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.sources.len(), 1);
        assert_eq!(
            snapshot.source("youtube:@goose").unwrap().status,
            HealthStatus::Disabled
        );
        assert!(!snapshot.is_healthy());
    }
}
