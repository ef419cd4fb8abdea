//! The poll loop.
//!
//! One task drives every cycle. Sources are polled one after another, each
//! cycle walks `Idle -> Fetching -> Classifying -> Notifying -> Idle`, and a
//! tick that fires while a cycle is still running is skipped.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use platforms_feed::{ContentCategory, FetchError, FetchedItem, SourceAdapter};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::health::{CyclePhase, SourceHealth, StatusHandle};
use crate::config::NotifierConfig;
use crate::domain::{BackoffPolicy, TrackedSource};
use crate::monitor::{Classifier, RateLimiterManager};
use crate::notification::{NotificationFormatter, Sink};
use crate::state::DedupState;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub poll_interval: Duration,
    /// Items requested per source and cycle.
    pub window_size: usize,
    /// Upper bound for one adapter fetch.
    pub request_timeout: Duration,
    /// Transient failures in a row before a source is disabled.
    pub max_consecutive_errors: u32,
    pub backoff: BackoffPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(600),
            window_size: 10,
            request_timeout: Duration::from_secs(30),
            max_consecutive_errors: 5,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl From<&NotifierConfig> for SchedulerConfig {
    fn from(config: &NotifierConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            window_size: config.window_size,
            request_timeout: config.request_timeout(),
            max_consecutive_errors: config.max_consecutive_errors,
            backoff: config.backoff.clone(),
        }
    }
}

/// Outcome of one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Sources whose fetch was attempted.
    pub polled: usize,
    /// Sources skipped because they are disabled or cooling down.
    pub skipped: usize,
    /// Fetches that failed.
    pub fetch_failures: usize,
    /// Notifications delivered and committed.
    pub notified: usize,
    /// Notifications that failed and will be retried next cycle.
    pub delivery_failures: usize,
    /// The cycle stopped early because of shutdown.
    pub cancelled: bool,
}

struct MonitoredSource {
    source: TrackedSource,
    /// `None` when the adapter could not be built; such sources start disabled.
    adapter: Option<Arc<dyn SourceAdapter>>,
    health: SourceHealth,
}

/// Polls every tracked source on a fixed interval and announces new items.
pub struct PollingScheduler {
    config: SchedulerConfig,
    sources: Vec<MonitoredSource>,
    rate_limiter: RateLimiterManager,
    classifier: Classifier,
    state: DedupState,
    formatter: NotificationFormatter,
    sink: Arc<dyn Sink>,
    status: StatusHandle,
    cancellation_token: CancellationToken,
}

impl PollingScheduler {
    pub fn new(
        config: SchedulerConfig,
        state: DedupState,
        sink: Arc<dyn Sink>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            config,
            sources: Vec::new(),
            rate_limiter: RateLimiterManager::default(),
            classifier: Classifier::default(),
            state,
            formatter: NotificationFormatter::default(),
            sink,
            status: StatusHandle::new(),
            cancellation_token,
        }
    }

    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiterManager) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_formatter(mut self, formatter: NotificationFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    /// Track `source` through `adapter`.
    pub fn add_source(&mut self, source: TrackedSource, adapter: Arc<dyn SourceAdapter>) {
        self.push_source(source, Some(adapter), None);
    }

    /// Track a source whose adapter is unavailable. It is reported as disabled.
    pub fn add_unavailable_source(&mut self, source: TrackedSource, reason: impl Into<String>) {
        self.push_source(source, None, Some(reason.into()));
    }

    fn push_source(
        &mut self,
        source: TrackedSource,
        adapter: Option<Arc<dyn SourceAdapter>>,
        disabled_reason: Option<String>,
    ) {
        let mut health = SourceHealth::new(&source);
        if let Some(reason) = disabled_reason {
            warn!(source = %source.source_id(), reason = %reason, "Source disabled at startup");
            health.disable(Utc::now(), reason);
        }
        self.status.publish(&health);
        self.sources.push(MonitoredSource {
            source,
            adapter,
            health,
        });
    }

    pub fn status(&self) -> StatusHandle {
        self.status.clone()
    }

    pub fn state(&self) -> &DedupState {
        &self.state
    }

    /// Run cycles until cancelled. The first cycle starts immediately.
    pub async fn run(mut self) -> DedupState {
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            sources = self.sources.len(),
            interval = ?self.config.poll_interval,
            "Polling scheduler started"
        );

        loop {
            let scheduled = tokio::select! {
                biased;
                _ = self.cancellation_token.cancelled() => break,
                scheduled = interval.tick() => scheduled,
            };

            let report = self.run_cycle(Utc::now()).await;
            if report.cancelled {
                break;
            }
            skip_missed_ticks(&mut interval, scheduled, self.config.poll_interval);
        }

        info!("Polling scheduler stopped");
        self.state
    }

    /// Run one full cycle as of `now`.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleReport {
        let mut report = CycleReport::default();
        self.status.cycle_started(now);
        debug!(sources = self.sources.len(), "Poll cycle started");

        for index in 0..self.sources.len() {
            if self.cancellation_token.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let entry = &self.sources[index];
            if !entry.health.enabled {
                trace!(source = %entry.health.source_id, "Skipping disabled source");
                report.skipped += 1;
                continue;
            }
            if entry.health.in_cooldown(now) {
                debug!(
                    source = %entry.health.source_id,
                    until = ?entry.health.cooldown_until,
                    "Skipping source in cooldown"
                );
                report.skipped += 1;
                continue;
            }
            let Some(adapter) = entry.adapter.clone() else {
                report.skipped += 1;
                continue;
            };
            let source = entry.source.clone();

            report.polled += 1;
            self.status.set_phase(CyclePhase::Fetching);
            let items = match self.fetch(&source, adapter.as_ref()).await {
                None => {
                    report.cancelled = true;
                    break;
                }
                Some(Ok(items)) => items,
                Some(Err(e)) => {
                    report.fetch_failures += 1;
                    self.record_failure(index, now, e);
                    continue;
                }
            };

            self.sources[index].health.record_success(now);
            let (notified, failed) = self.process_items(index, &source, items, now).await;
            report.notified += notified;
            report.delivery_failures += failed;
            self.status.publish(&self.sources[index].health);
        }

        self.status.cycle_finished(Utc::now());
        if report.notified > 0 || report.fetch_failures > 0 || report.delivery_failures > 0 {
            info!(
                polled = report.polled,
                notified = report.notified,
                fetch_failures = report.fetch_failures,
                delivery_failures = report.delivery_failures,
                "Poll cycle finished"
            );
        } else {
            debug!(polled = report.polled, skipped = report.skipped, "Poll cycle finished");
        }
        report
    }

    /// Rate-limited, time-bounded fetch. `None` means shutdown was requested.
    async fn fetch(
        &self,
        source: &TrackedSource,
        adapter: &dyn SourceAdapter,
    ) -> Option<Result<Vec<FetchedItem>, FetchError>> {
        let key = source.platform.as_str();
        let acquired = tokio::select! {
            biased;
            _ = self.cancellation_token.cancelled() => return None,
            acquired = self.rate_limiter.acquire(key) => acquired,
        };
        if let Err(e) = acquired {
            return Some(Err(FetchError::fatal(e.to_string())));
        }

        let fetch = tokio::time::timeout(
            self.config.request_timeout,
            adapter.fetch_recent(&source.account, self.config.window_size),
        );
        let result = tokio::select! {
            biased;
            _ = self.cancellation_token.cancelled() => return None,
            result = fetch => result,
        };

        Some(match result {
            Ok(items) => items,
            Err(_) => Err(FetchError::transient(format!(
                "fetch timed out after {:?}",
                self.config.request_timeout
            ))),
        })
    }

    fn record_failure(&mut self, index: usize, now: DateTime<Utc>, error: FetchError) {
        let max_errors = self.config.max_consecutive_errors;
        let backoff = &self.config.backoff;
        let health = &mut self.sources[index].health;

        match &error {
            FetchError::RateLimited { retry_after } => {
                let attempt = health.consecutive_rate_limits + 1;
                let cooldown = backoff.cooldown(attempt, *retry_after);
                let cooldown = chrono::Duration::from_std(cooldown)
                    .unwrap_or(chrono::Duration::MAX);
                warn!(
                    source = %health.source_id,
                    cooldown_secs = cooldown.num_seconds(),
                    attempt,
                    "Source rate limited, cooling down"
                );
                health.record_rate_limited(now, cooldown, error.to_string());
            }
            FetchError::Transient(msg) => {
                if health.record_transient(now, msg.clone(), max_errors) {
                    error!(
                        source = %health.source_id,
                        errors = health.consecutive_errors,
                        error = %msg,
                        "Source disabled after repeated failures"
                    );
                } else {
                    warn!(
                        source = %health.source_id,
                        errors = health.consecutive_errors,
                        error = %msg,
                        "Fetch failed"
                    );
                }
            }
            FetchError::Fatal(msg) => {
                error!(source = %health.source_id, error = %msg, "Source disabled");
                health.disable(now, msg.clone());
            }
        }

        self.status.publish(&self.sources[index].health);
    }

    /// Classify, dedup and deliver. Returns `(notified, failed)`.
    async fn process_items(
        &mut self,
        index: usize,
        source: &TrackedSource,
        items: Vec<FetchedItem>,
        now: DateTime<Utc>,
    ) -> (usize, usize) {
        self.status.set_phase(CyclePhase::Classifying);

        let mut newest: BTreeMap<ContentCategory, FetchedItem> = BTreeMap::new();
        for item in items {
            let Some(category) = self.classifier.classify(&item, now) else {
                trace!(item_id = %item.id, "Item excluded by classifier");
                continue;
            };
            match newest.get(&category) {
                Some(current) if current.published_at >= item.published_at => {}
                _ => {
                    newest.insert(category, item);
                }
            }
        }

        self.status.set_phase(CyclePhase::Notifying);
        let mut notified = 0;
        let mut failed = 0;

        for (category, item) in newest {
            let key = source.dedup_key(category);
            if !self.state.should_notify(&key, &item.id, item.published_at) {
                trace!(key = %key, item_id = %item.id, "Already notified");
                continue;
            }

            let payload = self.formatter.format(source, &item, category);
            match self.sink.deliver(&payload).await {
                Ok(()) => {
                    // Memory is updated even if the write fails, so the item is
                    // not announced twice by this process.
                    if let Err(e) = self.state.commit(&key, &item.id, item.published_at, now).await {
                        error!(key = %key, error = %e, "Failed to persist state");
                    }
                    info!(key = %key, item_id = %item.id, url = %item.url, "Notification sent");
                    self.sources[index].health.notifications_sent += 1;
                    notified += 1;
                }
                Err(e) => {
                    warn!(
                        key = %key,
                        item_id = %item.id,
                        error = %e,
                        "Notification failed, will retry next cycle"
                    );
                    failed += 1;
                }
            }
        }

        (notified, failed)
    }
}

/// Drop ticks that came due while a cycle was running.
///
/// `MissedTickBehavior::Skip` still yields one overdue tick right away; this
/// moves the next cycle to the first interval boundary after now.
fn skip_missed_ticks(interval: &mut Interval, scheduled: Instant, period: Duration) {
    let elapsed = scheduled.elapsed();
    if period.is_zero() || elapsed < period {
        return;
    }
    let periods = elapsed.as_nanos() / period.as_nanos() + 1;
    let next = u32::try_from(periods)
        .ok()
        .and_then(|n| period.checked_mul(n))
        .and_then(|offset| scheduled.checked_add(offset));
    match next {
        Some(next) => interval.reset_at(next),
        None => interval.reset(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::NotificationPayload;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use parking_lot::Mutex;
    use platforms_feed::PlatformKind;

    struct StaticAdapter(Vec<FetchedItem>);

    #[async_trait]
    impl SourceAdapter for StaticAdapter {
        fn platform(&self) -> PlatformKind {
            PlatformKind::Youtube
        }

        async fn fetch_recent(&self, _: &str, _: usize) -> Result<Vec<FetchedItem>, FetchError> {
            Ok(self.0.clone())
        }
    }

    struct SlowAdapter;

    #[async_trait]
    impl SourceAdapter for SlowAdapter {
        fn platform(&self) -> PlatformKind {
            PlatformKind::Youtube
        }

        async fn fetch_recent(&self, _: &str, _: usize) -> Result<Vec<FetchedItem>, FetchError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }
    }

    /// Sleeps through `delay` and records when each fetch started.
    struct TimedAdapter {
        delay: Duration,
        started: Mutex<Vec<tokio::time::Instant>>,
    }

    #[async_trait]
    impl SourceAdapter for TimedAdapter {
        fn platform(&self) -> PlatformKind {
            PlatformKind::Youtube
        }

        async fn fetch_recent(&self, _: &str, _: usize) -> Result<Vec<FetchedItem>, FetchError> {
            self.started.lock().push(tokio::time::Instant::now());
            tokio::time::sleep(self.delay).await;
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<String>>);

    #[async_trait]
    impl Sink for RecordingSink {
        fn channel_type(&self) -> &'static str {
            "recording"
        }

        fn is_enabled(&self) -> bool {
            true
        }

        async fn deliver(&self, payload: &NotificationPayload) -> crate::Result<()> {
            self.0.lock().push(payload.item_id.clone());
            Ok(())
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn video(id: &str, minutes_ago: i64) -> FetchedItem {
        FetchedItem::builder(id, PlatformKind::Youtube, now() - chrono::Duration::minutes(minutes_ago))
            .title(id)
            .url(format!("https://www.youtube.com/watch?v={id}"))
            .build()
    }

    #[tokio::test]
    async fn test_only_newest_item_per_category() {
        let sink = Arc::new(RecordingSink::default());
        let mut scheduler = PollingScheduler::new(
            SchedulerConfig::default(),
            DedupState::in_memory(),
            sink.clone(),
            CancellationToken::new(),
        );
        // Out of order on purpose.
        scheduler.add_source(
            TrackedSource::new(PlatformKind::Youtube, "@goose"),
            Arc::new(StaticAdapter(vec![video("v1", 30), video("v3", 5), video("v2", 10)])),
        );

        let report = scheduler.run_cycle(now()).await;
        assert_eq!(report.notified, 1);
        assert_eq!(*sink.0.lock(), ["v3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_timeout_is_transient() {
        let config = SchedulerConfig {
            request_timeout: Duration::from_secs(5),
            ..Default::default()
        };
        let mut scheduler = PollingScheduler::new(
            config,
            DedupState::in_memory(),
            Arc::new(RecordingSink::default()),
            CancellationToken::new(),
        );
        scheduler.add_source(
            TrackedSource::new(PlatformKind::Youtube, "@goose"),
            Arc::new(SlowAdapter),
        );

        let report = scheduler.run_cycle(now()).await;
        assert_eq!(report.fetch_failures, 1);
        let snapshot = scheduler.status().snapshot();
        let health = snapshot.source("youtube:@goose").unwrap();
        assert_eq!(health.consecutive_errors, 1);
        assert!(health.last_error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_cancelled_before_cycle() {
        let token = CancellationToken::new();
        let mut scheduler = PollingScheduler::new(
            SchedulerConfig::default(),
            DedupState::in_memory(),
            Arc::new(RecordingSink::default()),
            token.clone(),
        );
        scheduler.add_source(
            TrackedSource::new(PlatformKind::Youtube, "@goose"),
            Arc::new(StaticAdapter(vec![video("v1", 1)])),
        );
        token.cancel();

        let report = scheduler.run_cycle(now()).await;
        assert!(report.cancelled);
        assert_eq!(report.polled, 0);
    }

    #[tokio::test]
    async fn test_unavailable_source_is_reported_disabled() {
        let mut scheduler = PollingScheduler::new(
            SchedulerConfig::default(),
            DedupState::in_memory(),
            Arc::new(RecordingSink::default()),
            CancellationToken::new(),
        );
        scheduler.add_unavailable_source(
            TrackedSource::new(PlatformKind::Instagram, "17841400000000000"),
            "missing access token",
        );

        let report = scheduler.run_cycle(now()).await;
        assert_eq!(report.skipped, 1);
        let snapshot = scheduler.status().snapshot();
        assert!(!snapshot.sources[0].enabled);
        assert_eq!(snapshot.cycles_completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_during_a_long_cycle_are_skipped() {
        let origin = tokio::time::Instant::now();
        let adapter = Arc::new(TimedAdapter {
            delay: Duration::from_secs(25),
            started: Mutex::new(Vec::new()),
        });
        let token = CancellationToken::new();
        let mut scheduler = PollingScheduler::new(
            SchedulerConfig {
                poll_interval: Duration::from_secs(10),
                request_timeout: Duration::from_secs(60),
                ..Default::default()
            },
            DedupState::in_memory(),
            Arc::new(RecordingSink::default()),
            token.clone(),
        );
        scheduler.add_source(TrackedSource::new(PlatformKind::Youtube, "@goose"), adapter.clone());

        let handle = tokio::spawn(scheduler.run());
        tokio::time::sleep(Duration::from_secs(31)).await;
        token.cancel();
        handle.await.unwrap();

        let offsets: Vec<u64> = adapter
            .started
            .lock()
            .iter()
            .map(|t| t.duration_since(origin).as_secs())
            .collect();
        assert_eq!(offsets, [0, 30]);
    }
}
