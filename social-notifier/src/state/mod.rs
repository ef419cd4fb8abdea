//! Durable dedup state.
//!
//! Maps `platform:account:category` to the last item that was successfully
//! delivered for that key. The whole map is rewritten atomically after every
//! commit, so a crash leaves either the previous or the new state on disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::DedupKey;
use crate::utils::fs;
use crate::{Error, Result};

/// Last delivered item of one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupRecord {
    pub item_id: String,
    /// Publish time of `item_id`. Older files may lack it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    /// When the record was last committed.
    pub last_check: DateTime<Utc>,
}

/// Persisted `key -> record` map.
#[derive(Debug, Default)]
pub struct DedupState {
    records: BTreeMap<DedupKey, DedupRecord>,
    /// `None` keeps the state in memory only.
    path: Option<PathBuf>,
}

impl DedupState {
    /// State that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load state from `path`.
    ///
    /// A missing or empty file yields empty state. A file that exists but
    /// cannot be parsed is an error: starting empty would re-announce every
    /// tracked account.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = match fs::read_optional(&path).await? {
            None => {
                info!(path = %path.display(), "No state file found, starting fresh");
                BTreeMap::new()
            }
            Some(content) if content.trim().is_empty() => {
                warn!(path = %path.display(), "State file is empty, starting fresh");
                BTreeMap::new()
            }
            Some(content) => serde_json::from_str(&content).map_err(|e| {
                Error::state(format!(
                    "state file {} is corrupt ({e}); fix or remove it to continue",
                    path.display()
                ))
            })?,
        };

        debug!(path = %path.display(), records = records.len(), "Loaded dedup state");
        Ok(Self {
            records,
            path: Some(path),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, key: &DedupKey) -> Option<&DedupRecord> {
        self.records.get(key)
    }

    /// Whether `item_id` differs from the last delivered item of `key`.
    pub fn is_new(&self, key: &DedupKey, item_id: &str) -> bool {
        self.records
            .get(key)
            .is_none_or(|record| record.item_id != item_id)
    }

    /// Whether an item should be announced for `key`.
    ///
    /// Besides [`is_new`](Self::is_new), refuses items published no later than
    /// the committed one. This keeps an older item from being announced when
    /// the newest one is deleted upstream.
    pub fn should_notify(&self, key: &DedupKey, item_id: &str, published_at: DateTime<Utc>) -> bool {
        match self.records.get(key) {
            None => true,
            Some(record) if record.item_id == item_id => false,
            Some(record) => record.published_at.is_none_or(|last| published_at > last),
        }
    }

    /// Record a delivered item and persist the state.
    ///
    /// The in-memory record is updated even when the write fails, so the
    /// current run never repeats the notification; the error is returned for
    /// the caller to report.
    pub async fn commit(
        &mut self,
        key: &DedupKey,
        item_id: &str,
        published_at: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        self.records.insert(
            key.clone(),
            DedupRecord {
                item_id: item_id.to_string(),
                published_at: Some(published_at),
                last_check: timestamp,
            },
        );
        debug!(key = %key, item_id, "Committed dedup record");
        self.persist().await
    }

    /// Forget one key. Returns whether it existed.
    pub async fn reset(&mut self, key: &DedupKey) -> Result<bool> {
        let existed = self.records.remove(key).is_some();
        if existed {
            self.persist().await?;
        }
        Ok(existed)
    }

    /// Forget every key. Returns how many were removed.
    pub async fn reset_all(&mut self) -> Result<usize> {
        let count = self.records.len();
        self.records.clear();
        self.persist().await?;
        Ok(count)
    }

    pub fn records(&self) -> impl Iterator<Item = (&DedupKey, &DedupRecord)> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    async fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_vec_pretty(&self.records)?;
        fs::write_atomic(path, &json).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use platforms_feed::{ContentCategory, PlatformKind};

    fn key(category: ContentCategory) -> DedupKey {
        DedupKey::new(PlatformKind::Youtube, "@goose", category)
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_is_new_after_commit() {
        let mut state = DedupState::in_memory();
        let k = key(ContentCategory::Standard);

        assert!(state.is_new(&k, "v1"));
        state.commit(&k, "v1", at(10), Utc::now()).await.unwrap();
        assert!(!state.is_new(&k, "v1"));
        assert!(state.is_new(&k, "v2"));
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let mut state = DedupState::in_memory();
        state
            .commit(&key(ContentCategory::Live), "live1", at(10), Utc::now())
            .await
            .unwrap();
        assert!(state.is_new(&key(ContentCategory::Standard), "live1"));
    }

    #[tokio::test]
    async fn test_should_notify_refuses_regressions() {
        let mut state = DedupState::in_memory();
        let k = key(ContentCategory::Standard);
        state.commit(&k, "v3", at(12), Utc::now()).await.unwrap();

        assert!(!state.should_notify(&k, "v3", at(12)));
        assert!(!state.should_notify(&k, "v2", at(11)));
        assert!(state.should_notify(&k, "v4", at(13)));
    }

    #[tokio::test]
    async fn test_reload_after_commit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let k = key(ContentCategory::ShortForm);

        let mut state = DedupState::load(&path).await.unwrap();
        assert!(state.is_empty());
        state.commit(&k, "s1", at(9), at(10)).await.unwrap();
        drop(state);

        let restored = DedupState::load(&path).await.unwrap();
        assert!(!restored.is_new(&k, "s1"));
        let record = restored.get(&k).unwrap();
        assert_eq!(record.published_at, Some(at(9)));
        assert_eq!(record.last_check, at(10));

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["youtube:@goose:short_form"]["item_id"], "s1");
    }

    #[tokio::test]
    async fn test_corrupt_file_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = DedupState::load(&path).await.unwrap_err();
        assert!(matches!(err, Error::State(_)));
    }

    #[tokio::test]
    async fn test_legacy_record_without_publish_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(
            &path,
            r#"{"bluesky:goose.bsky.social:standard": {"item_id": "at://x", "last_check": "2025-03-01T00:00:00Z"}}"#,
        )
        .unwrap();

        let state = DedupState::load(&path).await.unwrap();
        let k = DedupKey::new(PlatformKind::Bluesky, "goose.bsky.social", ContentCategory::Standard);
        assert!(!state.is_new(&k, "at://x"));
        assert!(state.should_notify(&k, "at://y", at(1)));
    }

    #[tokio::test]
    async fn test_reset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut state = DedupState::load(&path).await.unwrap();
        let live = key(ContentCategory::Live);
        let standard = key(ContentCategory::Standard);
        state.commit(&live, "l1", at(1), at(1)).await.unwrap();
        state.commit(&standard, "v1", at(1), at(1)).await.unwrap();

        assert!(state.reset(&live).await.unwrap());
        assert!(!state.reset(&live).await.unwrap());
        assert_eq!(DedupState::load(&path).await.unwrap().len(), 1);

        assert_eq!(state.reset_all().await.unwrap(), 1);
        assert!(DedupState::load(&path).await.unwrap().is_empty());
    }
}
