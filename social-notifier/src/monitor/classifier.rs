//! Content classification.
//!
//! Every platform has an ordered list of `(Signal, ContentCategory)` rules.
//! The first rule whose signal matches an item decides its category; if none
//! match the item is `standard`. Rules are plain data and can be replaced per
//! platform from the config file.

use chrono::{DateTime, Utc};
use platforms_feed::{ContentCategory, FetchedItem, PlatformKind};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Default YouTube Shorts length ceiling.
pub const DEFAULT_SHORT_MAX_SECS: u64 = 60;

/// Default staleness window.
pub const DEFAULT_STALENESS: chrono::Duration = chrono::Duration::hours(24);

/// An observable property of a fetched item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Signal {
    /// Broadcast currently live.
    Live,
    /// Ephemeral story.
    Story,
    /// Platform-provided short-form flag (Reels, Shorts).
    ShortFlag,
    /// Title starts with the given prefix, case-insensitive.
    TitlePrefix(String),
    /// Title contains the given hashtag as a whole word, case-insensitive.
    Hashtag(String),
    /// Media is at most this many seconds long.
    MaxDurationSecs(u64),
    /// Post is mainly a link card to another site.
    ExternalEmbed,
    /// Raw platform media type equals the value, case-insensitive.
    MediaType(String),
}

impl Signal {
    pub fn matches(&self, item: &FetchedItem) -> bool {
        let hints = &item.hints;
        match self {
            Signal::Live => hints.is_live,
            Signal::Story => hints.is_story,
            Signal::ShortFlag => hints.is_short,
            Signal::TitlePrefix(prefix) => {
                let title = item.title.trim_start();
                title
                    .get(..prefix.len())
                    .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
            }
            Signal::Hashtag(tag) => item
                .title
                .split(|c: char| c.is_whitespace() || matches!(c, ',' | '.' | '!' | '?'))
                .any(|word| word.eq_ignore_ascii_case(tag)),
            Signal::MaxDurationSecs(max) => hints.duration_secs.is_some_and(|d| d <= *max),
            Signal::ExternalEmbed => hints.has_external_embed,
            Signal::MediaType(expected) => hints
                .media_type
                .as_deref()
                .is_some_and(|t| t.eq_ignore_ascii_case(expected)),
        }
    }
}

/// A single precedence rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRule {
    pub signal: Signal,
    pub category: ContentCategory,
}

impl ClassificationRule {
    pub fn new(signal: Signal, category: ContentCategory) -> Self {
        Self { signal, category }
    }
}

/// Built-in rules for a platform, highest precedence first.
pub fn default_rules(platform: PlatformKind, short_max_secs: u64) -> Vec<ClassificationRule> {
    use ContentCategory::*;

    let mut rules = vec![
        ClassificationRule::new(Signal::Live, Live),
        ClassificationRule::new(Signal::Story, Story),
        ClassificationRule::new(Signal::ShortFlag, ShortForm),
    ];
    match platform {
        PlatformKind::Youtube => {
            rules.push(ClassificationRule::new(
                Signal::TitlePrefix("#shorts".into()),
                ShortForm,
            ));
            rules.push(ClassificationRule::new(
                Signal::Hashtag("#shorts".into()),
                ShortForm,
            ));
            if short_max_secs > 0 {
                rules.push(ClassificationRule::new(
                    Signal::MaxDurationSecs(short_max_secs),
                    ShortForm,
                ));
            }
        }
        PlatformKind::Instagram => {}
        PlatformKind::Bluesky => {
            rules.push(ClassificationRule::new(Signal::ExternalEmbed, ExternalPost));
        }
    }
    rules
}

/// Assigns each item at most one [`ContentCategory`].
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: FxHashMap<PlatformKind, Vec<ClassificationRule>>,
    staleness: chrono::Duration,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(DEFAULT_STALENESS, DEFAULT_SHORT_MAX_SECS)
    }
}

impl Classifier {
    pub fn new(staleness: chrono::Duration, short_max_secs: u64) -> Self {
        let rules = PlatformKind::ALL
            .into_iter()
            .map(|p| (p, default_rules(p, short_max_secs)))
            .collect();
        Self { rules, staleness }
    }

    /// Replace the rules of one platform.
    pub fn with_rules(mut self, platform: PlatformKind, rules: Vec<ClassificationRule>) -> Self {
        self.rules.insert(platform, rules);
        self
    }

    pub fn rules(&self, platform: PlatformKind) -> &[ClassificationRule] {
        self.rules.get(&platform).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn staleness(&self) -> chrono::Duration {
        self.staleness
    }

    /// Classify `item` as of `now`.
    ///
    /// Returns `None` for items that must never be announced: anything
    /// published before `now - staleness` and broadcasts that have not started.
    pub fn classify(&self, item: &FetchedItem, now: DateTime<Utc>) -> Option<ContentCategory> {
        if let Some(cutoff) = now.checked_sub_signed(self.staleness)
            && item.is_older_than(cutoff)
        {
            return None;
        }
        if item.hints.is_upcoming && !item.hints.is_live {
            return None;
        }

        let category = self
            .rules(item.platform)
            .iter()
            .find(|rule| rule.signal.matches(item))
            .map(|rule| rule.category)
            .unwrap_or(ContentCategory::Standard);
        Some(category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platforms_feed::CategoryHints;

    fn item(platform: PlatformKind, title: &str, hints: CategoryHints) -> FetchedItem {
        FetchedItem::builder("id", platform, Utc::now())
            .title(title)
            .hints(hints)
            .build()
    }

    #[test]
    fn test_live_beats_short_form() {
        let classifier = Classifier::default();
        let hints = CategoryHints {
            is_live: true,
            is_short: true,
            duration_secs: Some(30),
            ..Default::default()
        };
        let live_short = item(PlatformKind::Youtube, "#shorts live", hints);
        assert_eq!(
            classifier.classify(&live_short, Utc::now()),
            Some(ContentCategory::Live)
        );
    }

    #[test]
    fn test_youtube_short_form_signals() {
        let classifier = Classifier::default();
        let now = Utc::now();

        let by_prefix = item(PlatformKind::Youtube, "#Shorts soundcheck", Default::default());
        let by_tag = item(PlatformKind::Youtube, "soundcheck #shorts", Default::default());
        let by_duration = item(
            PlatformKind::Youtube,
            "soundcheck",
            CategoryHints {
                duration_secs: Some(45),
                ..Default::default()
            },
        );
        let long = item(
            PlatformKind::Youtube,
            "soundcheck",
            CategoryHints {
                duration_secs: Some(600),
                ..Default::default()
            },
        );

        for short in [&by_prefix, &by_tag, &by_duration] {
            assert_eq!(classifier.classify(short, now), Some(ContentCategory::ShortForm));
        }
        assert_eq!(classifier.classify(&long, now), Some(ContentCategory::Standard));
    }

    #[test]
    fn test_hashtag_is_whole_word() {
        let classifier = Classifier::default();
        let not_a_tag = item(PlatformKind::Youtube, "my #shortsfilm premiere", Default::default());
        assert_eq!(
            classifier.classify(&not_a_tag, Utc::now()),
            Some(ContentCategory::Standard)
        );
    }

    #[test]
    fn test_story_and_reels() {
        let classifier = Classifier::default();
        let now = Utc::now();
        let story = item(
            PlatformKind::Instagram,
            "",
            CategoryHints {
                is_story: true,
                is_short: true,
                ..Default::default()
            },
        );
        let reel = item(
            PlatformKind::Instagram,
            "rehearsal",
            CategoryHints {
                is_short: true,
                ..Default::default()
            },
        );
        assert_eq!(classifier.classify(&story, now), Some(ContentCategory::Story));
        assert_eq!(classifier.classify(&reel, now), Some(ContentCategory::ShortForm));
    }

    #[test]
    fn test_bluesky_external_post() {
        let classifier = Classifier::default();
        let now = Utc::now();
        let card = item(
            PlatformKind::Bluesky,
            "new video",
            CategoryHints {
                has_external_embed: true,
                ..Default::default()
            },
        );
        let plain = item(PlatformKind::Bluesky, "hello", Default::default());
        assert_eq!(classifier.classify(&card, now), Some(ContentCategory::ExternalPost));
        assert_eq!(classifier.classify(&plain, now), Some(ContentCategory::Standard));

        // External embeds are not a YouTube signal.
        let yt = item(
            PlatformKind::Youtube,
            "video",
            CategoryHints {
                has_external_embed: true,
                ..Default::default()
            },
        );
        assert_eq!(classifier.classify(&yt, now), Some(ContentCategory::Standard));
    }

    #[test]
    fn test_stale_items_are_excluded() {
        let classifier = Classifier::default();
        let now = Utc::now();
        let mut old = item(PlatformKind::Bluesky, "old", Default::default());
        old.published_at = now - chrono::Duration::hours(25);
        assert_eq!(classifier.classify(&old, now), None);

        old.published_at = now - chrono::Duration::hours(23);
        assert_eq!(classifier.classify(&old, now), Some(ContentCategory::Standard));
    }

    #[test]
    fn test_huge_staleness_window_keeps_everything() {
        let classifier = Classifier::new(chrono::Duration::MAX, DEFAULT_SHORT_MAX_SECS);
        let now = Utc::now();
        let mut old = item(PlatformKind::Bluesky, "old", Default::default());
        old.published_at = now - chrono::Duration::days(3650);
        assert_eq!(classifier.classify(&old, now), Some(ContentCategory::Standard));
    }

    #[test]
    fn test_upcoming_broadcasts_are_excluded() {
        let classifier = Classifier::default();
        let upcoming = item(
            PlatformKind::Youtube,
            "premiere",
            CategoryHints {
                is_upcoming: true,
                ..Default::default()
            },
        );
        assert_eq!(classifier.classify(&upcoming, Utc::now()), None);
    }

    #[test]
    fn test_rule_override() {
        let classifier = Classifier::default().with_rules(
            PlatformKind::Instagram,
            vec![ClassificationRule::new(
                Signal::MediaType("VIDEO".into()),
                ContentCategory::ShortForm,
            )],
        );
        let video = item(
            PlatformKind::Instagram,
            "clip",
            CategoryHints {
                media_type: Some("VIDEO".into()),
                ..Default::default()
            },
        );
        assert_eq!(
            classifier.classify(&video, Utc::now()),
            Some(ContentCategory::ShortForm)
        );
    }

    #[test]
    fn test_signal_serde() {
        let rule = ClassificationRule::new(Signal::MaxDurationSecs(90), ContentCategory::ShortForm);
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"signal": {"kind": "max_duration_secs", "value": 90}, "category": "short_form"})
        );
        let live: Signal = serde_json::from_value(serde_json::json!({"kind": "live"})).unwrap();
        assert_eq!(live, Signal::Live);
    }
}
