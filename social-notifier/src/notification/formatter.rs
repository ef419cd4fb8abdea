use platforms_feed::{ContentCategory, FetchedItem, PlatformKind};

use super::payload::{NotificationPayload, PayloadAuthor, PayloadField};
use crate::domain::TrackedSource;

/// Default cap on the body text, in characters.
pub const DEFAULT_MAX_BODY_CHARS: usize = 2000;

/// Turns a classified item into a [`NotificationPayload`].
#[derive(Debug, Clone)]
pub struct NotificationFormatter {
    max_body_chars: usize,
}

impl Default for NotificationFormatter {
    fn default() -> Self {
        Self {
            max_body_chars: DEFAULT_MAX_BODY_CHARS,
        }
    }
}

impl NotificationFormatter {
    pub fn new(max_body_chars: usize) -> Self {
        Self {
            max_body_chars: max_body_chars.max(1),
        }
    }

    pub fn format(
        &self,
        source: &TrackedSource,
        item: &FetchedItem,
        category: ContentCategory,
    ) -> NotificationPayload {
        let name = source.label();
        let author = PayloadAuthor {
            name: item
                .author_name
                .clone()
                .unwrap_or_else(|| name.to_string()),
            url: item.author_url.clone(),
            icon_url: item.author_avatar.clone(),
        };

        let fields = item
            .secondary_links
            .iter()
            .map(|link| PayloadField {
                name: link.label.clone(),
                value: link.url.clone(),
            })
            .collect();

        NotificationPayload {
            title: headline(item.platform, category, name),
            body: truncate_chars(item.title.trim(), self.max_body_chars),
            url: item.url.clone(),
            image_url: item.thumbnail_url.clone(),
            author: Some(author),
            fields,
            category,
            platform: item.platform,
            account: source.account.clone(),
            item_id: item.id.clone(),
            timestamp: item.published_at,
        }
    }
}

fn headline(platform: PlatformKind, category: ContentCategory, name: &str) -> String {
    let p = platform.display_name();
    match (category, platform) {
        (ContentCategory::Live, _) => format!("{name} is live on {p}"),
        (ContentCategory::Story, _) => format!("New {p} story from {name}"),
        (ContentCategory::ShortForm, PlatformKind::Youtube) => format!("New YouTube Short from {name}"),
        (ContentCategory::ShortForm, PlatformKind::Instagram) => format!("New Instagram Reel from {name}"),
        (ContentCategory::ShortForm, _) => format!("New short from {name} on {p}"),
        (ContentCategory::ExternalPost, _) => format!("{name} shared a link on {p}"),
        (ContentCategory::Standard, PlatformKind::Youtube) => format!("New YouTube video from {name}"),
        (ContentCategory::Standard, _) => format!("New {p} post from {name}"),
    }
}

/// Truncate to at most `max` characters, marking the cut with an ellipsis.
pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use platforms_feed::SecondaryLink;

    fn bluesky_item() -> FetchedItem {
        FetchedItem::builder(
            "at://did:plc:goose/app.bsky.feed.post/3lb",
            PlatformKind::Bluesky,
            Utc::now(),
        )
        .title("New album out now")
        .url("https://bsky.app/profile/goose.bsky.social/post/3lb")
        .author(
            Some("Goose".into()),
            Some("https://bsky.app/profile/goose.bsky.social".into()),
            Some("https://cdn.example/avatar.jpg".into()),
        )
        .secondary_links(
            ["https://youtu.be/abc", "https://open.spotify.com/album/xyz"]
                .into_iter()
                .filter_map(SecondaryLink::from_url)
                .collect(),
        )
        .build()
    }

    #[test]
    fn test_format_bluesky_post() {
        let source = TrackedSource::new(PlatformKind::Bluesky, "goose.bsky.social");
        let payload =
            NotificationFormatter::default().format(&source, &bluesky_item(), ContentCategory::Standard);

        assert_eq!(payload.title, "New Bluesky post from goose.bsky.social");
        assert_eq!(payload.body, "New album out now");
        assert_eq!(payload.account, "goose.bsky.social");
        let author = payload.author.unwrap();
        assert_eq!(author.name, "Goose");
        assert_eq!(author.icon_url.as_deref(), Some("https://cdn.example/avatar.jpg"));

        let names: Vec<_> = payload.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["YouTube Link", "Spotify Link"]);
    }

    #[test]
    fn test_headlines_per_category() {
        let yt = |c| headline(PlatformKind::Youtube, c, "Goose");
        assert_eq!(yt(ContentCategory::Live), "Goose is live on YouTube");
        assert_eq!(yt(ContentCategory::ShortForm), "New YouTube Short from Goose");
        assert_eq!(yt(ContentCategory::Standard), "New YouTube video from Goose");
        assert_eq!(
            headline(PlatformKind::Instagram, ContentCategory::Story, "Goose"),
            "New Instagram story from Goose"
        );
        assert_eq!(
            headline(PlatformKind::Bluesky, ContentCategory::ExternalPost, "Goose"),
            "Goose shared a link on Bluesky"
        );
    }

    #[test]
    fn test_display_name_and_truncation() {
        let source = TrackedSource::new(PlatformKind::Bluesky, "goose.bsky.social")
            .with_display_name("Goose (band)");
        let mut item = bluesky_item();
        item.title = "x".repeat(50);
        item.author_name = None;

        let payload = NotificationFormatter::new(10).format(&source, &item, ContentCategory::Standard);
        assert_eq!(payload.title, "New Bluesky post from Goose (band)");
        assert_eq!(payload.body.chars().count(), 10);
        assert!(payload.body.ends_with('…'));
        assert_eq!(payload.author.unwrap().name, "Goose (band)");
    }
}
