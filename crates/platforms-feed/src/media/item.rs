use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PlatformKind;
use super::links::SecondaryLink;

/// Raw platform signals used to pick a [`super::ContentCategory`].
///
/// Adapters only record what the platform told them; the precedence between
/// signals is decided by the classifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryHints {
    /// Item is a broadcast that is currently live.
    pub is_live: bool,
    /// Item is a scheduled broadcast or premiere that has not started yet.
    pub is_upcoming: bool,
    /// Platform explicitly marks the item as short-form (Reels, Shorts).
    pub is_short: bool,
    /// Ephemeral story item.
    pub is_story: bool,
    /// Item's main content is a link card to another site.
    pub has_external_embed: bool,
    /// Item is a repost of someone else's content.
    pub is_repost: bool,
    /// Media duration, when the platform reports one.
    pub duration_secs: Option<u64>,
    /// Raw platform media type (e.g. `VIDEO`, `CAROUSEL_ALBUM`).
    pub media_type: Option<String>,
}

/// A content item normalized across platforms.
///
/// # Examples
///
/// ```rust
/// use chrono::Utc;
/// use platforms_feed::media::{FetchedItem, PlatformKind};
///
/// let item = FetchedItem::builder("abc123", PlatformKind::Youtube, Utc::now())
///     .title("New video")
///     .url("https://www.youtube.com/watch?v=abc123")
///     .thumbnail_url("https://i.ytimg.com/vi/abc123/hqdefault.jpg")
///     .build();
/// assert_eq!(item.id, "abc123");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedItem {
    pub id: String,
    pub platform: PlatformKind,
    pub published_at: DateTime<Utc>,
    pub title: String,
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub author_name: Option<String>,
    pub author_url: Option<String>,
    pub author_avatar: Option<String>,
    pub hints: CategoryHints,
    pub secondary_links: Vec<SecondaryLink>,
}

impl FetchedItem {
    pub fn builder(
        id: impl Into<String>,
        platform: PlatformKind,
        published_at: DateTime<Utc>,
    ) -> FetchedItemBuilder {
        FetchedItemBuilder::new(id, platform, published_at)
    }

    /// Whether the item was published strictly before `cutoff`.
    pub fn is_older_than(&self, cutoff: DateTime<Utc>) -> bool {
        self.published_at < cutoff
    }
}

#[derive(Debug, Clone)]
pub struct FetchedItemBuilder {
    item: FetchedItem,
}

impl FetchedItemBuilder {
    fn new(id: impl Into<String>, platform: PlatformKind, published_at: DateTime<Utc>) -> Self {
        Self {
            item: FetchedItem {
                id: id.into(),
                platform,
                published_at,
                title: String::new(),
                url: String::new(),
                thumbnail_url: None,
                author_name: None,
                author_url: None,
                author_avatar: None,
                hints: CategoryHints::default(),
                secondary_links: Vec::new(),
            },
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.item.title = title.into();
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.item.url = url.into();
        self
    }

    pub fn thumbnail_url(mut self, url: impl Into<String>) -> Self {
        self.item.thumbnail_url = Some(url.into());
        self
    }

    pub fn maybe_thumbnail_url(mut self, url: Option<String>) -> Self {
        self.item.thumbnail_url = url.filter(|u| !u.is_empty());
        self
    }

    pub fn author(
        mut self,
        name: Option<String>,
        url: Option<String>,
        avatar: Option<String>,
    ) -> Self {
        self.item.author_name = name.filter(|n| !n.is_empty());
        self.item.author_url = url.filter(|u| !u.is_empty());
        self.item.author_avatar = avatar.filter(|a| !a.is_empty());
        self
    }

    pub fn hints(mut self, hints: CategoryHints) -> Self {
        self.item.hints = hints;
        self
    }

    pub fn secondary_links(mut self, links: Vec<SecondaryLink>) -> Self {
        self.item.secondary_links = links;
        self
    }

    pub fn build(self) -> FetchedItem {
        self.item
    }
}

/// Sort items newest-first. Ties keep their original relative order.
pub fn sort_newest_first(items: &mut [FetchedItem]) {
    items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
}
