pub mod item;
pub mod links;

pub use item::{CategoryHints, FetchedItem, FetchedItemBuilder};
pub use links::SecondaryLink;

use serde::{Deserialize, Serialize};

/// Supported content platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    Youtube,
    Instagram,
    Bluesky,
}

impl PlatformKind {
    pub const ALL: [PlatformKind; 3] = [
        PlatformKind::Youtube,
        PlatformKind::Instagram,
        PlatformKind::Bluesky,
    ];

    /// Stable lower-case identifier used in keys and config.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformKind::Youtube => "youtube",
            PlatformKind::Instagram => "instagram",
            PlatformKind::Bluesky => "bluesky",
        }
    }

    /// Human readable platform name.
    pub fn display_name(&self) -> &'static str {
        match self {
            PlatformKind::Youtube => "YouTube",
            PlatformKind::Instagram => "Instagram",
            PlatformKind::Bluesky => "Bluesky",
        }
    }
}

impl std::fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PlatformKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "youtube" | "yt" => Ok(PlatformKind::Youtube),
            "instagram" | "ig" => Ok(PlatformKind::Instagram),
            "bluesky" | "bsky" => Ok(PlatformKind::Bluesky),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

/// Notification category of a content item.
///
/// Each category has an independent "last seen" cursor, so a new livestream
/// never hides a pending standard upload and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentCategory {
    Standard,
    ShortForm,
    Live,
    Story,
    ExternalPost,
}

impl ContentCategory {
    pub const ALL: [ContentCategory; 5] = [
        ContentCategory::Standard,
        ContentCategory::ShortForm,
        ContentCategory::Live,
        ContentCategory::Story,
        ContentCategory::ExternalPost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentCategory::Standard => "standard",
            ContentCategory::ShortForm => "short_form",
            ContentCategory::Live => "live",
            ContentCategory::Story => "story",
            ContentCategory::ExternalPost => "external_post",
        }
    }
}

impl std::fmt::Display for ContentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContentCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown content category: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_kind_parse() {
        assert_eq!("YouTube".parse::<PlatformKind>(), Ok(PlatformKind::Youtube));
        assert_eq!("bsky".parse::<PlatformKind>(), Ok(PlatformKind::Bluesky));
        assert!("myspace".parse::<PlatformKind>().is_err());
    }

    #[test]
    fn test_category_string_round_trip() {
        for category in ContentCategory::ALL {
            assert_eq!(category.as_str().parse::<ContentCategory>(), Ok(category));
        }
    }

    #[test]
    fn test_category_serde_uses_snake_case() {
        let json = serde_json::to_string(&ContentCategory::ShortForm).unwrap();
        assert_eq!(json, "\"short_form\"");
    }
}
