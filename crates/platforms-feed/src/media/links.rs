use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

static URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"')\]]+"#).unwrap());

/// Known hosts and the label shown for links pointing at them.
const KNOWN_HOSTS: &[(&str, &str)] = &[
    ("youtube.com", "YouTube Link"),
    ("youtu.be", "YouTube Link"),
    ("spotify.com", "Spotify Link"),
    ("soundcloud.com", "SoundCloud Link"),
    ("bandcamp.com", "Bandcamp Link"),
    ("music.apple.com", "Apple Music Link"),
    ("instagram.com", "Instagram Link"),
    ("bsky.app", "Bluesky Link"),
];

/// A cross-platform link discovered inside an item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecondaryLink {
    pub label: String,
    pub url: String,
}

impl SecondaryLink {
    /// Build a labelled link. Returns `None` for anything that is not an http(s) URL.
    pub fn from_url(raw: &str) -> Option<Self> {
        let parsed = Url::parse(raw.trim()).ok()?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return None;
        }
        let host = parsed.host_str()?.to_ascii_lowercase();
        let label = KNOWN_HOSTS
            .iter()
            .find(|(known, _)| host == *known || host.ends_with(&format!(".{known}")))
            .map(|(_, label)| *label)
            .unwrap_or("Link");

        Some(Self {
            label: label.to_string(),
            url: parsed.to_string(),
        })
    }

    /// Whether the link points at a known media platform rather than an arbitrary site.
    pub fn is_known_platform(&self) -> bool {
        self.label != "Link"
    }
}

/// Find http(s) URLs in free text.
pub fn extract_links(text: &str) -> Vec<SecondaryLink> {
    let mut out = Vec::new();
    for m in URL_REGEX.find_iter(text) {
        let candidate = m.as_str().trim_end_matches(['.', ',', '!', '?', ';', ':']);
        push_unique(&mut out, SecondaryLink::from_url(candidate));
    }
    out
}

/// Append a link unless an identical URL is already present.
pub fn push_unique(links: &mut Vec<SecondaryLink>, link: Option<SecondaryLink>) {
    if let Some(link) = link
        && !links.iter().any(|l| l.url == link.url)
    {
        links.push(link);
    }
}
