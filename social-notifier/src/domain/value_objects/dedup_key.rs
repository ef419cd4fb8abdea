//! Dedup key value object.

use std::fmt;
use std::str::FromStr;

use platforms_feed::{ContentCategory, PlatformKind};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Key of one dedup record: `platform:account:category`.
///
/// Each category of each account is tracked independently, so a new live
/// broadcast never hides a pending upload and vice versa.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DedupKey(String);

impl DedupKey {
    pub fn new(platform: PlatformKind, account: &str, category: ContentCategory) -> Self {
        Self(format!("{platform}:{account}:{category}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split the key into its parts.
    pub fn parts(&self) -> Option<(PlatformKind, &str, ContentCategory)> {
        let (platform, rest) = self.0.split_once(':')?;
        let (account, category) = rest.rsplit_once(':')?;
        if account.is_empty() {
            return None;
        }
        Some((platform.parse().ok()?, account, category.parse().ok()?))
    }
}

impl FromStr for DedupKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = Self(s.trim().to_string());
        match key.parts() {
            Some((platform, account, category)) => Ok(Self::new(platform, account, category)),
            None => Err(Error::config(format!(
                "invalid state key '{s}', expected platform:account:category"
            ))),
        }
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
