//! Recent-item feeds for YouTube, Instagram and Bluesky accounts.
//!
//! Each platform adapter turns an account handle into a newest-first window of
//! [`media::FetchedItem`]s with enough signals attached ([`media::CategoryHints`])
//! for a caller to decide what kind of content it is looking at.

pub mod adapter;
pub mod cache;
pub mod media;

pub use adapter::{AdapterFactory, AdapterOptions, FetchError, SourceAdapter};
pub use cache::ResultCache;
pub use media::{CategoryHints, ContentCategory, FetchedItem, PlatformKind, SecondaryLink};
