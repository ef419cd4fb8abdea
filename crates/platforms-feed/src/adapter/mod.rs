//! Platform adapters.
//!
//! Every platform implements [`SourceAdapter`]: given an account handle it
//! returns a bounded, newest-first window of [`FetchedItem`]s. Adapters own
//! their HTTP client and any lookup cache; they hold no notification state.

pub mod client;
pub mod error;
pub mod factory;
pub mod platforms;
pub mod utils;

pub use error::FetchError;
pub use factory::{AdapterFactory, AdapterOptions};

use async_trait::async_trait;

use crate::media::{FetchedItem, PlatformKind};

/// A platform that can list recent items of an account.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Platform served by this adapter.
    fn platform(&self) -> PlatformKind;

    /// Fetch up to `window_size` recent items of `account`, newest first.
    ///
    /// Missing optional fields degrade to `None`; an item without a stable id
    /// fails the whole call with [`FetchError::Transient`].
    async fn fetch_recent(
        &self,
        account: &str,
        window_size: usize,
    ) -> Result<Vec<FetchedItem>, FetchError>;
}
