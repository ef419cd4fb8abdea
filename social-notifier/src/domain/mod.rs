//! Domain layer for social-notifier.
//!
//! Tracked sources, dedup keys and the backoff policy shared by the scheduler.

pub mod source;
pub mod value_objects;

pub use source::TrackedSource;
pub use value_objects::*;
