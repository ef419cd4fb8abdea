//! Item classification and request pacing.
//!
//! - [`Classifier`] maps fetched items onto notification categories
//! - [`RateLimiterManager`] keeps each platform within its request budget

pub mod classifier;
pub mod rate_limiter;

pub use classifier::{ClassificationRule, Classifier, Signal, default_rules};
pub use rate_limiter::{RateLimiter, RateLimiterConfig, RateLimiterManager};
