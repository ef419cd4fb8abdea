mod backoff_policy;
mod dedup_key;

pub use backoff_policy::BackoffPolicy;
pub use dedup_key::DedupKey;
