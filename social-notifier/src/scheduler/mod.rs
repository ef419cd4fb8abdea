//! Scheduler module for driving poll cycles.
//!
//! The [`PollingScheduler`] owns the adapters, the dedup state and the sink.
//! Everything else observes it through a [`StatusHandle`].

mod health;
mod service;

pub use health::{CyclePhase, HealthStatus, SourceHealth, StatusHandle, StatusSnapshot};
pub use service::{CycleReport, PollingScheduler, SchedulerConfig};
