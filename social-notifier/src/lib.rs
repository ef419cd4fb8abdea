//! social-notifier library crate.
//!
//! Exposes the polling pipeline for the binary and for integration testing.

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod notification;
pub mod scheduler;
pub mod state;
pub mod utils;

pub use error::{Error, Result};
