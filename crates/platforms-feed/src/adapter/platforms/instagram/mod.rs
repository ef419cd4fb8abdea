mod builder;
mod models;

pub use builder::{Instagram, classify_error};
