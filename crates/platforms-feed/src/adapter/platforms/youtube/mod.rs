mod builder;
mod models;

pub use builder::{ChannelInfo, Youtube, classify_error};
