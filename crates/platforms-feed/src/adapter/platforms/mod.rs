pub mod bluesky;
pub mod instagram;
pub mod youtube;

pub use bluesky::Bluesky;
pub use instagram::Instagram;
pub use youtube::Youtube;
