use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct MediaListResponse {
    #[serde(default)]
    pub data: Vec<Media>,
}

#[derive(Debug, Deserialize)]
pub struct Media {
    pub id: Option<String>,
    pub caption: Option<String>,
    /// `IMAGE`, `VIDEO` or `CAROUSEL_ALBUM`.
    pub media_type: Option<String>,
    /// `FEED`, `REELS`, `STORY` or `AD`.
    pub media_product_type: Option<String>,
    pub permalink: Option<String>,
    pub timestamp: Option<String>,
    pub thumbnail_url: Option<String>,
    pub media_url: Option<String>,
    pub username: Option<String>,
}

/// Graph API error envelope.
#[derive(Debug, Deserialize)]
pub struct GraphErrorResponse {
    pub error: GraphError,
}

#[derive(Debug, Deserialize)]
pub struct GraphError {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub is_transient: bool,
}
