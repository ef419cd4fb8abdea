#![allow(dead_code)]

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AuthorFeedResponse {
    #[serde(default)]
    pub feed: Vec<FeedViewPost>,
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FeedViewPost {
    pub post: PostView,
    pub reason: Option<Reason>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub uri: Option<String>,
    pub cid: Option<String>,
    pub author: Author,
    #[serde(default)]
    pub record: PostRecord,
    pub embed: Option<EmbedView>,
    pub indexed_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub did: Option<String>,
    #[serde(default)]
    pub handle: String,
    pub display_name: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    #[serde(default)]
    pub text: String,
    pub created_at: Option<String>,
    #[serde(default)]
    pub facets: Vec<Facet>,
}

#[derive(Debug, Deserialize)]
pub struct Facet {
    #[serde(default)]
    pub features: Vec<FacetFeature>,
}

#[derive(Debug, Deserialize)]
pub struct FacetFeature {
    #[serde(rename = "$type", default)]
    pub kind: String,
    pub uri: Option<String>,
}

/// Hydrated embed. Only the fields used for notifications are modelled;
/// `recordWithMedia` nests another view under `media`.
#[derive(Debug, Deserialize)]
pub struct EmbedView {
    #[serde(rename = "$type", default)]
    pub kind: String,
    pub external: Option<ExternalView>,
    #[serde(default)]
    pub images: Vec<ImageView>,
    pub thumbnail: Option<String>,
    pub media: Option<Box<EmbedView>>,
}

#[derive(Debug, Deserialize)]
pub struct ExternalView {
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub thumb: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImageView {
    pub thumb: Option<String>,
    pub fullsize: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Reason {
    #[serde(rename = "$type", default)]
    pub kind: String,
}

/// XRPC error body.
#[derive(Debug, Deserialize)]
pub struct XrpcError {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub message: String,
}
