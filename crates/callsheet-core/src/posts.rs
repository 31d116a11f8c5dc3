use serde::{Deserialize, Serialize};

/// A post as returned by the social source, before extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedPost {
    pub id: String,
    pub author_id: String,
    /// Resolved author handle; `None` when the provider did not expand it.
    pub author_handle: Option<String>,
    pub text: String,
    /// Raw provider timestamp, normalised when the post is stored.
    pub created_at: Option<String>,
    /// Photo URLs, or preview images for video and animated media.
    pub media_urls: Vec<String>,
}
