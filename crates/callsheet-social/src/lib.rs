//! Read-only client for the X (Twitter) v2 API.
//!
//! [`XClient`] implements [`SocialSource`], the seam the ingestion loop polls
//! through. Fetch failures never surface as errors there: they degrade to an
//! empty post list with conservative rate-limit defaults.

pub mod client;
pub mod error;
pub mod types;

use async_trait::async_trait;

pub use client::XClient;
pub use error::SocialError;
pub use types::{RateLimit, RecentPosts, XUser};

/// A source of recent posts for a numeric account ID.
#[async_trait]
pub trait SocialSource: Send + Sync {
    /// At most `limit` most-recent original posts for the account.
    ///
    /// Replies and reposts are excluded. Transport failures yield an empty
    /// list, never an error.
    async fn fetch_recent_posts(&self, account_id: &str, limit: u32) -> RecentPosts;
}
