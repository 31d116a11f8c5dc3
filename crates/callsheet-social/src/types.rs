use callsheet_core::{normalize_handle, parse_timestamp, FetchedPost, TrackedAccount};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Request budget reported by the provider after a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub remaining: u32,
    /// Epoch seconds at which the budget resets.
    pub reset_at: i64,
}

impl RateLimit {
    /// Conservative stand-in used when the provider sent no headers: one call
    /// left, resetting after the fallback window.
    #[must_use]
    pub fn fallback(now: DateTime<Utc>, fallback_secs: u64) -> Self {
        let window = i64::try_from(fallback_secs).unwrap_or(i64::MAX);
        Self {
            remaining: 1,
            reset_at: now.timestamp().saturating_add(window),
        }
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Time left until the window resets, or `None` if it already has.
    #[must_use]
    pub fn wait_from(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        let secs = self.reset_at.saturating_sub(now.timestamp());
        u64::try_from(secs)
            .ok()
            .filter(|s| *s > 0)
            .map(std::time::Duration::from_secs)
    }
}

/// Result of one timeline fetch.
#[derive(Debug, Clone)]
pub struct RecentPosts {
    pub posts: Vec<FetchedPost>,
    pub rate_limit: RateLimit,
}

impl RecentPosts {
    #[must_use]
    pub fn empty(rate_limit: RateLimit) -> Self {
        Self {
            posts: Vec::new(),
            rate_limit,
        }
    }
}

/// Public profile of an account, from the username lookup endpoint.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct XUser {
    pub id: String,
    pub name: Option<String>,
    pub username: String,
    pub profile_image_url: Option<String>,
    #[serde(default)]
    pub verified: bool,
    pub created_at: Option<String>,
}

impl XUser {
    #[must_use]
    pub fn into_tracked_account(self, fetched_at: DateTime<Utc>) -> TrackedAccount {
        TrackedAccount {
            handle: normalize_handle(&self.username),
            account_created_at: self.created_at.as_deref().and_then(parse_timestamp),
            x_user_id: self.id,
            display_name: self.name,
            verified: self.verified,
            avatar_url: self.profile_image_url,
            last_fetched_at: Some(fetched_at),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct UserLookupResponse {
    pub data: Option<XUser>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TimelineResponse {
    #[serde(default)]
    pub data: Vec<RawPost>,
    #[serde(default)]
    pub includes: Includes,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawPost {
    pub id: String,
    pub text: String,
    pub author_id: Option<String>,
    pub created_at: Option<String>,
    pub attachments: Option<Attachments>,
    #[serde(default)]
    pub referenced_tweets: Vec<ReferencedPost>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Attachments {
    #[serde(default)]
    pub media_keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReferencedPost {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Includes {
    #[serde(default)]
    pub users: Vec<IncludedUser>,
    #[serde(default)]
    pub media: Vec<Media>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IncludedUser {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Media {
    pub media_key: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: Option<String>,
    pub preview_image_url: Option<String>,
}

impl Media {
    /// Photos resolve to their direct URL; video and animated media to the
    /// preview image.
    pub(crate) fn display_url(&self) -> Option<&str> {
        match self.kind.as_str() {
            "photo" => self.url.as_deref(),
            "video" | "animated_gif" => self.preview_image_url.as_deref(),
            _ => self.url.as_deref().or(self.preview_image_url.as_deref()),
        }
    }
}

impl RawPost {
    pub(crate) fn is_reply_or_repost(&self) -> bool {
        self.referenced_tweets
            .iter()
            .any(|r| r.kind == "replied_to" || r.kind == "retweeted")
    }
}
