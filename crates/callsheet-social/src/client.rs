//! HTTP client for the X v2 REST API.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use callsheet_core::FetchedPost;
use chrono::Utc;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode, Url};

use crate::error::SocialError;
use crate::types::{RateLimit, RecentPosts, TimelineResponse, UserLookupResponse, XUser};
use crate::SocialSource;

const DEFAULT_BASE_URL: &str = "https://api.x.com/2";
const DEFAULT_RATE_LIMIT_FALLBACK_SECS: u64 = 900;

/// The timeline endpoint rejects `max_results` outside this range.
const MIN_PAGE_SIZE: u32 = 5;
const MAX_PAGE_SIZE: u32 = 100;

const HEADER_REMAINING: &str = "x-rate-limit-remaining";
const HEADER_RESET: &str = "x-rate-limit-reset";

/// Client for the X v2 API authenticated with an app bearer token.
///
/// Use [`XClient::new`] for production or [`XClient::with_base_url`] to point
/// at a mock server in tests.
pub struct XClient {
    client: Client,
    bearer_token: String,
    base_url: Url,
    rate_limit_fallback_secs: u64,
}

impl XClient {
    /// Creates a client pointed at the production API.
    ///
    /// # Errors
    ///
    /// Returns [`SocialError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(bearer_token: &str, timeout_secs: u64) -> Result<Self, SocialError> {
        Self::with_base_url(bearer_token, timeout_secs, DEFAULT_BASE_URL)
    }

    /// Creates a client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`SocialError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`SocialError::InvalidBaseUrl`] if
    /// `base_url` is not a valid URL.
    pub fn with_base_url(
        bearer_token: &str,
        timeout_secs: u64,
        base_url: &str,
    ) -> Result<Self, SocialError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("callsheet/0.1 (prediction-tracking)")
            .build()?;

        // Trailing slash so that `join` appends to the versioned path.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| SocialError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            bearer_token: bearer_token.to_owned(),
            base_url,
            rate_limit_fallback_secs: DEFAULT_RATE_LIMIT_FALLBACK_SECS,
        })
    }

    /// Override the reset window assumed when rate-limit headers are missing.
    #[must_use]
    pub fn with_rate_limit_fallback(mut self, secs: u64) -> Self {
        self.rate_limit_fallback_secs = secs;
        self
    }

    /// Look up a public profile by handle.
    ///
    /// Returns `Ok(None)` when the account does not exist.
    ///
    /// # Errors
    ///
    /// - [`SocialError::Http`] on network failure or a non-2xx, non-404 status.
    /// - [`SocialError::Deserialize`] if the body does not match the expected shape.
    pub async fn lookup_user(&self, handle: &str) -> Result<Option<XUser>, SocialError> {
        let handle = handle.trim().trim_start_matches('@');
        let url = self.endpoint(&format!("users/by/username/{handle}"))?;

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.bearer_token)
            .query(&[(
                "user.fields",
                "id,name,username,profile_image_url,verified,created_at",
            )])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = response.error_for_status()?.text().await?;

        // Unknown handles come back as 200 with an `errors` array and no `data`.
        let parsed: UserLookupResponse =
            serde_json::from_str(&body).map_err(|e| SocialError::Deserialize {
                context: format!("user lookup for {handle}"),
                source: e,
            })?;
        Ok(parsed.data)
    }

    async fn fetch_timeline(
        &self,
        account_id: &str,
        limit: u32,
    ) -> Result<reqwest::Response, SocialError> {
        let url = self.endpoint(&format!("users/{account_id}/tweets"))?;
        let max_results = limit.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE).to_string();

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.bearer_token)
            .query(&[
                ("max_results", max_results.as_str()),
                ("exclude", "replies,retweets"),
                ("tweet.fields", "author_id,created_at,text,attachments,referenced_tweets"),
                ("expansions", "author_id,attachments.media_keys"),
                ("user.fields", "username"),
                ("media.fields", "url,preview_image_url,type"),
            ])
            .send()
            .await?;
        Ok(response)
    }

    async fn decode_timeline(
        response: reqwest::Response,
        account_id: &str,
        limit: u32,
    ) -> Result<Vec<FetchedPost>, SocialError> {
        let body = response.error_for_status()?.text().await?;
        let timeline: TimelineResponse =
            serde_json::from_str(&body).map_err(|e| SocialError::Deserialize {
                context: format!("timeline for {account_id}"),
                source: e,
            })?;
        Ok(resolve_posts(timeline, limit))
    }

    fn endpoint(&self, path: &str) -> Result<Url, SocialError> {
        self.base_url
            .join(path)
            .map_err(|e| SocialError::InvalidBaseUrl {
                url: format!("{}{path}", self.base_url),
                reason: e.to_string(),
            })
    }

    fn rate_limit_from(&self, headers: &HeaderMap) -> RateLimit {
        let fallback = RateLimit::fallback(Utc::now(), self.rate_limit_fallback_secs);
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
        };
        RateLimit {
            remaining: read(HEADER_REMAINING)
                .and_then(|v| v.parse().ok())
                .unwrap_or(fallback.remaining),
            reset_at: read(HEADER_RESET)
                .and_then(|v| v.parse().ok())
                .unwrap_or(fallback.reset_at),
        }
    }
}

#[async_trait]
impl SocialSource for XClient {
    async fn fetch_recent_posts(&self, account_id: &str, limit: u32) -> RecentPosts {
        let response = match self.fetch_timeline(account_id, limit).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(account_id, error = %e, "social: timeline request failed");
                return RecentPosts::empty(RateLimit::fallback(
                    Utc::now(),
                    self.rate_limit_fallback_secs,
                ));
            }
        };

        // Headers are read before the status check so a 429 still paces the caller.
        let rate_limit = self.rate_limit_from(response.headers());

        match Self::decode_timeline(response, account_id, limit).await {
            Ok(posts) => RecentPosts { posts, rate_limit },
            Err(e) => {
                tracing::warn!(account_id, error = %e, "social: timeline response unusable");
                RecentPosts::empty(rate_limit)
            }
        }
    }
}

/// Attach author handles and media URLs, drop replies and reposts, and cap
/// the result at `limit`.
fn resolve_posts(timeline: TimelineResponse, limit: u32) -> Vec<FetchedPost> {
    let handles: HashMap<&str, &str> = timeline
        .includes
        .users
        .iter()
        .map(|u| (u.id.as_str(), u.username.as_str()))
        .collect();
    let media: HashMap<&str, &str> = timeline
        .includes
        .media
        .iter()
        .filter_map(|m| m.display_url().map(|url| (m.media_key.as_str(), url)))
        .collect();

    let limit = usize::try_from(limit).unwrap_or(usize::MAX);

    timeline
        .data
        .iter()
        .filter(|p| !p.is_reply_or_repost())
        .take(limit)
        .map(|p| {
            let author_id = p.author_id.clone().unwrap_or_default();
            let media_urls = p
                .attachments
                .as_ref()
                .map(|a| {
                    a.media_keys
                        .iter()
                        .filter_map(|k| media.get(k.as_str()).map(|u| (*u).to_string()))
                        .collect()
                })
                .unwrap_or_default();
            FetchedPost {
                id: p.id.clone(),
                author_handle: handles.get(author_id.as_str()).map(|h| (*h).to_string()),
                author_id,
                text: p.text.clone(),
                created_at: p.created_at.clone(),
                media_urls,
            }
        })
        .collect()
}
