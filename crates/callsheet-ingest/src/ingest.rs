//! One polling pass over every tracked account.
//!
//! Accounts are visited in batches. Only the newest post per account is
//! considered; it is analysed and stored unless it was already seen. A
//! failure on one account is logged and the pass moves on.

use std::sync::Arc;
use std::time::Duration;

use callsheet_analyst::PostAnalyzer;
use callsheet_core::{normalize_handle, parse_timestamp, AppConfig, FetchedPost};
use callsheet_social::{RateLimit, SocialSource};
use chrono::Utc;

use crate::error::IngestError;
use crate::store::PostStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    pub batch_size: usize,
    /// Pause between two batches, independent of rate-limit state.
    pub batch_cooldown: Duration,
    /// Posts requested per account.
    pub max_posts: u32,
}

impl IngestConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            batch_size: config.ingest_batch_size,
            batch_cooldown: Duration::from_secs(config.ingest_batch_cooldown_secs),
            max_posts: config.ingest_max_posts,
        }
    }
}

/// Counters for one pass, logged at the end and returned to the caller.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    pub accounts: usize,
    pub invalid_ids: usize,
    pub created: usize,
    pub existing: usize,
    pub without_posts: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccountOutcome {
    NoPosts,
    Created,
    Exists,
}

impl IngestSummary {
    fn record(&mut self, outcome: AccountOutcome) {
        match outcome {
            AccountOutcome::NoPosts => self.without_posts += 1,
            AccountOutcome::Created => self.created += 1,
            AccountOutcome::Exists => self.existing += 1,
        }
    }
}

pub struct IngestionLoop {
    social: Arc<dyn SocialSource>,
    analyzer: Arc<dyn PostAnalyzer>,
    store: Arc<dyn PostStore>,
    config: IngestConfig,
}

impl IngestionLoop {
    #[must_use]
    pub fn new(
        social: Arc<dyn SocialSource>,
        analyzer: Arc<dyn PostAnalyzer>,
        store: Arc<dyn PostStore>,
        config: IngestConfig,
    ) -> Self {
        Self {
            social,
            analyzer,
            store,
            config,
        }
    }

    /// Visit every tracked account once.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Store`] only if the account list cannot be
    /// read. Per-account failures are logged and counted in the summary.
    pub async fn run_once(&self) -> Result<IngestSummary, IngestError> {
        let ids = self.store.tracked_account_ids().await?;
        let mut summary = IngestSummary::default();

        let (valid, invalid): (Vec<String>, Vec<String>) =
            ids.into_iter().partition(|id| is_valid_account_id(id));
        for id in &invalid {
            tracing::warn!(account_id = %id, "ingest: skipping invalid account id");
        }
        summary.invalid_ids = invalid.len();

        if valid.is_empty() {
            tracing::info!("ingest: no tracked accounts; nothing to do");
            return Ok(summary);
        }

        let batches: Vec<&[String]> = valid.chunks(self.config.batch_size.max(1)).collect();
        let last = batches.len() - 1;
        tracing::info!(
            accounts = valid.len(),
            batches = batches.len(),
            "ingest: starting pass"
        );

        for (index, batch) in batches.iter().enumerate() {
            for account_id in *batch {
                summary.accounts += 1;
                let fetched = self
                    .social
                    .fetch_recent_posts(account_id, self.config.max_posts)
                    .await;

                match self.process_account(account_id, &fetched.posts).await {
                    Ok(outcome) => summary.record(outcome),
                    Err(e) => {
                        summary.failed += 1;
                        tracing::error!(account_id = %account_id, error = %e, "ingest: account failed");
                    }
                }

                pace(account_id, fetched.rate_limit).await;
            }

            if index < last {
                tracing::info!(
                    batch = index + 1,
                    cooldown_secs = self.config.batch_cooldown.as_secs(),
                    "ingest: batch done, cooling down"
                );
                tokio::time::sleep(self.config.batch_cooldown).await;
            }
        }

        tracing::info!(
            accounts = summary.accounts,
            created = summary.created,
            existing = summary.existing,
            without_posts = summary.without_posts,
            failed = summary.failed,
            invalid_ids = summary.invalid_ids,
            "ingest: pass complete"
        );
        Ok(summary)
    }

    async fn process_account(
        &self,
        account_id: &str,
        posts: &[FetchedPost],
    ) -> Result<AccountOutcome, IngestError> {
        let Some(post) = newest_post(posts) else {
            tracing::debug!(account_id = %account_id, "ingest: no posts returned");
            return Ok(AccountOutcome::NoPosts);
        };

        let handle = match post
            .author_handle
            .as_deref()
            .map(normalize_handle)
            .filter(|h| !h.is_empty())
        {
            Some(handle) => handle,
            None => {
                let Some(handle) = self.store.handle_for_account(account_id).await? else {
                    tracing::warn!(
                        account_id = %account_id,
                        post_id = %post.id,
                        "ingest: no handle known for account; skipping post"
                    );
                    return Ok(AccountOutcome::NoPosts);
                };
                handle
            }
        };

        if let Err(e) = self.store.mark_fetched(&handle).await {
            tracing::warn!(handle = %handle, error = %e, "ingest: failed to record fetch time");
        }

        if self.store.exists(&handle, &post.id).await? {
            tracing::debug!(handle = %handle, post_id = %post.id, "ingest: newest post already stored");
            return Ok(AccountOutcome::Exists);
        }

        let extraction = self.analyzer.analyze(post).await?;
        if extraction.is_degraded() {
            tracing::warn!(
                handle = %handle,
                post_id = %post.id,
                reason = %extraction.reason,
                "ingest: storing degraded extraction"
            );
        }

        let outcome = self.store.save(&handle, post, &extraction).await?;
        tracing::info!(
            handle = %handle,
            post_id = %post.id,
            is_prediction = extraction.is_prediction,
            created = outcome.is_created(),
            "ingest: post stored"
        );

        Ok(if outcome.is_created() {
            AccountOutcome::Created
        } else {
            AccountOutcome::Exists
        })
    }
}

/// Sleep until the window resets when the last call used up the budget.
async fn pace(account_id: &str, rate_limit: RateLimit) {
    if !rate_limit.is_exhausted() {
        return;
    }
    if let Some(wait) = rate_limit.wait_from(Utc::now()) {
        tracing::warn!(
            account_id = %account_id,
            wait_secs = wait.as_secs(),
            "ingest: rate limit exhausted; pausing until reset"
        );
        tokio::time::sleep(wait).await;
    }
}

fn is_valid_account_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

/// The post with the latest creation time. Unparseable times sort first.
fn newest_post(posts: &[FetchedPost]) -> Option<&FetchedPost> {
    posts
        .iter()
        .max_by_key(|p| p.created_at.as_deref().and_then(parse_timestamp))
}
