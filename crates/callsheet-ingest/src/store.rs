//! Persistence seam used by the ingestion and aggregation jobs.

use async_trait::async_trait;
use callsheet_core::{AccountRef, CombinedPrediction, ExtractionResult, FetchedPost};
use callsheet_db::{AgentWithAccounts, DbError, PostRow, SaveOutcome};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

#[async_trait]
pub trait PostStore: Send + Sync {
    /// Provider IDs of every account some agent tracks, in polling order.
    async fn tracked_account_ids(&self) -> Result<Vec<String>, DbError>;

    /// Stored handle for a provider ID, used when a fetch did not resolve one.
    async fn handle_for_account(&self, account_id: &str) -> Result<Option<String>, DbError>;

    async fn exists(&self, handle: &str, post_id: &str) -> Result<bool, DbError>;

    async fn save(
        &self,
        handle: &str,
        post: &FetchedPost,
        extraction: &ExtractionResult,
    ) -> Result<SaveOutcome, DbError>;

    async fn mark_fetched(&self, handle: &str) -> Result<(), DbError>;

    async fn recent_predictions(&self, window_hours: u32) -> Result<Vec<PostRow>, DbError>;

    async fn agents(&self) -> Result<Vec<AgentWithAccounts>, DbError>;

    async fn save_combined(
        &self,
        agent_id: i64,
        prediction: &CombinedPrediction,
        supporting: &[AccountRef],
    ) -> Result<i64, DbError>;

    async fn prune_combined(&self, cutoff: DateTime<Utc>) -> Result<u64, DbError>;
}

/// [`PostStore`] backed by the Postgres pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PostStore for PgStore {
    async fn tracked_account_ids(&self) -> Result<Vec<String>, DbError> {
        callsheet_db::list_tracked_account_ids(&self.pool).await
    }

    async fn handle_for_account(&self, account_id: &str) -> Result<Option<String>, DbError> {
        Ok(callsheet_db::get_account_by_x_user_id(&self.pool, account_id)
            .await?
            .map(|row| row.handle))
    }

    async fn exists(&self, handle: &str, post_id: &str) -> Result<bool, DbError> {
        callsheet_db::post_exists(&self.pool, handle, post_id).await
    }

    async fn save(
        &self,
        handle: &str,
        post: &FetchedPost,
        extraction: &ExtractionResult,
    ) -> Result<SaveOutcome, DbError> {
        callsheet_db::save_post(&self.pool, handle, post, Some(extraction)).await
    }

    async fn mark_fetched(&self, handle: &str) -> Result<(), DbError> {
        callsheet_db::mark_account_fetched(&self.pool, handle).await
    }

    async fn recent_predictions(&self, window_hours: u32) -> Result<Vec<PostRow>, DbError> {
        callsheet_db::recent_predictions(&self.pool, window_hours).await
    }

    async fn agents(&self) -> Result<Vec<AgentWithAccounts>, DbError> {
        callsheet_db::list_all_agents(&self.pool).await
    }

    async fn save_combined(
        &self,
        agent_id: i64,
        prediction: &CombinedPrediction,
        supporting: &[AccountRef],
    ) -> Result<i64, DbError> {
        callsheet_db::insert_combined_prediction(&self.pool, agent_id, prediction, supporting).await
    }

    async fn prune_combined(&self, cutoff: DateTime<Utc>) -> Result<u64, DbError> {
        callsheet_db::prune_combined_predictions(&self.pool, cutoff).await
    }
}
