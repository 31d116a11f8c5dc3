//! Postgres persistence for accounts, posts, agents and combined predictions.
//!
//! Every query takes a `&PgPool`; callers own the pool.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("record not found")]
    NotFound,
    /// A business rule was violated, e.g. an agent references an account
    /// that has never been looked up.
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("failed to encode {context}: {source}")]
    Encode {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub mod accounts;
pub mod agents;
pub mod combined_predictions;
pub mod pool;
pub mod posts;

pub use accounts::{
    get_account_by_handle, get_account_by_x_user_id, list_tracked_account_ids,
    mark_account_fetched, upsert_account, AccountRow,
};
pub use agents::{
    create_or_merge_agent, delete_agent, list_agents_for_wallet, list_all_agents, update_agent,
    AgentMergeOutcome, AgentRow, AgentUpdate, AgentWithAccounts,
};
pub use combined_predictions::{
    insert_combined_prediction, list_combined_predictions, prune_combined_predictions,
    CombinedPredictionRow,
};
pub use pool::{connect_pool, health_check, ping, run_migrations, PoolConfig};
pub use posts::{
    list_posts, list_posts_for_handles, post_exists, recent_predictions, save_post, PostRow,
    SaveOutcome,
};
