//! Database operations for the `combined_predictions` table.
//!
//! Rows form an append-only time series per agent; growth is bounded by
//! [`prune_combined_predictions`].

use callsheet_core::{AccountRef, CombinedPrediction};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;

use crate::DbError;

/// A row from `combined_predictions`, joined with its agent and wallet.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CombinedPredictionRow {
    pub id: i64,
    pub agent_id: i64,
    pub agent_name: String,
    pub wallet_address: String,
    pub token: String,
    pub predicted_price: Option<f64>,
    pub currency: Option<String>,
    pub direction: Option<String>,
    pub confidence: f64,
    pub reasoning: String,
    pub supporting_influencers: Value,
    pub created_at: DateTime<Utc>,
}

/// Append one combined prediction for an agent and return its id.
///
/// `supporting` carries the contributing accounts with the influence weight
/// they had on the agent at aggregation time.
///
/// # Errors
///
/// Returns [`DbError::Encode`] if the influencer list cannot be serialised,
/// or [`DbError::Sqlx`] if the insert fails.
pub async fn insert_combined_prediction(
    pool: &PgPool,
    agent_id: i64,
    prediction: &CombinedPrediction,
    supporting: &[AccountRef],
) -> Result<i64, DbError> {
    let supporting = serde_json::to_value(supporting).map_err(|source| DbError::Encode {
        context: "supporting influencers",
        source,
    })?;

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO combined_predictions \
             (agent_id, token, predicted_price, currency, direction, confidence, \
              reasoning, supporting_influencers) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING id",
    )
    .bind(agent_id)
    .bind(&prediction.token)
    .bind(prediction.predicted_price)
    .bind(&prediction.currency)
    .bind(prediction.direction.map(|d| d.to_string()))
    .bind(prediction.confidence)
    .bind(&prediction.reasoning)
    .bind(supporting)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Latest combined predictions, optionally restricted to one wallet.
///
/// Results are ordered by `created_at DESC` then `id DESC`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_combined_predictions(
    pool: &PgPool,
    wallet_address: Option<&str>,
    limit: i64,
) -> Result<Vec<CombinedPredictionRow>, DbError> {
    let rows = sqlx::query_as::<_, CombinedPredictionRow>(
        "SELECT cp.id, cp.agent_id, ag.name AS agent_name, u.wallet_address, cp.token, \
                cp.predicted_price, cp.currency, cp.direction, cp.confidence, cp.reasoning, \
                cp.supporting_influencers, cp.created_at \
         FROM combined_predictions cp \
         JOIN agents ag ON ag.id = cp.agent_id \
         JOIN users u ON u.id = ag.user_id \
         WHERE ($1::text IS NULL OR u.wallet_address = $1) \
         ORDER BY cp.created_at DESC, cp.id DESC \
         LIMIT $2",
    )
    .bind(wallet_address.map(str::trim))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Delete combined predictions created before `cutoff`. Returns rows removed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn prune_combined_predictions(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM combined_predictions WHERE created_at < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
