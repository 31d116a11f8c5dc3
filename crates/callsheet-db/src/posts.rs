//! Database operations for the `posts` table.
//!
//! `(account_handle, post_id)` is unique at the storage layer, so
//! [`save_post`] is idempotent even when two ingestion passes race.

use callsheet_core::{normalize_handle, parse_created_at, ExtractionResult, FetchedPost};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;

use crate::DbError;

/// A row from the `posts` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PostRow {
    pub id: i64,
    pub account_handle: String,
    pub post_id: String,
    pub text: String,
    pub media_urls: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub extraction: Option<Value>,
    pub is_prediction: bool,
    pub stored_at: DateTime<Utc>,
}

impl PostRow {
    /// Decode the stored extraction, if any.
    ///
    /// Returns `None` when the column is null or no longer matches the
    /// current record shape.
    #[must_use]
    pub fn extraction_result(&self) -> Option<ExtractionResult> {
        self.extraction
            .clone()
            .and_then(|v| serde_json::from_value(v).ok())
    }
}

/// Outcome of [`save_post`]: the row id, and whether this call created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Created(i64),
    Exists(i64),
}

impl SaveOutcome {
    #[must_use]
    pub fn id(self) -> i64 {
        match self {
            SaveOutcome::Created(id) | SaveOutcome::Exists(id) => id,
        }
    }

    #[must_use]
    pub fn is_created(self) -> bool {
        matches!(self, SaveOutcome::Created(_))
    }
}

const POST_COLUMNS: &str = "id, account_handle, post_id, text, media_urls, created_at, \
     extraction, is_prediction, stored_at";

/// Whether a post has already been stored for this account.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn post_exists(pool: &PgPool, account_handle: &str, post_id: &str) -> Result<bool, DbError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM posts WHERE account_handle = $1 AND post_id = $2)",
    )
    .bind(normalize_handle(account_handle))
    .bind(post_id)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

/// Insert a post with its extraction unless it is already stored.
///
/// The creation timestamp is normalised to UTC; missing or unparseable values
/// fall back to the current time. Stored posts are never updated.
///
/// # Errors
///
/// Returns [`DbError::Encode`] if the extraction cannot be serialised, or
/// [`DbError::Sqlx`] if the insert fails.
pub async fn save_post(
    pool: &PgPool,
    account_handle: &str,
    post: &FetchedPost,
    extraction: Option<&ExtractionResult>,
) -> Result<SaveOutcome, DbError> {
    let handle = normalize_handle(account_handle);
    let created_at = parse_created_at(post.created_at.as_deref());
    let is_prediction = extraction.is_some_and(|e| e.is_prediction);
    let extraction_json = extraction
        .map(serde_json::to_value)
        .transpose()
        .map_err(|source| DbError::Encode {
            context: "extraction result",
            source,
        })?;

    let inserted: Option<i64> = sqlx::query_scalar(
        "INSERT INTO posts \
             (account_handle, post_id, text, media_urls, created_at, extraction, is_prediction) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT (account_handle, post_id) DO NOTHING \
         RETURNING id",
    )
    .bind(&handle)
    .bind(&post.id)
    .bind(&post.text)
    .bind(&post.media_urls)
    .bind(created_at)
    .bind(extraction_json)
    .bind(is_prediction)
    .fetch_optional(pool)
    .await?;

    if let Some(id) = inserted {
        return Ok(SaveOutcome::Created(id));
    }

    let existing: i64 =
        sqlx::query_scalar("SELECT id FROM posts WHERE account_handle = $1 AND post_id = $2")
            .bind(&handle)
            .bind(&post.id)
            .fetch_one(pool)
            .await?;

    Ok(SaveOutcome::Exists(existing))
}

/// Prediction-flagged posts created within the trailing window, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn recent_predictions(pool: &PgPool, window_hours: u32) -> Result<Vec<PostRow>, DbError> {
    let rows = sqlx::query_as::<_, PostRow>(&format!(
        "SELECT {POST_COLUMNS} FROM posts \
         WHERE is_prediction \
           AND created_at >= NOW() - make_interval(hours => $1) \
         ORDER BY created_at DESC, id DESC"
    ))
    .bind(i32::try_from(window_hours).unwrap_or(i32::MAX))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// List stored posts, optionally filtered by account and prediction flag.
///
/// Results are ordered by `created_at DESC` then `id DESC`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_posts(
    pool: &PgPool,
    account_handle: Option<&str>,
    predictions_only: bool,
    limit: i64,
) -> Result<Vec<PostRow>, DbError> {
    let rows = sqlx::query_as::<_, PostRow>(&format!(
        "SELECT {POST_COLUMNS} FROM posts \
         WHERE ($1::text IS NULL OR account_handle = $1) \
           AND (NOT $2 OR is_prediction) \
         ORDER BY created_at DESC, id DESC \
         LIMIT $3"
    ))
    .bind(account_handle.map(normalize_handle))
    .bind(predictions_only)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Stored posts for any of the given handles, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_posts_for_handles(
    pool: &PgPool,
    handles: &[String],
    limit_per_account: i64,
) -> Result<Vec<PostRow>, DbError> {
    if handles.is_empty() {
        return Ok(Vec::new());
    }

    let rows = sqlx::query_as::<_, PostRow>(&format!(
        "SELECT {POST_COLUMNS} FROM ( \
             SELECT p.*, ROW_NUMBER() OVER ( \
                 PARTITION BY account_handle ORDER BY created_at DESC, id DESC \
             ) AS rn \
             FROM posts p \
             WHERE account_handle = ANY($1) \
         ) ranked \
         WHERE rn <= $2 \
         ORDER BY created_at DESC, id DESC"
    ))
    .bind(handles)
    .bind(limit_per_account)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
