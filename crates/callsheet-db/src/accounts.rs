//! Database operations for the `accounts` table.

use callsheet_core::{normalize_handle, TrackedAccount};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `accounts` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AccountRow {
    pub id: i64,
    pub handle: String,
    pub x_user_id: String,
    pub display_name: Option<String>,
    pub verified: bool,
    pub avatar_url: Option<String>,
    pub account_created_at: Option<DateTime<Utc>>,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AccountRow> for TrackedAccount {
    fn from(row: AccountRow) -> Self {
        Self {
            handle: row.handle,
            x_user_id: row.x_user_id,
            display_name: row.display_name,
            verified: row.verified,
            avatar_url: row.avatar_url,
            account_created_at: row.account_created_at,
            last_fetched_at: row.last_fetched_at,
        }
    }
}

const ACCOUNT_COLUMNS: &str = "id, handle, x_user_id, display_name, verified, avatar_url, \
     account_created_at, last_fetched_at, created_at, updated_at";

/// Insert or refresh an account keyed by its lowercased handle.
///
/// Metadata columns are overwritten with the fresh values; `last_fetched_at`
/// only moves forward.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_account(pool: &PgPool, account: &TrackedAccount) -> Result<AccountRow, DbError> {
    let row = sqlx::query_as::<_, AccountRow>(&format!(
        "INSERT INTO accounts \
             (handle, x_user_id, display_name, verified, avatar_url, \
              account_created_at, last_fetched_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT (handle) DO UPDATE SET \
             x_user_id          = EXCLUDED.x_user_id, \
             display_name       = EXCLUDED.display_name, \
             verified           = EXCLUDED.verified, \
             avatar_url         = EXCLUDED.avatar_url, \
             account_created_at = COALESCE(EXCLUDED.account_created_at, accounts.account_created_at), \
             last_fetched_at    = GREATEST(EXCLUDED.last_fetched_at, accounts.last_fetched_at), \
             updated_at         = NOW() \
         RETURNING {ACCOUNT_COLUMNS}"
    ))
    .bind(normalize_handle(&account.handle))
    .bind(&account.x_user_id)
    .bind(&account.display_name)
    .bind(account.verified)
    .bind(&account.avatar_url)
    .bind(account.account_created_at)
    .bind(account.last_fetched_at)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Look up an account by handle. The handle is normalised first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_account_by_handle(
    pool: &PgPool,
    handle: &str,
) -> Result<Option<AccountRow>, DbError> {
    let row = sqlx::query_as::<_, AccountRow>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE handle = $1"
    ))
    .bind(normalize_handle(handle))
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Look up an account by the provider-assigned user ID.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_account_by_x_user_id(
    pool: &PgPool,
    x_user_id: &str,
) -> Result<Option<AccountRow>, DbError> {
    let row = sqlx::query_as::<_, AccountRow>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE x_user_id = $1 \
         ORDER BY updated_at DESC LIMIT 1"
    ))
    .bind(x_user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Distinct provider IDs of every account referenced by at least one agent.
///
/// This is the ingestion polling universe, ordered by handle so a pass
/// visits accounts in a stable order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_tracked_account_ids(pool: &PgPool) -> Result<Vec<String>, DbError> {
    let ids = sqlx::query_scalar::<_, String>(
        "SELECT a.x_user_id \
         FROM accounts a \
         WHERE EXISTS ( \
             SELECT 1 FROM agent_accounts aa WHERE aa.account_handle = a.handle \
         ) \
         GROUP BY a.x_user_id \
         ORDER BY MIN(a.handle)",
    )
    .fetch_all(pool)
    .await?;

    Ok(ids)
}

/// Record that an account's posts were fetched just now.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn mark_account_fetched(pool: &PgPool, handle: &str) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE accounts SET last_fetched_at = NOW(), updated_at = NOW() WHERE handle = $1",
    )
    .bind(normalize_handle(handle))
    .execute(pool)
    .await?;

    Ok(())
}
