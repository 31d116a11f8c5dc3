//! Account search: the local table first, then the social provider.

use callsheet_core::{normalize_handle, TrackedAccount};
use callsheet_social::XClient;
use chrono::Utc;
use sqlx::PgPool;

use crate::error::IngestError;

/// Find an account by handle, tracking it locally on first sight.
///
/// Returns `Ok(None)` when the handle is blank or the provider does not know
/// it.
///
/// # Errors
///
/// Returns [`IngestError::Store`] on database failure or
/// [`IngestError::Social`] if the provider lookup fails.
pub async fn search_account(
    pool: &PgPool,
    social: &XClient,
    raw_handle: &str,
) -> Result<Option<TrackedAccount>, IngestError> {
    let handle = normalize_handle(raw_handle);
    if handle.is_empty() {
        return Ok(None);
    }

    if let Some(row) = callsheet_db::get_account_by_handle(pool, &handle).await? {
        return Ok(Some(row.into()));
    }

    let Some(user) = social.lookup_user(&handle).await? else {
        tracing::info!(handle = %handle, "ingest: account not found on provider");
        return Ok(None);
    };

    let row = callsheet_db::upsert_account(pool, &user.into_tracked_account(Utc::now())).await?;
    tracing::info!(handle = %row.handle, x_user_id = %row.x_user_id, "ingest: now tracking account");
    Ok(Some(row.into()))
}
