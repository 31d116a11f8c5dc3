use axum::{
    extract::{Query, State},
    Extension, Json,
};
use callsheet_core::ExtractionResult;
use callsheet_db::PostRow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct PostsQuery {
    pub account: Option<String>,
    #[serde(default)]
    pub predictions_only: bool,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub(super) struct PostItem {
    account_handle: String,
    post_id: String,
    text: String,
    media_urls: Vec<String>,
    created_at: DateTime<Utc>,
    is_prediction: bool,
    extraction: Option<ExtractionResult>,
    stored_at: DateTime<Utc>,
}

impl From<PostRow> for PostItem {
    fn from(row: PostRow) -> Self {
        Self {
            extraction: row.extraction_result(),
            account_handle: row.account_handle,
            post_id: row.post_id,
            text: row.text,
            media_urls: row.media_urls,
            created_at: row.created_at,
            is_prediction: row.is_prediction,
            stored_at: row.stored_at,
        }
    }
}

/// GET /api/v1/posts?account=&predictions_only=&limit=
pub(super) async fn list_posts(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<PostsQuery>,
) -> Result<Json<ApiResponse<Vec<PostItem>>>, ApiError> {
    let account = query
        .account
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty());

    let rows = callsheet_db::list_posts(
        &state.pool,
        account,
        query.predictions_only,
        normalize_limit(query.limit),
    )
    .await
    .map_err(|e| map_db_error(&req_id.0, &e))?;

    let data = rows.into_iter().map(PostItem::from).collect();
    Ok(Json(ApiResponse::new(req_id.0, data)))
}
