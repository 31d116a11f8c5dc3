use axum::{
    extract::{Query, State},
    Extension, Json,
};
use callsheet_core::TrackedAccount;
use callsheet_ingest::IngestError;
use serde::Deserialize;

use crate::middleware::RequestId;

use super::{map_db_error, required, ApiError, ApiResponse, AppState, ErrorCode};

#[derive(Debug, Deserialize)]
pub(super) struct SearchQuery {
    pub handle: Option<String>,
}

/// GET /api/v1/influencers/search?handle=: the stored account, or look it up
/// on the provider and start tracking it.
pub(super) async fn search_influencer(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<ApiResponse<TrackedAccount>>, ApiError> {
    let rid = &req_id.0;
    let handle = required(rid, "handle", query.handle.as_deref().unwrap_or(""))?;

    match callsheet_ingest::search_account(&state.pool, &state.social, handle).await {
        Ok(Some(account)) => Ok(Json(ApiResponse::new(req_id.0.clone(), account))),
        Ok(None) => Err(ApiError::new(
            rid,
            ErrorCode::NotFound,
            format!("no account found for handle '{handle}'"),
        )),
        Err(IngestError::Store(e)) => Err(map_db_error(rid, &e)),
        Err(e) => {
            tracing::error!(handle, error = %e, "api: account lookup failed");
            Err(ApiError::new(rid, ErrorCode::InternalError, "account lookup failed"))
        }
    }
}
