use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Serialize;

use crate::middleware::RequestId;

use super::{ApiError, ApiResponse, AppState, ErrorCode};

#[derive(Debug, Serialize)]
pub(super) struct JobStarted {
    job: &'static str,
    status: &'static str,
}

/// POST /api/v1/jobs/{name}: start `ingest` or `aggregate` in the background.
pub(super) async fn trigger_job(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(name): Path<String>,
) -> Result<(StatusCode, Json<ApiResponse<JobStarted>>), ApiError> {
    let rid = &req_id.0;
    let Some(job) = state.jobs.by_name(&name) else {
        return Err(ApiError::new(
            rid,
            ErrorCode::NotFound,
            format!("unknown job '{name}'"),
        ));
    };

    if !job.trigger() {
        return Err(ApiError::new(
            rid,
            ErrorCode::Conflict,
            format!("job '{}' is already running", job.name),
        ));
    }

    tracing::info!(job = job.name, "api: job triggered");
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::new(
            req_id.0.clone(),
            JobStarted {
                job: job.name,
                status: "started",
            },
        )),
    ))
}
