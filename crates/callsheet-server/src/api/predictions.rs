use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct CombinedQuery {
    pub wallet_address: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct CombinedPredictionItem {
    id: i64,
    agent_id: i64,
    agent_name: String,
    wallet_address: String,
    token: String,
    predicted_price: Option<f64>,
    currency: Option<String>,
    direction: Option<String>,
    confidence: f64,
    reasoning: String,
    supporting_influencers: serde_json::Value,
    created_at: DateTime<Utc>,
}

/// GET /api/v1/predictions/combined?wallet_address=&limit=
pub(super) async fn list_combined_predictions(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<CombinedQuery>,
) -> Result<Json<ApiResponse<Vec<CombinedPredictionItem>>>, ApiError> {
    let wallet = query
        .wallet_address
        .as_deref()
        .map(str::trim)
        .filter(|w| !w.is_empty());

    let rows =
        callsheet_db::list_combined_predictions(&state.pool, wallet, normalize_limit(query.limit))
            .await
            .map_err(|e| map_db_error(&req_id.0, &e))?;

    let data = rows
        .into_iter()
        .map(|row| CombinedPredictionItem {
            id: row.id,
            agent_id: row.agent_id,
            agent_name: row.agent_name,
            wallet_address: row.wallet_address,
            token: row.token,
            predicted_price: row.predicted_price,
            currency: row.currency,
            direction: row.direction,
            confidence: row.confidence,
            reasoning: row.reasoning,
            supporting_influencers: row.supporting_influencers,
            created_at: row.created_at,
        })
        .collect();

    Ok(Json(ApiResponse::new(req_id.0, data)))
}
