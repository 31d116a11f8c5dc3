//! Agent management: create-or-merge, update, delete, list by wallet.

use std::collections::HashMap;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    Extension, Json,
};
use callsheet_core::{AccountRef, TrackedAccount};
use callsheet_db::{AgentUpdate, AgentWithAccounts};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::posts::PostItem;
use super::{json_body, map_db_error, required, ApiError, ApiResponse, AppState};

/// Posts attached to each account in the agent listing.
const POSTS_PER_ACCOUNT: i64 = 5;

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CreateAgentRequest {
    #[serde(default)]
    pub wallet_address: String,
    #[serde(default)]
    pub agent_name: String,
    #[serde(default)]
    pub accounts: Vec<AccountRef>,
    #[serde(default)]
    pub categories: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct UpdateAgentRequest {
    #[serde(default, alias = "wallet")]
    pub wallet_address: String,
    #[serde(default)]
    pub agent_name: String,
    pub new_agent_name: Option<String>,
    #[serde(default)]
    pub add_accounts: Vec<AccountRef>,
    #[serde(default)]
    pub remove_accounts: Vec<String>,
    #[serde(default)]
    pub update_influences: Vec<AccountRef>,
    pub categories: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub(super) struct AgentQuery {
    pub wallet_address: Option<String>,
    pub agent_name: Option<String>,
}

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(super) struct AgentItem {
    id: i64,
    name: String,
    wallet_address: String,
    categories: Vec<String>,
    accounts: Vec<AgentAccountItem>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(super) struct AgentAccountItem {
    username: String,
    influence: f64,
    account: Option<TrackedAccount>,
    posts: Vec<PostItem>,
}

#[derive(Debug, Serialize)]
pub(super) struct AgentWriteResult {
    created: bool,
    agent: AgentItem,
}

impl AgentItem {
    fn bare(agent: AgentWithAccounts) -> Self {
        Self::with_details(agent, &HashMap::new(), &HashMap::new())
    }

    fn with_details(
        agent: AgentWithAccounts,
        accounts: &HashMap<String, TrackedAccount>,
        posts: &HashMap<String, Vec<PostItem>>,
    ) -> Self {
        let AgentWithAccounts { agent, accounts: refs } = agent;
        Self {
            id: agent.id,
            name: agent.name,
            wallet_address: agent.wallet_address,
            categories: agent.categories,
            accounts: refs
                .into_iter()
                .map(|r| AgentAccountItem {
                    account: accounts.get(&r.username).cloned(),
                    posts: posts.get(&r.username).cloned().unwrap_or_default(),
                    username: r.username,
                    influence: r.influence,
                })
                .collect(),
            created_at: agent.created_at,
            updated_at: agent.updated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

fn validate_refs(req_id: &str, field: &str, refs: &[AccountRef]) -> Result<(), ApiError> {
    for r in refs {
        r.validate()
            .map_err(|message| ApiError::validation(req_id, format!("{field}: {message}")))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/agents creates an agent or merges into the existing one.
pub(super) async fn create_agent(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    payload: Result<Json<CreateAgentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<AgentWriteResult>>), ApiError> {
    let rid = &req_id.0;
    let body = json_body(rid, payload)?;

    let wallet = required(rid, "walletAddress", &body.wallet_address)?;
    let name = required(rid, "agentName", &body.agent_name)?;
    validate_refs(rid, "accounts", &body.accounts)?;

    let outcome = callsheet_db::create_or_merge_agent(
        &state.pool,
        wallet,
        name,
        &body.accounts,
        &body.categories,
    )
    .await
    .map_err(|e| map_db_error(rid, &e))?;

    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    tracing::info!(
        wallet,
        agent = name,
        created = outcome.created,
        "api: agent saved"
    );

    Ok((
        status,
        Json(ApiResponse::new(
            req_id.0.clone(),
            AgentWriteResult {
                created: outcome.created,
                agent: AgentItem::bare(outcome.agent),
            },
        )),
    ))
}

/// PUT /api/v1/agents: partial update of an existing agent.
pub(super) async fn update_agent(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    payload: Result<Json<UpdateAgentRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<AgentItem>>, ApiError> {
    let rid = &req_id.0;
    let body = json_body(rid, payload)?;

    let wallet = required(rid, "walletAddress", &body.wallet_address)?.to_owned();
    let name = required(rid, "agentName", &body.agent_name)?.to_owned();
    if let Some(ref new_name) = body.new_agent_name {
        required(rid, "newAgentName", new_name)?;
    }
    validate_refs(rid, "addAccounts", &body.add_accounts)?;
    validate_refs(rid, "updateInfluences", &body.update_influences)?;

    let update = AgentUpdate {
        wallet_address: wallet,
        agent_name: name,
        new_agent_name: body.new_agent_name,
        add_accounts: body.add_accounts,
        remove_accounts: body.remove_accounts,
        update_influences: body.update_influences,
        categories: body.categories,
    };
    let agent = callsheet_db::update_agent(&state.pool, &update)
        .await
        .map_err(|e| map_db_error(rid, &e))?;

    Ok(Json(ApiResponse::new(req_id.0.clone(), AgentItem::bare(agent))))
}

/// DELETE /api/v1/agents?wallet_address=&agent_name=
pub(super) async fn delete_agent(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<AgentQuery>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let rid = &req_id.0;
    let wallet = required(rid, "wallet_address", query.wallet_address.as_deref().unwrap_or(""))?;
    let name = required(rid, "agent_name", query.agent_name.as_deref().unwrap_or(""))?;

    callsheet_db::delete_agent(&state.pool, wallet, name)
        .await
        .map_err(|e| map_db_error(rid, &e))?;

    Ok(Json(ApiResponse::new(
        req_id.0.clone(),
        serde_json::json!({ "deleted": true }),
    )))
}

/// GET /api/v1/agents?wallet_address=: agents with account details and
/// their latest stored posts.
pub(super) async fn list_agents(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<AgentQuery>,
) -> Result<Json<ApiResponse<Vec<AgentItem>>>, ApiError> {
    let rid = &req_id.0;
    let wallet = required(rid, "wallet_address", query.wallet_address.as_deref().unwrap_or(""))?;

    let agents = callsheet_db::list_agents_for_wallet(&state.pool, wallet)
        .await
        .map_err(|e| map_db_error(rid, &e))?;

    let mut handles: Vec<String> = agents
        .iter()
        .flat_map(|a| a.accounts.iter().map(|r| r.username.clone()))
        .collect();
    handles.sort();
    handles.dedup();

    let mut accounts = HashMap::new();
    for handle in &handles {
        if let Some(row) = callsheet_db::get_account_by_handle(&state.pool, handle)
            .await
            .map_err(|e| map_db_error(rid, &e))?
        {
            accounts.insert(handle.clone(), TrackedAccount::from(row));
        }
    }

    let mut posts: HashMap<String, Vec<PostItem>> = HashMap::new();
    for row in callsheet_db::list_posts_for_handles(&state.pool, &handles, POSTS_PER_ACCOUNT)
        .await
        .map_err(|e| map_db_error(rid, &e))?
    {
        posts
            .entry(row.account_handle.clone())
            .or_default()
            .push(PostItem::from(row));
    }

    let data = agents
        .into_iter()
        .map(|a| AgentItem::with_details(a, &accounts, &posts))
        .collect();

    Ok(Json(ApiResponse::new(req_id.0.clone(), data)))
}
