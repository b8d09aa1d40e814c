use agenthub_store::queries;
use agenthub_types::{Blocking, ChannelKey};
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::extract::parse_id;
use crate::notify;
use crate::state::ApiState;

#[derive(Debug, Deserialize)]
pub struct BlockBody {
    pub blocker_id: String,
    pub blocked_id: String,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UnblockBody {
    pub blocker_id: String,
    pub blocked_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckParams {
    pub blocker: Option<String>,
    pub blocked: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AgentBlockings {
    pub agent_id: String,
    /// Rows where the agent is being held up
    pub blocked_by: Vec<Blocking>,
    /// Rows where the agent is holding others up
    pub blocking: Vec<Blocking>,
}

/// POST /api/blocking — a self-block is refused; an existing pair comes back
/// unchanged.
pub async fn block(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<BlockBody>,
) -> ApiResult<(StatusCode, Json<Blocking>)> {
    if body.blocker_id.trim().is_empty() {
        return Err(ApiError::invalid_field("blocker_id", "is required"));
    }
    if body.blocked_id.trim().is_empty() {
        return Err(ApiError::invalid_field("blocked_id", "is required"));
    }
    if body.blocker_id == body.blocked_id {
        return Err(ApiError::invalid_field(
            "blocked_id",
            "an agent cannot block itself",
        ));
    }

    let blocking = state
        .db
        .with_conn(state.deadline, move |conn| {
            queries::blocking::insert(
                conn,
                &body.blocker_id,
                &body.blocked_id,
                body.reason.as_deref(),
                Utc::now(),
            )
        })
        .await?;

    notify::emit(
        &state,
        ChannelKey::agent(&blocking.blocked_id).to_string(),
        "blocking.created",
        &blocking,
    );
    Ok((StatusCode::CREATED, Json(blocking)))
}

/// POST /api/unblock — business-level no-op when the pair is absent.
pub async fn unblock(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<UnblockBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let blocked_id = body.blocked_id.clone();
    let removed = state
        .db
        .with_conn(state.deadline, move |conn| {
            queries::blocking::remove_pair(conn, &body.blocker_id, &body.blocked_id)
        })
        .await?;

    if removed > 0 {
        notify::emit(
            &state,
            ChannelKey::agent(&blocked_id).to_string(),
            "blocking.removed",
            &serde_json::json!({ "blocked_id": blocked_id }),
        );
    }
    Ok(Json(serde_json::json!({ "removed": removed })))
}

/// GET /api/blocking/{agent-id}
pub async fn for_agent(
    State(state): State<Arc<ApiState>>,
    Path(agent_id): Path<String>,
) -> ApiResult<Json<AgentBlockings>> {
    let lookup = agent_id.clone();
    let (blocked_by, blocking) = state
        .db
        .with_conn(state.deadline, move |conn| {
            Ok((
                queries::blocking::active_for_blocked(conn, &lookup)?,
                queries::blocking::active_for_blocker(conn, &lookup)?,
            ))
        })
        .await?;
    Ok(Json(AgentBlockings {
        agent_id,
        blocked_by,
        blocking,
    }))
}

/// GET /api/blocking/check?blocker=…&blocked=… — with both set, checks the
/// pair; with only `blocked`, checks whether anyone blocks that agent.
pub async fn check(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<CheckParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let result = match (params.blocker, params.blocked) {
        (Some(blocker), Some(blocked)) => {
            state
                .db
                .with_conn(state.deadline, move |conn| {
                    queries::blocking::check(conn, &blocker, &blocked)
                })
                .await?
        }
        (None, Some(blocked)) => {
            state
                .db
                .with_conn(state.deadline, move |conn| {
                    queries::blocking::is_blocked(conn, &blocked)
                })
                .await?
        }
        _ => {
            return Err(ApiError::invalid_field("blocked", "is required"));
        }
    };
    Ok(Json(serde_json::json!({ "blocked": result })))
}

/// DELETE /api/blocking/{id}
pub async fn delete(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let blocking_id = parse_id(&id, "id")?;
    let deleted = state
        .db
        .with_conn(state.deadline, move |conn| {
            queries::blocking::delete_by_id(conn, &blocking_id)
        })
        .await?;
    if !deleted {
        return Err(ApiError::not_found("blocking"));
    }
    Ok(Json(serde_json::json!({ "deleted": true })))
}
