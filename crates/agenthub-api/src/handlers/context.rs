use agenthub_brief::{BriefQuery, compact};
use agenthub_store::queries;
use agenthub_types::{AgentContext, ChannelKey, CompactTrigger};
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::extract::{parse_field, require};
use crate::notify;
use crate::state::ApiState;

#[derive(Debug, Deserialize)]
pub struct GenerateBody {
    pub agent_id: String,
    pub session_id: String,
    pub agent_type: Option<String>,
    pub max_tokens: Option<usize>,
    pub include_messages: Option<bool>,
    pub include_actions: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CompactSaveBody {
    pub session_id: String,
    pub trigger: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompactRestoreBody {
    pub session_id: String,
    pub agent_id: String,
    pub agent_type: Option<String>,
    pub max_tokens: Option<usize>,
}

/// GET /api/context/{agent-id} — the agent's most recent persisted context.
pub async fn get(
    State(state): State<Arc<ApiState>>,
    Path(agent_id): Path<String>,
) -> ApiResult<Json<AgentContext>> {
    let context = state
        .db
        .with_conn(state.deadline, move |conn| {
            queries::context::latest_for_agent(conn, &agent_id)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("agent context"))?;
    Ok(Json(context))
}

/// POST /api/context/generate — on-demand brief for an agent.
pub async fn generate(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<GenerateBody>,
) -> ApiResult<Json<agenthub_brief::Brief>> {
    if body.agent_id.trim().is_empty() {
        return Err(ApiError::invalid_field("agent_id", "is required"));
    }
    if body.session_id.trim().is_empty() {
        return Err(ApiError::invalid_field("session_id", "is required"));
    }
    if body.max_tokens == Some(0) {
        return Err(ApiError::invalid_field("max_tokens", "must be positive"));
    }

    let agent_type = body
        .agent_type
        .clone()
        .unwrap_or_else(|| "specialist".to_string());
    let mut query = BriefQuery::new(&body.agent_id, &body.session_id, agent_type);
    if let Some(max) = body.max_tokens {
        query.max_tokens = max;
    }
    if let Some(messages) = body.include_messages {
        query.include_messages = messages;
    }
    if let Some(actions) = body.include_actions {
        query.include_actions = actions;
    }

    let brief = agenthub_brief::generate(&state.db, &query).await?;
    Ok(Json(brief))
}

/// POST /api/compact/save
pub async fn compact_save(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<CompactSaveBody>,
) -> ApiResult<(StatusCode, Json<compact::SnapshotSummary>)> {
    let session_id = require(
        Some(body.session_id.clone()).filter(|s| !s.trim().is_empty()),
        "session_id",
    )?;
    let trigger: CompactTrigger = match body.trigger.as_deref() {
        Some(raw) => parse_field(raw, "trigger")?,
        None => CompactTrigger::Manual,
    };

    let summary = compact::save(&state.db, &session_id, trigger).await?;

    notify::emit(
        &state,
        ChannelKey::session(&session_id).to_string(),
        "compact.saved",
        &summary,
    );
    Ok((StatusCode::CREATED, Json(summary)))
}

/// POST /api/compact/restore — brief regenerated from live state plus the
/// latest snapshot.
pub async fn compact_restore(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<CompactRestoreBody>,
) -> ApiResult<Json<agenthub_brief::Brief>> {
    if body.session_id.trim().is_empty() {
        return Err(ApiError::invalid_field("session_id", "is required"));
    }
    if body.agent_id.trim().is_empty() {
        return Err(ApiError::invalid_field("agent_id", "is required"));
    }
    if body.max_tokens == Some(0) {
        return Err(ApiError::invalid_field("max_tokens", "must be positive"));
    }
    let agent_type = body
        .agent_type
        .clone()
        .unwrap_or_else(|| body.agent_id.clone());

    let brief = compact::restore(
        &state.db,
        &body.session_id,
        &body.agent_id,
        &agent_type,
        body.max_tokens,
    )
    .await?;

    notify::emit(
        &state,
        ChannelKey::session(&body.session_id).to_string(),
        "compact.restored",
        &json!({
            "session_id": body.session_id,
            "agent_id": body.agent_id,
            "estimated_tokens": brief.estimated_tokens,
        }),
    );
    Ok(Json(brief))
}

/// GET /api/compact/status/{session-id}
pub async fn compact_status(
    State(state): State<Arc<ApiState>>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<compact::SnapshotStatus>> {
    let status = compact::status(&state.db, &session_id).await?;
    Ok(Json(status))
}

/// GET /api/compact/snapshot/{session-id} — the raw snapshot row.
pub async fn compact_snapshot(
    State(state): State<Arc<ApiState>>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<AgentContext>> {
    let snapshot = state
        .db
        .with_conn(state.deadline, move |conn| {
            queries::context::latest_snapshot(conn, &session_id)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("compact snapshot"))?;
    Ok(Json(snapshot))
}
