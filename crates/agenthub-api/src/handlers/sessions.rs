use agenthub_store::queries;
use agenthub_types::{ChannelKey, Session};
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
pub struct CreateSessionBody {
    pub session_id: String,
    pub project_id: Option<String>,
    /// Project path shortcut: upserts the project when no id is given
    pub project_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub project_id: Option<String>,
    pub active: Option<bool>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PatchSessionBody {
    /// true ends the session (idempotent)
    pub ended: Option<bool>,
    /// "success" or "error": bumps the tool counters
    pub tool_result: Option<String>,
}

/// POST /api/sessions — the id comes from the start hook; re-creating an
/// existing id is a conflict.
pub async fn create(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<CreateSessionBody>,
) -> ApiResult<(StatusCode, Json<Session>)> {
    if body.session_id.trim().is_empty() {
        return Err(ApiError::invalid_field("session_id", "is required"));
    }
    let project_id = body
        .project_id
        .as_deref()
        .map(|raw| parse_id(raw, "project_id"))
        .transpose()?;

    let session = state
        .db
        .with_conn(state.deadline, move |conn| {
            let now = Utc::now();
            let project_id = match (project_id, body.project_path.as_deref()) {
                (Some(id), _) => Some(id),
                (None, Some(path)) => {
                    Some(queries::project::upsert_by_path(conn, path, None, None, now)?.id)
                }
                (None, None) => None,
            };
            if !queries::session::insert(conn, &body.session_id, project_id.as_ref(), now)? {
                return Ok(None);
            }
            queries::session::get(conn, &body.session_id)
        })
        .await?
        .ok_or_else(|| ApiError::Conflict("session id already exists".into()))?;

    notify::emit(
        &state,
        ChannelKey::session(&session.id).to_string(),
        "session.started",
        &session,
    );
    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /api/sessions
pub async fn list(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<Session>>> {
    let project_id = params
        .project_id
        .as_deref()
        .map(|raw| parse_id(raw, "project_id"))
        .transpose()?;
    let active_only = params.active.unwrap_or(false);
    let limit = params.limit.unwrap_or(100).min(1000);

    let sessions = state
        .db
        .with_conn(state.deadline, move |conn| {
            queries::session::list(conn, project_id.as_ref(), active_only, limit)
        })
        .await?;
    Ok(Json(sessions))
}

/// GET /api/sessions/{id}
pub async fn get(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Session>> {
    let session = state
        .db
        .with_conn(state.deadline, move |conn| queries::session::get(conn, &id))
        .await?
        .ok_or_else(|| ApiError::not_found("session"))?;
    Ok(Json(session))
}

/// PATCH /api/sessions/{id}
pub async fn patch(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Json(body): Json<PatchSessionBody>,
) -> ApiResult<Json<Session>> {
    let tool_success = match body.tool_result.as_deref() {
        None => None,
        Some("success") => Some(true),
        Some("error") => Some(false),
        Some(other) => {
            return Err(ApiError::invalid_field(
                "tool_result",
                format!("expected success or error, got {}", other),
            ));
        }
    };

    let session = state
        .db
        .with_conn(state.deadline, move |conn| {
            if queries::session::get(conn, &id)?.is_none() {
                return Ok(None);
            }
            if let Some(success) = tool_success {
                queries::session::record_tool(conn, &id, success)?;
            }
            if body.ended == Some(true) {
                queries::session::end(conn, &id, Utc::now())?;
            }
            queries::session::get(conn, &id)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("session"))?;

    let event = if session.is_active() {
        "session.updated"
    } else {
        "session.ended"
    };
    notify::emit(
        &state,
        ChannelKey::session(&session.id).to_string(),
        event,
        &session,
    );
    Ok(Json(session))
}

/// GET /api/sessions/stats
pub async fn stats(
    State(state): State<Arc<ApiState>>,
) -> ApiResult<Json<queries::session::SessionStats>> {
    let stats = state
        .db
        .with_conn(state.deadline, |conn| queries::session::stats(conn))
        .await?;
    Ok(Json(stats))
}

#[derive(Debug, Serialize)]
pub struct ActiveSession {
    #[serde(flatten)]
    pub session: Session,
    pub last_activity: chrono::DateTime<Utc>,
    /// No actions within the inactivity threshold
    pub inactive: bool,
}

/// GET /api/active-sessions — active sessions with their latest activity;
/// ones quiet past the threshold are flagged inactive.
pub async fn active(
    State(state): State<Arc<ApiState>>,
) -> ApiResult<Json<Vec<ActiveSession>>> {
    let rows = state
        .db
        .with_conn(state.deadline, |conn| {
            queries::session::active_with_last_activity(conn)
        })
        .await?;

    let threshold = chrono::Duration::minutes(state.inactive_minutes);
    let now = Utc::now();
    let sessions = rows
        .into_iter()
        .map(|(session, last_activity)| ActiveSession {
            inactive: now - last_activity > threshold,
            session,
            last_activity,
        })
        .collect();
    Ok(Json(sessions))
}
