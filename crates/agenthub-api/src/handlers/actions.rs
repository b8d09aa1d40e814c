use agenthub_store::queries;
use agenthub_types::{ActionRecord, ChannelKey, ToolType};
use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::extract::{parse_field, parse_field_opt, parse_id};
use crate::notify;
use crate::state::ApiState;

#[derive(Debug, Deserialize)]
pub struct CreateActionBody {
    pub tool_name: String,
    pub tool_type: String,
    pub subtask_id: Option<String>,
    /// Session whose tool counters this action bumps
    pub session_id: Option<String>,
    pub input: Option<String>,
    pub output: Option<String>,
    pub file_paths: Option<Vec<String>>,
    pub exit_code: Option<i64>,
    pub duration_ms: Option<i64>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub subtask_id: Option<String>,
    pub tool_type: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct HourlyParams {
    pub hours: Option<i64>,
}

/// POST /api/actions — always accepted when tool name and kind are valid;
/// blobs are stored compressed; the owning session's counters move in the
/// same transaction.
pub async fn create(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<CreateActionBody>,
) -> ApiResult<(StatusCode, Json<ActionRecord>)> {
    if body.tool_name.trim().is_empty() {
        return Err(ApiError::invalid_field("tool_name", "is required"));
    }
    let tool_type: ToolType = parse_field(&body.tool_type, "tool_type")?;
    let subtask_id = body
        .subtask_id
        .as_deref()
        .map(|raw| parse_id(raw, "subtask_id"))
        .transpose()?;

    let action = state
        .db
        .with_conn(state.deadline, move |conn| {
            let tx = conn.transaction()?;
            let action = queries::action::insert(
                &tx,
                &queries::action::NewAction {
                    subtask_id: subtask_id.as_ref(),
                    tool_name: &body.tool_name,
                    tool_type,
                    input: body.input.as_deref(),
                    output: body.output.as_deref(),
                    file_paths: body.file_paths.as_deref().unwrap_or_default(),
                    exit_code: body.exit_code.unwrap_or(0),
                    duration_ms: body.duration_ms.unwrap_or(0),
                    metadata: body.metadata.as_ref(),
                },
                Utc::now(),
            )?;
            if let Some(session_id) = body.session_id.as_deref() {
                queries::session::record_tool(&tx, session_id, action.is_success())?;
            }
            tx.commit()?;
            Ok(action)
        })
        .await?;

    // blob payloads can be big; the envelope carries a trimmed view
    let envelope = serde_json::json!({
        "id": action.id,
        "tool_name": action.tool_name,
        "tool_type": action.tool_type,
        "exit_code": action.exit_code,
        "duration_ms": action.duration_ms,
        "file_paths": action.file_paths,
        "subtask_id": action.subtask_id,
    });
    notify::emit(&state, ChannelKey::Global.to_string(), "action.recorded", &envelope);
    Ok((StatusCode::CREATED, Json(action)))
}

/// GET /api/actions
pub async fn list(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<ActionRecord>>> {
    let subtask_id = params
        .subtask_id
        .as_deref()
        .map(|raw| parse_id(raw, "subtask_id"))
        .transpose()?;
    let tool_type: Option<ToolType> = parse_field_opt(params.tool_type.as_deref(), "tool_type")?;
    let limit = params.limit.unwrap_or(50).min(500);

    let actions = state
        .db
        .with_conn(state.deadline, move |conn| {
            queries::action::list(conn, subtask_id.as_ref(), tool_type, limit)
        })
        .await?;
    Ok(Json(actions))
}

/// GET /api/actions/hourly
pub async fn hourly(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<HourlyParams>,
) -> ApiResult<Json<Vec<queries::action::HourlyBucket>>> {
    let hours = params.hours.unwrap_or(24).clamp(1, 24 * 7);
    let since = Utc::now() - Duration::hours(hours);
    let buckets = state
        .db
        .with_conn(state.deadline, move |conn| {
            queries::action::hourly(conn, since)
        })
        .await?;
    Ok(Json(buckets))
}
