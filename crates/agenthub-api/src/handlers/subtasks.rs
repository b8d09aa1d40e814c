use agenthub_store::queries;
use agenthub_types::{ChannelKey, Subtask, SubtaskStatus};
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::extract::{parse_field_opt, parse_id};
use crate::notify;
use crate::state::ApiState;

#[derive(Debug, Deserialize)]
pub struct CreateSubtaskBody {
    pub task_list_id: String,
    pub agent_type: String,
    pub agent_name: Option<String>,
    pub description: String,
    pub depends_on: Option<Vec<String>>,
    pub context: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub task_list_id: Option<String>,
    pub status: Option<String>,
    pub agent_type: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PatchSubtaskBody {
    pub status: Option<String>,
    pub agent_name: Option<String>,
    pub description: Option<String>,
    pub context: Option<Value>,
    pub result: Option<Value>,
}

fn agent_channel(subtask: &Subtask) -> String {
    let agent = subtask
        .agent_name
        .as_deref()
        .unwrap_or(&subtask.agent_type);
    ChannelKey::agent(agent).to_string()
}

/// POST /api/subtasks
pub async fn create(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<CreateSubtaskBody>,
) -> ApiResult<(StatusCode, Json<Subtask>)> {
    let task_list_id = parse_id(&body.task_list_id, "task_list_id")?;
    if body.agent_type.trim().is_empty() {
        return Err(ApiError::invalid_field("agent_type", "is required"));
    }
    if body.description.trim().is_empty() {
        return Err(ApiError::invalid_field("description", "is required"));
    }
    let depends_on = body
        .depends_on
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|raw| parse_id(raw, "depends_on"))
        .collect::<Result<Vec<_>, _>>()?;

    let subtask = state
        .db
        .with_conn(state.deadline, move |conn| {
            if queries::task_list::get(conn, &task_list_id)?.is_none() {
                return Ok(None);
            }
            let subtask = queries::subtask::insert(
                conn,
                &queries::subtask::NewSubtask {
                    task_list_id: &task_list_id,
                    agent_type: &body.agent_type,
                    agent_name: body.agent_name.as_deref(),
                    description: &body.description,
                    depends_on: &depends_on,
                    context: body.context.as_ref(),
                },
                Utc::now(),
            )?;
            Ok(Some(subtask))
        })
        .await?
        .ok_or_else(|| ApiError::not_found("task list"))?;

    notify::emit(&state, agent_channel(&subtask), "subtask.created", &subtask);
    Ok((StatusCode::CREATED, Json(subtask)))
}

/// GET /api/subtasks
pub async fn list(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<Subtask>>> {
    let task_list_id = params
        .task_list_id
        .as_deref()
        .map(|raw| parse_id(raw, "task_list_id"))
        .transpose()?;
    let status: Option<SubtaskStatus> = parse_field_opt(params.status.as_deref(), "status")?;
    let limit = params.limit.unwrap_or(100).min(1000);

    let subtasks = state
        .db
        .with_conn(state.deadline, move |conn| {
            queries::subtask::list(
                conn,
                task_list_id.as_ref(),
                status,
                params.agent_type.as_deref(),
                limit,
            )
        })
        .await?;
    Ok(Json(subtasks))
}

/// GET /api/subtasks/{id}
pub async fn get(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Subtask>> {
    let subtask_id = parse_id(&id, "id")?;
    let subtask = state
        .db
        .with_conn(state.deadline, move |conn| {
            queries::subtask::get(conn, &subtask_id)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("subtask"))?;
    Ok(Json(subtask))
}

/// PATCH /api/subtasks/{id} — running stamps started_at once;
/// completed/failed stamps completed_at once.
pub async fn patch(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Json(body): Json<PatchSubtaskBody>,
) -> ApiResult<Json<Subtask>> {
    let subtask_id = parse_id(&id, "id")?;
    let status: Option<SubtaskStatus> = parse_field_opt(body.status.as_deref(), "status")?;

    let subtask = state
        .db
        .with_conn(state.deadline, move |conn| {
            queries::subtask::patch(
                conn,
                &subtask_id,
                &queries::subtask::SubtaskPatch {
                    status,
                    agent_name: body.agent_name.as_deref(),
                    description: body.description.as_deref(),
                    context: body.context.as_ref(),
                    result: body.result.as_ref(),
                },
                Utc::now(),
            )
        })
        .await?
        .ok_or_else(|| ApiError::not_found("subtask"))?;

    let event = if subtask.status.is_terminal() {
        "subtask.completed"
    } else {
        "subtask.updated"
    };
    notify::emit(&state, agent_channel(&subtask), event, &subtask);
    Ok(Json(subtask))
}
