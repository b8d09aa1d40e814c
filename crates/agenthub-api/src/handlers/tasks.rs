use agenthub_store::queries;
use agenthub_types::{ChannelKey, TaskList, TaskListStatus};
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::extract::{parse_field_opt, parse_id};
use crate::notify;
use crate::state::ApiState;

#[derive(Debug, Deserialize)]
pub struct CreateTaskBody {
    pub request_id: String,
    pub name: String,
    pub wave_number: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub request_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PatchTaskBody {
    pub name: Option<String>,
    pub status: Option<String>,
}

/// POST /api/tasks — wave number auto-assigns max+1 under the request when
/// absent.
pub async fn create(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<CreateTaskBody>,
) -> ApiResult<(StatusCode, Json<TaskList>)> {
    let request_id = parse_id(&body.request_id, "request_id")?;
    if body.name.trim().is_empty() {
        return Err(ApiError::invalid_field("name", "is required"));
    }
    if body.wave_number.is_some_and(|w| w < 0) {
        return Err(ApiError::invalid_field("wave_number", "must not be negative"));
    }

    let (task, session_id) = state
        .db
        .with_conn(state.deadline, move |conn| {
            let Some(request) = queries::request::get(conn, &request_id)? else {
                return Ok(None);
            };
            let task =
                queries::task_list::insert(conn, &request_id, &body.name, body.wave_number, Utc::now())?;
            Ok(Some((task, request.session_id)))
        })
        .await?
        .ok_or_else(|| ApiError::not_found("request"))?;

    notify::emit(
        &state,
        ChannelKey::session(&session_id).to_string(),
        "task.created",
        &task,
    );
    Ok((StatusCode::CREATED, Json(task)))
}

/// GET /api/tasks
pub async fn list(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<TaskList>>> {
    let request_id = params
        .request_id
        .as_deref()
        .map(|raw| parse_id(raw, "request_id"))
        .transpose()?;
    let status: Option<TaskListStatus> = parse_field_opt(params.status.as_deref(), "status")?;
    let limit = params.limit.unwrap_or(100).min(1000);

    let tasks = state
        .db
        .with_conn(state.deadline, move |conn| {
            queries::task_list::list(conn, request_id.as_ref(), status, limit)
        })
        .await?;
    Ok(Json(tasks))
}

/// GET /api/tasks/{id}
pub async fn get(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<TaskList>> {
    let task_id = parse_id(&id, "id")?;
    let task = state
        .db
        .with_conn(state.deadline, move |conn| {
            queries::task_list::get(conn, &task_id)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("task list"))?;
    Ok(Json(task))
}

/// PATCH /api/tasks/{id}
pub async fn patch(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Json(body): Json<PatchTaskBody>,
) -> ApiResult<Json<TaskList>> {
    let task_id = parse_id(&id, "id")?;
    let status: Option<TaskListStatus> = parse_field_opt(body.status.as_deref(), "status")?;

    let (task, session_id) = state
        .db
        .with_conn(state.deadline, move |conn| {
            let Some(task) = queries::task_list::patch(
                conn,
                &task_id,
                &queries::task_list::TaskListPatch {
                    name: body.name.as_deref(),
                    status,
                },
                Utc::now(),
            )?
            else {
                return Ok(None);
            };
            let session_id = queries::request::get(conn, &task.request_id)?
                .map(|r| r.session_id);
            Ok(Some((task, session_id)))
        })
        .await?
        .ok_or_else(|| ApiError::not_found("task list"))?;

    let event = if task.status == TaskListStatus::Completed {
        "task.completed"
    } else {
        "task.updated"
    };
    let channel = match session_id {
        Some(session) => ChannelKey::session(session).to_string(),
        None => ChannelKey::Global.to_string(),
    };
    notify::emit(&state, channel, event, &task);
    Ok(Json(task))
}
