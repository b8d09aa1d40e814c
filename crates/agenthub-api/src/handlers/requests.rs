use agenthub_store::queries;
use agenthub_types::{ChannelKey, Request, RequestStatus};
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::extract::{parse_field, parse_field_opt, parse_id};
use crate::notify;
use crate::state::ApiState;

#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    pub project_id: String,
    pub session_id: String,
    pub prompt: String,
    pub prompt_type: String,
    pub metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub project_id: Option<String>,
    pub session_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PatchRequestBody {
    pub status: Option<String>,
    pub metadata: Option<Value>,
}

/// POST /api/requests
pub async fn create(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<CreateRequestBody>,
) -> ApiResult<(StatusCode, Json<Request>)> {
    let project_id = parse_id(&body.project_id, "project_id")?;
    let prompt_type = parse_field(&body.prompt_type, "prompt_type")?;
    if body.prompt.trim().is_empty() {
        return Err(ApiError::invalid_field("prompt", "is required"));
    }
    if body.session_id.trim().is_empty() {
        return Err(ApiError::invalid_field("session_id", "is required"));
    }

    let request = state
        .db
        .with_conn(state.deadline, move |conn| {
            if queries::project::get(conn, &project_id)?.is_none() {
                return Ok(None);
            }
            let request = queries::request::insert(
                conn,
                &queries::request::NewRequest {
                    project_id: &project_id,
                    session_id: &body.session_id,
                    prompt: &body.prompt,
                    prompt_type,
                    metadata: body.metadata.as_ref(),
                },
                Utc::now(),
            )?;
            Ok(Some(request))
        })
        .await?
        .ok_or_else(|| ApiError::not_found("project"))?;

    notify::emit(
        &state,
        ChannelKey::session(&request.session_id).to_string(),
        "request.created",
        &request,
    );
    Ok((StatusCode::CREATED, Json(request)))
}

/// GET /api/requests
pub async fn list(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<Request>>> {
    let project_id = params
        .project_id
        .as_deref()
        .map(|raw| parse_id(raw, "project_id"))
        .transpose()?;
    let status: Option<RequestStatus> = parse_field_opt(params.status.as_deref(), "status")?;
    let limit = params.limit.unwrap_or(100).min(1000);

    let requests = state
        .db
        .with_conn(state.deadline, move |conn| {
            queries::request::list(
                conn,
                project_id.as_ref(),
                params.session_id.as_deref(),
                status,
                limit,
            )
        })
        .await?;
    Ok(Json(requests))
}

/// GET /api/requests/{id}
pub async fn get(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Request>> {
    let request_id = parse_id(&id, "id")?;
    let request = state
        .db
        .with_conn(state.deadline, move |conn| {
            queries::request::get(conn, &request_id)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("request"))?;
    Ok(Json(request))
}

/// PATCH /api/requests/{id} — completing is idempotent on the transition
/// edge; completed_at never moves after the first call.
pub async fn patch(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Json(body): Json<PatchRequestBody>,
) -> ApiResult<Json<Request>> {
    let request_id = parse_id(&id, "id")?;
    let status: Option<RequestStatus> = parse_field_opt(body.status.as_deref(), "status")?;

    let request = state
        .db
        .with_conn(state.deadline, move |conn| {
            if queries::request::get(conn, &request_id)?.is_none() {
                return Ok(None);
            }
            if let Some(metadata) = &body.metadata {
                if let Some(map) = metadata.as_object() {
                    for (key, value) in map {
                        queries::request::set_metadata_key(conn, &request_id, key, value)?;
                    }
                }
            }
            match status {
                Some(RequestStatus::Completed) => {
                    queries::request::complete(conn, &request_id, Utc::now())
                }
                _ => queries::request::get(conn, &request_id),
            }
        })
        .await?
        .ok_or_else(|| ApiError::not_found("request"))?;

    let event = if request.status == RequestStatus::Completed {
        "request.completed"
    } else {
        "request.updated"
    };
    notify::emit(
        &state,
        ChannelKey::session(&request.session_id).to_string(),
        event,
        &request,
    );
    Ok(Json(request))
}
