use agenthub_store::queries;
use agenthub_types::Project;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::extract::parse_id;
use crate::notify;
use crate::state::ApiState;

#[derive(Debug, Deserialize)]
pub struct CreateProjectBody {
    pub path: String,
    pub name: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ByPathParams {
    pub path: String,
}

/// POST /api/projects — upsert by path; the canonical row comes back whether
/// it was just created or already existed.
pub async fn create(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<CreateProjectBody>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    if body.path.trim().is_empty() {
        return Err(ApiError::invalid_field("path", "is required"));
    }

    let project = state
        .db
        .with_conn(state.deadline, move |conn| {
            queries::project::upsert_by_path(
                conn,
                &body.path,
                body.name.as_deref(),
                body.metadata.as_ref(),
                Utc::now(),
            )
        })
        .await?;

    notify::emit(&state, "global", "project.created", &project);
    Ok((StatusCode::CREATED, Json(project)))
}

/// GET /api/projects
pub async fn list(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<Project>>> {
    let limit = params.limit.unwrap_or(100).min(1000);
    let projects = state
        .db
        .with_conn(state.deadline, move |conn| queries::project::list(conn, limit))
        .await?;
    Ok(Json(projects))
}

/// GET /api/projects/{id}
pub async fn get(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let project_id = parse_id(&id, "id")?;
    let (project, requests) = state
        .db
        .with_conn(state.deadline, move |conn| {
            let Some(project) = queries::project::get(conn, &project_id)? else {
                return Ok(None);
            };
            let requests = queries::request::list_for_project(conn, &project_id)?;
            Ok(Some((project, requests)))
        })
        .await?
        .ok_or_else(|| ApiError::not_found("project"))?;

    let mut body = serde_json::to_value(&project).unwrap_or(Value::Null);
    body["requests"] = serde_json::to_value(&requests).unwrap_or(Value::Null);
    Ok(Json(body))
}

/// GET /api/projects/by-path?path=…
pub async fn by_path(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<ByPathParams>,
) -> ApiResult<Json<Project>> {
    let project = state
        .db
        .with_conn(state.deadline, move |conn| {
            queries::project::get_by_path(conn, &params.path)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("project"))?;
    Ok(Json(project))
}
