use agenthub_store::queries;
use agenthub_types::{Project, Request, Subtask, TaskList};
use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::extract::parse_id;
use crate::state::ApiState;

#[derive(Debug, Deserialize)]
pub struct HierarchyParams {
    /// Default is flat arrays plus foreign keys; `nested=true` builds the
    /// ownership tree
    pub nested: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct FlatHierarchy {
    pub project: Project,
    pub requests: Vec<Request>,
    pub task_lists: Vec<TaskList>,
    pub subtasks: Vec<Subtask>,
}

/// GET /api/hierarchy/{project-id}
pub async fn hierarchy(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Query(params): Query<HierarchyParams>,
) -> ApiResult<Json<Value>> {
    let project_id = parse_id(&id, "id")?;

    let flat = state
        .db
        .with_conn(state.deadline, move |conn| {
            let Some(project) = queries::project::get(conn, &project_id)? else {
                return Ok(None);
            };
            Ok(Some(FlatHierarchy {
                project,
                requests: queries::request::list_for_project(conn, &project_id)?,
                task_lists: queries::task_list::list_for_project(conn, &project_id)?,
                subtasks: queries::subtask::list_for_project(conn, &project_id)?,
            }))
        })
        .await?
        .ok_or_else(|| ApiError::not_found("project"))?;

    if params.nested.unwrap_or(false) {
        Ok(Json(nest(flat)))
    } else {
        Ok(Json(serde_json::to_value(&flat).unwrap_or(Value::Null)))
    }
}

fn nest(flat: FlatHierarchy) -> Value {
    let requests: Vec<Value> = flat
        .requests
        .iter()
        .map(|request| {
            let task_lists: Vec<Value> = flat
                .task_lists
                .iter()
                .filter(|tl| tl.request_id == request.id)
                .map(|tl| {
                    let subtasks: Vec<&Subtask> = flat
                        .subtasks
                        .iter()
                        .filter(|st| st.task_list_id == tl.id)
                        .collect();
                    let mut value = serde_json::to_value(tl).unwrap_or(Value::Null);
                    value["subtasks"] = serde_json::to_value(&subtasks).unwrap_or(Value::Null);
                    value
                })
                .collect();
            let mut value = serde_json::to_value(request).unwrap_or(Value::Null);
            value["task_lists"] = Value::Array(task_lists);
            value
        })
        .collect();

    let mut value = serde_json::to_value(&flat.project).unwrap_or(Value::Null);
    value["requests"] = Value::Array(requests);
    json!({ "project": value })
}
