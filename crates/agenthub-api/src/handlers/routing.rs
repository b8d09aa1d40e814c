use agenthub_store::queries;
use agenthub_types::{ChannelKey, ToolScore, ToolType};
use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::extract::{parse_field, parse_field_opt};
use crate::notify;
use crate::state::ApiState;

#[derive(Debug, Deserialize)]
pub struct SuggestParams {
    /// Comma-separated keywords
    pub keywords: String,
    pub tool_type: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackBody {
    pub keyword: String,
    pub tool_name: String,
    pub tool_type: String,
    /// Score delta, clamped per event
    pub delta: f64,
    pub success: Option<bool>,
}

/// GET /api/routing/suggest?keywords=csv[&tool_type=…]
pub async fn suggest(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<SuggestParams>,
) -> ApiResult<Json<Vec<queries::routing::Suggestion>>> {
    let keywords: Vec<String> = params
        .keywords
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect();
    if keywords.is_empty() {
        return Err(ApiError::invalid_field("keywords", "is required"));
    }
    let tool_type: Option<ToolType> = parse_field_opt(params.tool_type.as_deref(), "tool_type")?;
    let limit = params.limit.unwrap_or(10).min(50);

    let suggestions = state
        .db
        .with_conn(state.deadline, move |conn| {
            queries::routing::suggest(conn, &keywords, tool_type, limit)
        })
        .await?;
    Ok(Json(suggestions))
}

/// GET /api/routing/stats
pub async fn stats(
    State(state): State<Arc<ApiState>>,
) -> ApiResult<Json<queries::routing::RoutingStats>> {
    let stats = state
        .db
        .with_conn(state.deadline, |conn| queries::routing::stats(conn, 20))
        .await?;
    Ok(Json(stats))
}

/// POST /api/routing/feedback
pub async fn feedback(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<FeedbackBody>,
) -> ApiResult<(StatusCode, Json<ToolScore>)> {
    if body.keyword.trim().is_empty() {
        return Err(ApiError::invalid_field("keyword", "is required"));
    }
    if body.tool_name.trim().is_empty() {
        return Err(ApiError::invalid_field("tool_name", "is required"));
    }
    let tool_type: ToolType = parse_field(&body.tool_type, "tool_type")?;
    if !body.delta.is_finite() {
        return Err(ApiError::invalid_field("delta", "must be a finite number"));
    }

    let score = state
        .db
        .with_conn(state.deadline, move |conn| {
            queries::routing::feedback(
                conn,
                &body.keyword,
                &body.tool_name,
                tool_type,
                body.delta,
                body.success.unwrap_or(true),
                Utc::now(),
            )
        })
        .await?;

    notify::emit(&state, ChannelKey::Global.to_string(), "routing.feedback", &score);
    Ok((StatusCode::CREATED, Json(score)))
}
