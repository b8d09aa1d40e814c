use agenthub_store::queries;
use agenthub_types::{ChannelKey, Subscription, Topic};
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::extract::{parse_field, parse_id};
use crate::notify;
use crate::state::ApiState;

#[derive(Debug, Deserialize)]
pub struct SubscribeBody {
    pub agent_id: String,
    pub topic: String,
    pub project_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UnsubscribeBody {
    pub agent_id: String,
    pub topic: String,
}

/// POST /api/subscribe — idempotent on (agent, topic).
pub async fn subscribe(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<SubscribeBody>,
) -> ApiResult<(StatusCode, Json<Subscription>)> {
    if body.agent_id.trim().is_empty() {
        return Err(ApiError::invalid_field("agent_id", "is required"));
    }
    let topic: Topic = parse_field(&body.topic, "topic")?;
    let project_id = body
        .project_id
        .as_deref()
        .map(|raw| parse_id(raw, "project_id"))
        .transpose()?;

    let subscription = state
        .db
        .with_conn(state.deadline, move |conn| {
            queries::subscription::subscribe(
                conn,
                &body.agent_id,
                topic,
                project_id.as_ref(),
                Utc::now(),
            )
        })
        .await?;

    notify::emit(
        &state,
        ChannelKey::agent(&subscription.agent_id).to_string(),
        "subscription.created",
        &subscription,
    );
    Ok((StatusCode::CREATED, Json(subscription)))
}

/// POST /api/unsubscribe — idempotent; removing an absent pair succeeds.
pub async fn unsubscribe(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<UnsubscribeBody>,
) -> ApiResult<Json<serde_json::Value>> {
    if body.agent_id.trim().is_empty() {
        return Err(ApiError::invalid_field("agent_id", "is required"));
    }
    let topic: Topic = parse_field(&body.topic, "topic")?;

    let agent_id = body.agent_id.clone();
    let removed = state
        .db
        .with_conn(state.deadline, move |conn| {
            queries::subscription::unsubscribe(conn, &body.agent_id, topic)
        })
        .await?;

    if removed > 0 {
        notify::emit(
            &state,
            ChannelKey::agent(&agent_id).to_string(),
            "subscription.removed",
            &serde_json::json!({ "agent_id": agent_id, "topic": topic }),
        );
    }
    Ok(Json(serde_json::json!({ "removed": removed })))
}

/// GET /api/subscriptions
pub async fn list(State(state): State<Arc<ApiState>>) -> ApiResult<Json<Vec<Subscription>>> {
    let subscriptions = state
        .db
        .with_conn(state.deadline, |conn| queries::subscription::list(conn))
        .await?;
    Ok(Json(subscriptions))
}

/// GET /api/subscriptions/{agent-id}
pub async fn list_for_agent(
    State(state): State<Arc<ApiState>>,
    Path(agent_id): Path<String>,
) -> ApiResult<Json<Vec<Subscription>>> {
    let subscriptions = state
        .db
        .with_conn(state.deadline, move |conn| {
            queries::subscription::list_for_agent(conn, &agent_id)
        })
        .await?;
    Ok(Json(subscriptions))
}

/// DELETE /api/subscriptions/{id}
pub async fn delete(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let subscription_id = parse_id(&id, "id")?;
    let deleted = state
        .db
        .with_conn(state.deadline, move |conn| {
            queries::subscription::delete_by_id(conn, &subscription_id)
        })
        .await?;
    if !deleted {
        return Err(ApiError::not_found("subscription"));
    }
    Ok(Json(serde_json::json!({ "deleted": true })))
}
