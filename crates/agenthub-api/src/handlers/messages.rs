use agenthub_store::queries;
use agenthub_types::{AgentMessage, ChannelKey, MessageType, Topic};
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::extract::{parse_field, parse_id};
use crate::notify;
use crate::state::ApiState;

#[derive(Debug, Deserialize)]
pub struct SendMessageBody {
    pub topic: String,
    pub message_type: Option<String>,
    pub from_agent: Option<String>,
    /// Absent means broadcast to the topic's subscribers
    pub to_agent: Option<String>,
    pub project_id: Option<String>,
    pub payload: Option<Value>,
    pub priority: Option<i64>,
    pub ttl_seconds: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct InboxParams {
    pub limit: Option<usize>,
    /// Stamp the fetched messages as read by this agent
    pub mark_read: Option<bool>,
}

/// POST /api/messages — topic must be in the allowed set; priority clips to
/// [0, 10]; a TTL becomes an absolute expiration.
pub async fn send(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<SendMessageBody>,
) -> ApiResult<(StatusCode, Json<AgentMessage>)> {
    let topic: Topic = parse_field(&body.topic, "topic")?;
    let message_type: MessageType = match body.message_type.as_deref() {
        Some(raw) => parse_field(raw, "message_type")?,
        None => MessageType::Info,
    };
    let project_id = body
        .project_id
        .as_deref()
        .map(|raw| parse_id(raw, "project_id"))
        .transpose()?;
    if body.ttl_seconds.is_some_and(|ttl| ttl <= 0) {
        return Err(ApiError::invalid_field("ttl_seconds", "must be positive"));
    }

    let now = Utc::now();
    let expires_at = body
        .ttl_seconds
        .or(state.default_message_ttl_secs)
        .map(|ttl| now + Duration::seconds(ttl));

    let message = state
        .db
        .with_conn(state.deadline, move |conn| {
            queries::message::insert(
                conn,
                &queries::message::NewMessage {
                    project_id: project_id.as_ref(),
                    from_agent: body.from_agent.as_deref(),
                    to_agent: body.to_agent.as_deref(),
                    topic,
                    message_type,
                    payload: body.payload.as_ref(),
                    priority: body.priority.unwrap_or(5),
                    expires_at,
                },
                now,
            )
        })
        .await?;

    // direct messages wake the recipient's channel, broadcasts the topic room
    let channel = match &message.to_agent {
        Some(agent) => ChannelKey::agent(agent).to_string(),
        None => ChannelKey::Topic(message.topic).to_string(),
    };
    notify::emit(&state, channel, "message.sent", &message);
    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /api/messages/{agent-id} — unread, unexpired messages for the agent:
/// direct ones plus broadcasts on subscribed topics.
pub async fn inbox(
    State(state): State<Arc<ApiState>>,
    Path(agent_id): Path<String>,
    Query(params): Query<InboxParams>,
) -> ApiResult<Json<Vec<AgentMessage>>> {
    if agent_id.trim().is_empty() {
        return Err(ApiError::invalid_field("agent_id", "is required"));
    }
    let limit = params.limit.unwrap_or(50).min(500);
    let mark_read = params.mark_read.unwrap_or(false);

    let reader = agent_id.clone();
    let messages = state
        .db
        .with_conn(state.deadline, move |conn| {
            let messages = queries::message::unread_for_agent(conn, &reader, Utc::now(), limit)?;
            if mark_read && !messages.is_empty() {
                let ids: Vec<_> = messages.iter().map(|m| m.id).collect();
                queries::message::mark_read(conn, &ids, &reader)?;
            }
            Ok(messages)
        })
        .await?;

    if mark_read && !messages.is_empty() {
        notify::emit(
            &state,
            ChannelKey::agent(&agent_id).to_string(),
            "message.read",
            &serde_json::json!({
                "agent_id": agent_id,
                "count": messages.len(),
            }),
        );
    }
    Ok(Json(messages))
}
