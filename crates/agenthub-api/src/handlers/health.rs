use agenthub_store::queries;
use agenthub_types::COMPACT_SNAPSHOT_TYPE;
use axum::Json;
use axum::extract::State;
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::error::ApiResult;
use crate::state::ApiState;

/// GET /health — process, database and realtime liveness.
pub async fn health(State(state): State<Arc<ApiState>>) -> Json<Value> {
    let database = state
        .db
        .with_conn(state.deadline, |conn| {
            Ok(conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?)
        })
        .await
        .is_ok();

    let realtime = state.hub.as_ref().map(|hub| {
        json!({ "status": "up", "subscribers": hub.subscriber_count() })
    });

    Json(json!({
        "status": if database { "ok" } else { "degraded" },
        "database": if database { "up" } else { "down" },
        "realtime": realtime.unwrap_or_else(|| json!({ "status": "detached" })),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// GET /stats — raw row counts.
pub async fn stats(
    State(state): State<Arc<ApiState>>,
) -> ApiResult<Json<queries::stats::StoreCounts>> {
    let counts = state
        .db
        .with_conn(state.deadline, |conn| queries::stats::counts(conn))
        .await?;
    Ok(Json(counts))
}

/// GET /stats/tools-summary — per-tool usage aggregates.
pub async fn tools_summary(
    State(state): State<Arc<ApiState>>,
) -> ApiResult<Json<Vec<queries::action::ToolSummary>>> {
    let summary = state
        .db
        .with_conn(state.deadline, |conn| {
            queries::action::tools_summary(conn)
        })
        .await?;
    Ok(Json(summary))
}

/// GET /api/cleanup/stats — what the periodic workers would currently sweep.
pub async fn cleanup_stats(State(state): State<Arc<ApiState>>) -> ApiResult<Json<Value>> {
    let now = Utc::now();
    let snapshot_cutoff = now - Duration::hours(24);
    let (expired_messages, old_snapshots, stale_sessions) = state
        .db
        .with_conn(state.deadline, move |conn| {
            let expired = queries::message::count_expired(conn, now)?;
            let snapshots =
                queries::context::count_snapshots_older_than(conn, snapshot_cutoff)?;
            let stale: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sessions WHERE ended_at IS NULL AND started_at < ?1",
                [agenthub_store::records::ts(now - Duration::minutes(30))],
                |row| row.get(0),
            )?;
            Ok((expired, snapshots, stale))
        })
        .await?;

    Ok(Json(json!({
        "expired_messages": expired_messages,
        "old_snapshots": old_snapshots,
        "snapshot_type": COMPACT_SNAPSHOT_TYPE,
        "possibly_stale_sessions": stale_sessions,
        "timestamp": now.to_rfc3339(),
    })))
}
