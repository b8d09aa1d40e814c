//! Compact-cycle pipeline: save a full-session snapshot before the upstream
//! conversation is compressed, regenerate a brief from live state (plus the
//! snapshot) afterwards.

use agenthub_store::{Database, queries};
use agenthub_types::{COMPACT_SNAPSHOT_TYPE, CompactTrigger, truncate};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeSet;
use std::time::Duration;
use uuid::Uuid;

use crate::sources::{BriefQuery, RESTORE_ACTION_LIMIT, collect};
use crate::{Brief, Error, Result, generate_from_sources};

/// Compact-save may touch many rows; it gets a wider deadline than the
/// regular five-second source reads.
const SAVE_DEADLINE: Duration = Duration::from_secs(30);
const STATUS_DEADLINE: Duration = Duration::from_secs(5);

const DECISION_MIN_PRIORITY: i64 = 7;
const SNAPSHOT_ACTION_LIMIT: usize = 15;
const SNAPSHOT_MESSAGE_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotSummary {
    pub snapshot_id: Uuid,
    pub session_id: String,
    pub trigger: CompactTrigger,
    pub active_tasks: usize,
    pub modified_files: usize,
    pub decisions: usize,
    pub agent_states: usize,
    pub recent_messages: usize,
    pub saved_at: DateTime<Utc>,
}

/// Assembles and upserts the compact snapshot for a session, and stamps the
/// owning request with the snapshot time.
pub async fn save(
    db: &Database,
    session_id: &str,
    trigger: CompactTrigger,
) -> Result<SnapshotSummary> {
    let session_id = session_id.to_string();
    let now = Utc::now();

    db.with_conn(SAVE_DEADLINE, move |conn| {
        // missing session surfaces as not-found at the API boundary
        let Some(session) = queries::session::get(conn, &session_id)? else {
            return Ok(Err(session_id.clone()));
        };

        let request = queries::request::latest_for_session(conn, &session_id)?;
        let project_id = request.as_ref().map(|r| r.project_id).or(session.project_id);

        let active_tasks = queries::subtask::active_for_session(conn, &session_id)?;
        let actions = queries::action::recent_for_session(conn, &session_id, SNAPSHOT_ACTION_LIMIT)?;
        let decisions = queries::message::high_priority_recent(
            conn,
            project_id.as_ref(),
            DECISION_MIN_PRIORITY,
            SNAPSHOT_MESSAGE_LIMIT,
        )?;
        let recent_messages = queries::message::recent(conn, SNAPSHOT_MESSAGE_LIMIT)?;
        let agent_states = match project_id.as_ref() {
            Some(pid) => queries::context::agent_states_for_project(conn, pid)?,
            None => Vec::new(),
        };

        let modified_files: BTreeSet<String> = actions
            .iter()
            .flat_map(|a| a.file_paths.iter().cloned())
            .collect();

        let summary = session_summary(&session_id, request.as_ref(), &active_tasks, &modified_files);

        let snapshot_data = json!({
            "trigger": trigger,
            "saved_at": now.to_rfc3339(),
            "session": {
                "id": session.id,
                "tool_count": session.tool_count,
                "success_count": session.success_count,
                "error_count": session.error_count,
            },
            "active_tasks": active_tasks.iter().map(|t| json!({
                "id": t.id,
                "description": t.description,
                "status": t.status,
                "agent": t.agent_name.as_deref().unwrap_or(&t.agent_type),
            })).collect::<Vec<_>>(),
            "modified_files": modified_files,
            "recent_decisions": decisions.iter().map(|m| json!({
                "from": m.from_agent,
                "topic": m.topic,
                "priority": m.priority,
                "payload": m.payload,
            })).collect::<Vec<_>>(),
            "agent_states": agent_states.iter().map(|c| json!({
                "agent_id": c.agent_id,
                "agent_type": c.agent_type,
                "progress": c.progress_summary,
            })).collect::<Vec<_>>(),
            "recent_messages": recent_messages.iter().map(|m| json!({
                "from": m.from_agent,
                "to": m.to_agent,
                "topic": m.topic,
                "type": m.message_type,
            })).collect::<Vec<_>>(),
        });

        let tx = conn.transaction()?;
        let snapshot = queries::context::upsert(
            &tx,
            &queries::context::ContextUpsert {
                project_id: project_id.as_ref(),
                agent_id: &session_id,
                agent_type: COMPACT_SNAPSHOT_TYPE,
                role_context: Some(&snapshot_data),
                skills: None,
                tools_used: None,
                progress_summary: Some(&summary),
            },
            now,
        )?;
        if let Some(request) = &request {
            queries::request::set_metadata_key(
                &tx,
                &request.id,
                "last_snapshot_at",
                &json!(now.to_rfc3339()),
            )?;
        }
        tx.commit()?;

        Ok(Ok(SnapshotSummary {
            snapshot_id: snapshot.id,
            session_id: session_id.clone(),
            trigger,
            active_tasks: active_tasks.len(),
            modified_files: modified_files.len(),
            decisions: decisions.len(),
            agent_states: agent_states.len(),
            recent_messages: recent_messages.len(),
            saved_at: now,
        }))
    })
    .await?
    .map_err(Error::SessionNotFound)
}

fn session_summary(
    session_id: &str,
    request: Option<&agenthub_types::Request>,
    active_tasks: &[agenthub_types::Subtask],
    modified_files: &BTreeSet<String>,
) -> String {
    let mut summary = format!(
        "Session {}: {} active task(s), {} file(s) touched",
        session_id,
        active_tasks.len(),
        modified_files.len()
    );
    if let Some(request) = request {
        summary.push_str(&format!(
            "; working on [{}] {}",
            request.prompt_type,
            truncate(&request.prompt, 100)
        ));
    }
    summary
}

/// Regenerates a brief from live state, with the latest snapshot folded in
/// as supplementary context.
pub async fn restore(
    db: &Database,
    session_id: &str,
    agent_id: &str,
    agent_type: &str,
    max_tokens: Option<usize>,
) -> Result<Brief> {
    let snapshot = {
        let session_id = session_id.to_string();
        db.with_conn(STATUS_DEADLINE, move |conn| {
            queries::context::latest_snapshot(conn, &session_id)
        })
        .await?
    };

    let mut query = BriefQuery::new(agent_id, session_id, agent_type);
    query.action_limit = RESTORE_ACTION_LIMIT;
    query.session_scoped_actions = true;
    if let Some(max) = max_tokens {
        query.max_tokens = max;
    }

    let mut sources = collect(db, &query).await?;
    sources.snapshot = snapshot;
    Ok(generate_from_sources(&query, &sources))
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotStatus {
    pub session_id: String,
    pub has_snapshot: bool,
    pub saved_at: Option<DateTime<Utc>>,
    pub age_seconds: Option<i64>,
    pub trigger: Option<String>,
}

pub async fn status(db: &Database, session_id: &str) -> Result<SnapshotStatus> {
    let owned = session_id.to_string();
    let snapshot = db
        .with_conn(STATUS_DEADLINE, move |conn| {
            queries::context::latest_snapshot(conn, &owned)
        })
        .await?;

    let now = Utc::now();
    Ok(match snapshot {
        Some(snapshot) => SnapshotStatus {
            session_id: session_id.to_string(),
            has_snapshot: true,
            saved_at: Some(snapshot.updated_at),
            age_seconds: Some((now - snapshot.updated_at).num_seconds()),
            trigger: snapshot.role_context["trigger"].as_str().map(str::to_string),
        },
        None => SnapshotStatus {
            session_id: session_id.to_string(),
            has_snapshot: false,
            saved_at: None,
            age_seconds: None,
            trigger: None,
        },
    })
}
