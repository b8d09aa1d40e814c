use agenthub_store::{Database, queries};
use agenthub_types::{
    ActionRecord, AgentContext, AgentMessage, Blocking, Project, Request, Subtask, SubtaskStatus,
};
use chrono::Utc;
use serde::Serialize;
use std::time::Duration;

use crate::Result;

const SOURCE_DEADLINE: Duration = Duration::from_secs(5);

/// Default number of recent actions pulled into a brief; the post-compact
/// restore path widens this to 15.
pub const DEFAULT_ACTION_LIMIT: usize = 10;
pub const RESTORE_ACTION_LIMIT: usize = 15;

const SUBTASK_LIMIT: usize = 25;
const MESSAGE_LIMIT: usize = 25;

/// What to generate a brief for.
#[derive(Debug, Clone)]
pub struct BriefQuery {
    pub agent_id: String,
    pub session_id: String,
    pub agent_type: String,
    pub max_tokens: usize,
    pub include_messages: bool,
    pub include_actions: bool,
    pub action_limit: usize,
    /// Restore path: pull actions for the whole session rather than only the
    /// agent's own subtasks.
    pub session_scoped_actions: bool,
}

impl BriefQuery {
    pub fn new(
        agent_id: impl Into<String>,
        session_id: impl Into<String>,
        agent_type: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            session_id: session_id.into(),
            agent_type: agent_type.into(),
            max_tokens: crate::tokens::DEFAULT_MAX_TOKENS,
            include_messages: true,
            include_actions: true,
            action_limit: DEFAULT_ACTION_LIMIT,
            session_scoped_actions: false,
        }
    }
}

/// Everything a brief is rendered from.
#[derive(Debug, Default)]
pub struct BriefSources {
    pub subtasks: Vec<Subtask>,
    pub messages: Vec<AgentMessage>,
    pub blockings: Vec<Blocking>,
    pub actions: Vec<ActionRecord>,
    pub request: Option<Request>,
    pub project: Option<Project>,
    pub snapshot: Option<AgentContext>,
}

/// A `{type, id, relevance}` reference returned alongside the brief text.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: String,
    pub relevance: f64,
}

/// Reads the six brief sources concurrently from the store.
pub async fn collect(db: &Database, query: &BriefQuery) -> Result<BriefSources> {
    let now = Utc::now();

    let subtasks = {
        let (agent_type, agent_id) = (query.agent_type.clone(), query.agent_id.clone());
        db.with_conn(SOURCE_DEADLINE, move |conn| {
            queries::subtask::list_for_agent(conn, &agent_type, Some(&agent_id), SUBTASK_LIMIT)
        })
    };
    let messages = {
        let agent_id = query.agent_id.clone();
        let wanted = query.include_messages;
        db.with_conn(SOURCE_DEADLINE, move |conn| {
            if wanted {
                queries::message::unread_for_agent(conn, &agent_id, now, MESSAGE_LIMIT)
            } else {
                Ok(Vec::new())
            }
        })
    };
    let blockings = {
        let agent_id = query.agent_id.clone();
        db.with_conn(SOURCE_DEADLINE, move |conn| {
            queries::blocking::active_for_blocked(conn, &agent_id)
        })
    };
    let actions = {
        let (agent_type, agent_id) = (query.agent_type.clone(), query.agent_id.clone());
        let session_id = query.session_id.clone();
        let wanted = query.include_actions;
        let session_scoped = query.session_scoped_actions;
        let limit = query.action_limit;
        db.with_conn(SOURCE_DEADLINE, move |conn| {
            if !wanted {
                Ok(Vec::new())
            } else if session_scoped {
                queries::action::recent_for_session(conn, &session_id, limit)
            } else {
                queries::action::recent_for_agent(conn, &agent_type, Some(&agent_id), limit)
            }
        })
    };
    let request = {
        let session_id = query.session_id.clone();
        db.with_conn(SOURCE_DEADLINE, move |conn| {
            queries::request::latest_for_session(conn, &session_id)
        })
    };

    let (subtasks, messages, blockings, actions, request) =
        tokio::join!(subtasks, messages, blockings, actions, request);
    let request = request?;

    // the owning project hangs off the latest request
    let project = match request.as_ref().map(|r| r.project_id) {
        Some(project_id) => {
            db.with_conn(SOURCE_DEADLINE, move |conn| {
                queries::project::get(conn, &project_id)
            })
            .await?
        }
        None => None,
    };

    Ok(BriefSources {
        subtasks: subtasks?,
        messages: messages?,
        blockings: blockings?,
        actions: actions?,
        request,
        project,
        snapshot: None,
    })
}

pub fn subtask_relevance(subtask: &Subtask) -> f64 {
    match subtask.status {
        SubtaskStatus::Running => 1.0,
        SubtaskStatus::Pending | SubtaskStatus::Blocked | SubtaskStatus::Paused => 0.8,
        SubtaskStatus::Completed | SubtaskStatus::Failed => 0.5,
    }
}

pub fn message_relevance(message: &AgentMessage) -> f64 {
    if message.priority >= 5 { 1.0 } else { 0.6 }
}

pub const BLOCKING_RELEVANCE: f64 = 0.9;
pub const ACTION_RELEVANCE: f64 = 0.7;
pub const SESSION_RELEVANCE: f64 = 0.8;
pub const PROJECT_RELEVANCE: f64 = 0.7;
pub const SNAPSHOT_RELEVANCE: f64 = 0.9;

impl BriefSources {
    /// The `{type, id, relevance}` list reported back to the caller.
    pub fn refs(&self) -> Vec<SourceRef> {
        let mut refs = Vec::new();
        for st in &self.subtasks {
            refs.push(SourceRef {
                kind: "subtask",
                id: st.id.to_string(),
                relevance: subtask_relevance(st),
            });
        }
        for msg in &self.messages {
            refs.push(SourceRef {
                kind: "message",
                id: msg.id.to_string(),
                relevance: message_relevance(msg),
            });
        }
        for blocking in &self.blockings {
            refs.push(SourceRef {
                kind: "blocking",
                id: blocking.id.to_string(),
                relevance: BLOCKING_RELEVANCE,
            });
        }
        for action in &self.actions {
            refs.push(SourceRef {
                kind: "action",
                id: action.id.to_string(),
                relevance: ACTION_RELEVANCE,
            });
        }
        if let Some(request) = &self.request {
            refs.push(SourceRef {
                kind: "request",
                id: request.id.to_string(),
                relevance: SESSION_RELEVANCE,
            });
        }
        if let Some(project) = &self.project {
            refs.push(SourceRef {
                kind: "project",
                id: project.id.to_string(),
                relevance: PROJECT_RELEVANCE,
            });
        }
        if let Some(snapshot) = &self.snapshot {
            refs.push(SourceRef {
                kind: "snapshot",
                id: snapshot.id.to_string(),
                relevance: SNAPSHOT_RELEVANCE,
            });
        }
        refs.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
        refs
    }
}
