use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{MessageType, PromptType, RequestStatus, SubtaskStatus, TaskListStatus, Topic, ToolType};

/// Root container of the ownership tree. One row per working directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    /// Filesystem-like path, unique across all projects
    pub path: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Value,
}

/// A conversation instance. The id is supplied by the session-start hook,
/// not generated here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub project_id: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub tool_count: i64,
    pub success_count: i64,
    pub error_count: i64,
}

impl Session {
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// A user prompt scoped to a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: Uuid,
    pub project_id: Uuid,
    pub session_id: String,
    pub prompt: String,
    pub prompt_type: PromptType,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Value,
}

/// Ordered group of subtasks under a request (one wave of work)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskList {
    pub id: Uuid,
    pub request_id: Uuid,
    pub name: String,
    /// Unique per request; auto-assigned max+1 when unspecified
    pub wave_number: i64,
    pub status: TaskListStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A unit of work assigned to an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    pub id: Uuid,
    pub task_list_id: Uuid,
    pub agent_type: String,
    pub agent_name: Option<String>,
    pub description: String,
    pub status: SubtaskStatus,
    /// Subtask ids that must complete before this one starts
    #[serde(default)]
    pub depends_on: Vec<Uuid>,
    #[serde(default)]
    pub context: Value,
    #[serde(default)]
    pub result: Value,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A recorded tool invocation. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub id: Uuid,
    pub subtask_id: Option<Uuid>,
    pub tool_name: String,
    pub tool_type: ToolType,
    /// Decompressed on read; stored as gzip blobs
    pub input: Option<String>,
    pub output: Option<String>,
    #[serde(default)]
    pub file_paths: Vec<String>,
    /// Zero denotes success
    pub exit_code: i64,
    pub duration_ms: i64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Value,
}

impl ActionRecord {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Routing-intelligence row: how well a tool served a keyword
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolScore {
    /// Lowercased keyword
    pub keyword: String,
    pub tool_name: String,
    pub tool_type: ToolType,
    pub score: f64,
    pub use_count: i64,
    pub success_count: i64,
    pub last_used_at: DateTime<Utc>,
}

/// Bounds of the routing feedback range
pub const SCORE_MIN: f64 = -10.0;
pub const SCORE_MAX: f64 = 10.0;
pub const SCORE_DELTA_MAX: f64 = 5.0;

/// Durable pub/sub payload between agents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub id: Uuid,
    pub project_id: Option<Uuid>,
    pub from_agent: Option<String>,
    /// Absent means broadcast to every subscriber of the topic
    pub to_agent: Option<String>,
    pub topic: Topic,
    pub message_type: MessageType,
    #[serde(default)]
    pub payload: Value,
    /// Clipped to [0, 10]
    pub priority: i64,
    #[serde(default)]
    pub read_by: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AgentMessage {
    /// Unread by `agent` iff not in read_by and not expired
    pub fn is_unread_by(&self, agent: &str, now: DateTime<Utc>) -> bool {
        if self.expires_at.is_some_and(|e| e <= now) {
            return false;
        }
        !self.read_by.iter().any(|a| a == agent)
    }
}

/// (agent, topic) subscription record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub agent_id: String,
    pub topic: Topic,
    pub project_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Active blocking edge: blocker is holding up blocked
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blocking {
    pub id: Uuid,
    pub blocker_id: String,
    pub blocked_id: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Per-agent persistent state used by restore
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentContext {
    pub id: Uuid,
    pub project_id: Option<Uuid>,
    pub agent_id: String,
    pub agent_type: String,
    #[serde(default)]
    pub role_context: Value,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub tools_used: Vec<String>,
    pub progress_summary: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_unread_honors_read_by_and_expiry() {
        let now = Utc::now();
        let mut msg = AgentMessage {
            id: Uuid::new_v4(),
            project_id: None,
            from_agent: Some("backend".into()),
            to_agent: None,
            topic: Topic::General,
            message_type: MessageType::Info,
            payload: Value::Null,
            priority: 5,
            read_by: vec![],
            created_at: now,
            expires_at: None,
        };
        assert!(msg.is_unread_by("frontend", now));

        msg.read_by.push("frontend".into());
        assert!(!msg.is_unread_by("frontend", now));
        assert!(msg.is_unread_by("reviewer", now));

        msg.expires_at = Some(now - chrono::Duration::seconds(1));
        assert!(!msg.is_unread_by("reviewer", now));
    }

    #[test]
    fn session_active_iff_not_ended() {
        let mut session = Session {
            id: "s1".into(),
            project_id: None,
            started_at: Utc::now(),
            ended_at: None,
            tool_count: 0,
            success_count: 0,
            error_count: 0,
        };
        assert!(session.is_active());
        session.ended_at = Some(Utc::now());
        assert!(!session.is_active());
    }
}
