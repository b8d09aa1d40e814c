mod entities;
mod envelope;
mod error;
mod util;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use entities::*;
pub use envelope::*;
pub use error::{Error, Result};
pub use util::*;

/// Category of a user prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptType {
    Feature,
    Debug,
    Explain,
    Search,
}

/// Lifecycle status of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Active,
    Completed,
}

/// Status of a task list (wave)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskListStatus {
    Pending,
    Running,
    Completed,
}

/// Status of an agent-assigned subtask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    Pending,
    Running,
    Paused,
    Blocked,
    Completed,
    Failed,
}

impl SubtaskStatus {
    /// Terminal states stamp completed_at
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubtaskStatus::Completed | SubtaskStatus::Failed)
    }
}

/// Kind of tool behind a recorded action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolType {
    Builtin,
    Agent,
    Skill,
    Mcp,
    Command,
}

/// Category of an agent message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Info,
    Request,
    Response,
    Notification,
}

/// What initiated a compact save
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompactTrigger {
    Auto,
    Manual,
    Proactive,
}

/// Agent type reserved for full-session compact snapshots
pub const COMPACT_SNAPSHOT_TYPE: &str = "compact-snapshot";

/// Pub/sub topic (closed allowed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    ApiEndpointCreated,
    SchemaChanged,
    TypesUpdated,
    MigrationCreated,
    ComponentCreated,
    TestFailed,
    TestPassed,
    BuildStatus,
    DeployStatus,
    TaskBlocked,
    TaskCompleted,
    AgentStatus,
    Coordination,
    General,
}

impl Topic {
    pub const ALL: [Topic; 14] = [
        Topic::ApiEndpointCreated,
        Topic::SchemaChanged,
        Topic::TypesUpdated,
        Topic::MigrationCreated,
        Topic::ComponentCreated,
        Topic::TestFailed,
        Topic::TestPassed,
        Topic::BuildStatus,
        Topic::DeployStatus,
        Topic::TaskBlocked,
        Topic::TaskCompleted,
        Topic::AgentStatus,
        Topic::Coordination,
        Topic::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::ApiEndpointCreated => "api_endpoint_created",
            Topic::SchemaChanged => "schema_changed",
            Topic::TypesUpdated => "types_updated",
            Topic::MigrationCreated => "migration_created",
            Topic::ComponentCreated => "component_created",
            Topic::TestFailed => "test_failed",
            Topic::TestPassed => "test_passed",
            Topic::BuildStatus => "build_status",
            Topic::DeployStatus => "deploy_status",
            Topic::TaskBlocked => "task_blocked",
            Topic::TaskCompleted => "task_completed",
            Topic::AgentStatus => "agent_status",
            Topic::Coordination => "coordination",
            Topic::General => "general",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Topic::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::UnknownValue {
                field: "topic",
                value: s.to_string(),
            })
    }
}

macro_rules! impl_str_enum {
    ($ty:ty, $field:literal, [$(($variant:path, $s:literal)),+ $(,)?]) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($variant => $s),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($s => Ok($variant)),+,
                    other => Err(Error::UnknownValue {
                        field: $field,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

impl_str_enum!(
    PromptType,
    "prompt_type",
    [
        (PromptType::Feature, "feature"),
        (PromptType::Debug, "debug"),
        (PromptType::Explain, "explain"),
        (PromptType::Search, "search"),
    ]
);

impl_str_enum!(
    RequestStatus,
    "status",
    [
        (RequestStatus::Active, "active"),
        (RequestStatus::Completed, "completed"),
    ]
);

impl_str_enum!(
    TaskListStatus,
    "status",
    [
        (TaskListStatus::Pending, "pending"),
        (TaskListStatus::Running, "running"),
        (TaskListStatus::Completed, "completed"),
    ]
);

impl_str_enum!(
    SubtaskStatus,
    "status",
    [
        (SubtaskStatus::Pending, "pending"),
        (SubtaskStatus::Running, "running"),
        (SubtaskStatus::Paused, "paused"),
        (SubtaskStatus::Blocked, "blocked"),
        (SubtaskStatus::Completed, "completed"),
        (SubtaskStatus::Failed, "failed"),
    ]
);

impl_str_enum!(
    ToolType,
    "tool_type",
    [
        (ToolType::Builtin, "builtin"),
        (ToolType::Agent, "agent"),
        (ToolType::Skill, "skill"),
        (ToolType::Mcp, "mcp"),
        (ToolType::Command, "command"),
    ]
);

impl_str_enum!(
    MessageType,
    "message_type",
    [
        (MessageType::Info, "info"),
        (MessageType::Request, "request"),
        (MessageType::Response, "response"),
        (MessageType::Notification, "notification"),
    ]
);

impl_str_enum!(
    CompactTrigger,
    "trigger",
    [
        (CompactTrigger::Auto, "auto"),
        (CompactTrigger::Manual, "manual"),
        (CompactTrigger::Proactive, "proactive"),
    ]
);
