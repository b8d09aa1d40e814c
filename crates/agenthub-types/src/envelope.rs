use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result, Topic};

/// Wake-channel envelope published by the API after every committed mutation
/// and consumed by the notification bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyEnvelope {
    pub channel: String,
    pub event: String,
    pub data: Value,
}

impl NotifyEnvelope {
    pub fn new(channel: impl Into<String>, event: impl Into<String>, data: Value) -> Self {
        Self {
            channel: channel.into(),
            event: event.into(),
            data,
        }
    }
}

/// Real-time routing key. Five shapes; anything else is refused.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelKey {
    Global,
    Metrics,
    Agent(String),
    Session(String),
    Topic(Topic),
}

impl ChannelKey {
    pub fn agent(id: impl Into<String>) -> Self {
        ChannelKey::Agent(id.into())
    }

    pub fn session(id: impl Into<String>) -> Self {
        ChannelKey::Session(id.into())
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKey::Global => f.write_str("global"),
            ChannelKey::Metrics => f.write_str("metrics"),
            ChannelKey::Agent(id) => write!(f, "agents/{}", id),
            ChannelKey::Session(id) => write!(f, "sessions/{}", id),
            ChannelKey::Topic(topic) => write!(f, "topics/{}", topic),
        }
    }
}

impl FromStr for ChannelKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "global" => return Ok(ChannelKey::Global),
            "metrics" => return Ok(ChannelKey::Metrics),
            _ => {}
        }
        if let Some(id) = s.strip_prefix("agents/") {
            if !id.is_empty() && !id.contains('/') {
                return Ok(ChannelKey::Agent(id.to_string()));
            }
        } else if let Some(id) = s.strip_prefix("sessions/") {
            if !id.is_empty() && !id.contains('/') {
                return Ok(ChannelKey::Session(id.to_string()));
            }
        } else if let Some(name) = s.strip_prefix("topics/") {
            return Ok(ChannelKey::Topic(name.parse()?));
        }
        Err(Error::InvalidChannel(s.to_string()))
    }
}

/// Every event name the hub will route. Client publishes outside this set
/// are refused.
pub const EVENT_NAMES: &[&str] = &[
    "project.created",
    "project.updated",
    "project.deleted",
    "session.started",
    "session.updated",
    "session.ended",
    "request.created",
    "request.updated",
    "request.completed",
    "task.created",
    "task.updated",
    "task.completed",
    "subtask.created",
    "subtask.updated",
    "subtask.completed",
    "action.recorded",
    "message.sent",
    "message.read",
    "subscription.created",
    "subscription.removed",
    "blocking.created",
    "blocking.removed",
    "context.updated",
    "compact.saved",
    "compact.restored",
    "routing.feedback",
    "agent.connected",
    "agent.disconnected",
    "agent.status",
    "metric.update",
];

pub fn is_known_event(name: &str) -> bool {
    EVENT_NAMES.contains(&name)
}

/// task.*, subtask.* and message.* events are delivered at-least-once with
/// bounded retries; everything else is fire-and-forget.
pub fn is_tracked_event(name: &str) -> bool {
    name.starts_with("task.") || name.starts_with("subtask.") || name.starts_with("message.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_key_round_trips() {
        for raw in [
            "global",
            "metrics",
            "agents/backend",
            "sessions/s-123",
            "topics/build_status",
        ] {
            let key: ChannelKey = raw.parse().unwrap();
            assert_eq!(key.to_string(), raw);
        }
    }

    #[test]
    fn malformed_channels_are_refused() {
        for raw in [
            "",
            "agents/",
            "agents/a/b",
            "sessions/",
            "topics/not_a_topic",
            "rooms/x",
        ] {
            assert!(raw.parse::<ChannelKey>().is_err(), "accepted {:?}", raw);
        }
    }

    #[test]
    fn tracked_event_families() {
        assert!(is_tracked_event("task.created"));
        assert!(is_tracked_event("subtask.updated"));
        assert!(is_tracked_event("message.sent"));
        assert!(!is_tracked_event("action.recorded"));
        assert!(!is_tracked_event("metric.update"));
    }

    #[test]
    fn event_vocabulary_is_closed() {
        assert!(is_known_event("subtask.completed"));
        assert!(!is_known_event("subtask.exploded"));
    }
}
