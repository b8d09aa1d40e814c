//! JSON frame shapes on the real-time surface.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client → server frames, discriminated by `type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Auth {
        agent_id: Option<String>,
        session_id: Option<String>,
        token: Option<String>,
    },
    Subscribe {
        channel: String,
        id: Option<String>,
    },
    Unsubscribe {
        channel: String,
    },
    Publish {
        channel: String,
        event: String,
        #[serde(default)]
        data: Value,
    },
    Ping,
    Ack {
        id: String,
    },
}

/// Server → client frames. Event frames have no `type` discriminator; they
/// are recognized by their `channel`/`event` fields.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ServerFrame {
    Connected {
        r#type: &'static str,
        client_id: String,
        timestamp: String,
    },
    Ack {
        r#type: &'static str,
        id: Option<String>,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Pong {
        r#type: &'static str,
        timestamp: String,
    },
    Event {
        channel: String,
        event: String,
        data: Value,
        timestamp: String,
        /// Present on tracked events; echo it back in an ack frame
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    Error {
        error: String,
        code: String,
        timestamp: String,
    },
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

impl ServerFrame {
    pub fn connected(client_id: impl Into<String>) -> Self {
        ServerFrame::Connected {
            r#type: "connected",
            client_id: client_id.into(),
            timestamp: now(),
        }
    }

    pub fn ack_ok(id: Option<String>) -> Self {
        ServerFrame::Ack {
            r#type: "ack",
            id,
            success: true,
            error: None,
        }
    }

    pub fn ack_err(id: Option<String>, error: impl Into<String>) -> Self {
        ServerFrame::Ack {
            r#type: "ack",
            id,
            success: false,
            error: Some(error.into()),
        }
    }

    pub fn pong() -> Self {
        ServerFrame::Pong {
            r#type: "pong",
            timestamp: now(),
        }
    }

    pub fn event(channel: impl Into<String>, event: impl Into<String>, data: Value, id: Option<String>) -> Self {
        ServerFrame::Event {
            channel: channel.into(),
            event: event.into(),
            data,
            timestamp: now(),
            id,
        }
    }

    pub fn error(error: impl Into<String>, code: impl Into<String>) -> Self {
        ServerFrame::Error {
            error: error.into(),
            code: code.into(),
            timestamp: now(),
        }
    }
}

/// Error codes on the real-time surface
pub mod codes {
    pub const PARSE_ERROR: &str = "PARSE_ERROR";
    pub const UNKNOWN_MESSAGE_TYPE: &str = "UNKNOWN_MESSAGE_TYPE";
    pub const INVALID_CHANNEL: &str = "INVALID_CHANNEL";
    pub const INVALID_EVENT: &str = "INVALID_EVENT";
    pub const AUTH_FAILED: &str = "AUTH_FAILED";
    /// Missing credentials
    pub const MISSING_CREDENTIALS: &str = "4003";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_frames_parse_by_type() {
        let auth: ClientFrame =
            serde_json::from_str(r#"{"type":"auth","agent_id":"backend"}"#).unwrap();
        assert!(matches!(auth, ClientFrame::Auth { .. }));

        let sub: ClientFrame =
            serde_json::from_str(r#"{"type":"subscribe","channel":"global","id":"1"}"#).unwrap();
        assert!(matches!(sub, ClientFrame::Subscribe { .. }));

        let ack: ClientFrame = serde_json::from_str(r#"{"type":"ack","id":"m-1"}"#).unwrap();
        assert!(matches!(ack, ClientFrame::Ack { .. }));

        assert!(serde_json::from_str::<ClientFrame>(r#"{"type":"warp"}"#).is_err());
    }

    #[test]
    fn event_frame_has_no_type_field() {
        let frame = ServerFrame::event("global", "project.created", serde_json::json!({}), None);
        let value = serde_json::to_value(&frame).unwrap();
        assert!(value.get("type").is_none());
        assert_eq!(value["channel"], "global");
        assert_eq!(value["event"], "project.created");
        assert!(value.get("id").is_none());
    }

    #[test]
    fn tracked_event_frame_carries_id() {
        let frame =
            ServerFrame::event("topics/general", "message.sent", serde_json::json!({}), Some("m1".into()));
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["id"], "m1");
    }

    #[test]
    fn control_frames_carry_type() {
        let value = serde_json::to_value(ServerFrame::connected("c1")).unwrap();
        assert_eq!(value["type"], "connected");
        let value = serde_json::to_value(ServerFrame::pong()).unwrap();
        assert_eq!(value["type"], "pong");
        let value = serde_json::to_value(ServerFrame::ack_ok(Some("1".into()))).unwrap();
        assert_eq!(value["type"], "ack");
        assert_eq!(value["success"], true);
    }
}
