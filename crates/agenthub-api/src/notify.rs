//! Post-commit wake-channel emission. Always best-effort: a failed or
//! dropped envelope never fails the originating call.

use serde::Serialize;

use crate::state::ApiState;

pub fn emit<T: Serialize>(state: &ApiState, channel: impl Into<String>, event: &str, data: &T) {
    match serde_json::to_value(data) {
        Ok(value) => state.db.notifier().notify(channel, event, value),
        Err(e) => tracing::warn!(event, "wake envelope serialization failed: {}", e),
    }
}
