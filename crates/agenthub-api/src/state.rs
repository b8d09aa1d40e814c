use agenthub_realtime::FanoutHub;
use agenthub_store::Database;
use std::time::Duration;

use crate::rate_limit::RateLimiter;

/// Environment mode; gates auth strictness and error verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Production,
    Development,
}

/// Shared state for all HTTP handlers. The database (and its wake-channel
/// notifier) is the write path; the hub reference only feeds liveness info
/// into `/health`.
pub struct ApiState {
    pub db: Database,
    pub hub: Option<FanoutHub>,
    pub mode: Mode,
    pub auth_secret: String,
    /// Normal endpoint deadline
    pub deadline: Duration,
    /// Compact-save may read many rows
    pub compact_deadline: Duration,
    /// Sessions with no actions for this long are flagged inactive
    pub inactive_minutes: i64,
    /// Applied when a message arrives without an explicit TTL
    pub default_message_ttl_secs: Option<i64>,
    pub token_limiter: RateLimiter,
}

impl ApiState {
    pub fn new(db: Database, mode: Mode, auth_secret: impl Into<String>) -> Self {
        Self {
            db,
            hub: None,
            mode,
            auth_secret: auth_secret.into(),
            deadline: Duration::from_secs(5),
            compact_deadline: Duration::from_secs(30),
            inactive_minutes: 10,
            default_message_ttl_secs: None,
            token_limiter: RateLimiter::token_endpoint(),
        }
    }

    pub fn with_hub(mut self, hub: FanoutHub) -> Self {
        self.hub = Some(hub);
        self
    }

    pub fn is_production(&self) -> bool {
        self.mode == Mode::Production
    }
}
