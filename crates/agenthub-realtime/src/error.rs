use std::fmt;

/// Result type for agenthub-realtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the hub layer
#[derive(Debug)]
pub enum Error {
    /// Unknown subscriber id
    UnknownSubscriber(String),

    /// Channel key not one of the five allowed shapes
    InvalidChannel(String),

    /// Event name outside the closed vocabulary
    UnknownEvent(String),

    /// Frame requires authentication first
    NotAuthenticated,

    /// Token missing, malformed or expired
    Auth(agenthub_auth::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnknownSubscriber(id) => write!(f, "Unknown subscriber: {}", id),
            Error::InvalidChannel(raw) => write!(f, "Invalid channel: {}", raw),
            Error::UnknownEvent(name) => write!(f, "Unknown event: {}", name),
            Error::NotAuthenticated => write!(f, "Not authenticated"),
            Error::Auth(err) => write!(f, "Authentication failed: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Auth(err) => Some(err),
            _ => None,
        }
    }
}

impl From<agenthub_auth::Error> for Error {
    fn from(err: agenthub_auth::Error) -> Self {
        Error::Auth(err)
    }
}

impl From<agenthub_types::Error> for Error {
    fn from(err: agenthub_types::Error) -> Self {
        match err {
            agenthub_types::Error::InvalidChannel(raw) => Error::InvalidChannel(raw),
            agenthub_types::Error::UnknownValue { value, .. } => Error::InvalidChannel(value),
        }
    }
}
