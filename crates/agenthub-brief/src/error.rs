use std::fmt;

/// Result type for agenthub-brief operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while generating briefs or snapshots
#[derive(Debug)]
pub enum Error {
    /// Store layer error
    Store(agenthub_store::Error),

    /// The session the compact cycle targets does not exist
    SessionNotFound(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Store(err) => write!(f, "Store error: {}", err),
            Error::SessionNotFound(id) => write!(f, "Session not found: {}", id),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Store(err) => Some(err),
            Error::SessionNotFound(_) => None,
        }
    }
}

impl From<agenthub_store::Error> for Error {
    fn from(err: agenthub_store::Error) -> Self {
        Error::Store(err)
    }
}
