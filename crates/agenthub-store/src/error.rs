use std::fmt;

/// Result type for agenthub-store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the store layer
#[derive(Debug)]
pub enum Error {
    /// Database operation failed
    Database(rusqlite::Error),

    /// IO operation failed (blob codec, database file)
    Io(std::io::Error),

    /// Stored JSON column could not be decoded
    Json(serde_json::Error),

    /// Stored value violated a closed set or timestamp format
    Corrupt(String),

    /// Deadline elapsed before the operation completed; in-flight work was
    /// interrupted and rolled back
    Timeout,

    /// Pool has shut down
    Closed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Database(err) => write!(f, "Database error: {}", err),
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Json(err) => write!(f, "Stored JSON error: {}", err),
            Error::Corrupt(msg) => write!(f, "Corrupt stored value: {}", msg),
            Error::Timeout => write!(f, "Database deadline exceeded"),
            Error::Closed => write!(f, "Database pool is closed"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Database(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
            Error::Corrupt(_) | Error::Timeout | Error::Closed => None,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl Error {
    /// Busy/locked failures are transient and worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}
