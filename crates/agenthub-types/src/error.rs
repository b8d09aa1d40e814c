use std::fmt;

/// Result type for agenthub-types operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur when parsing closed-set values
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Value outside a closed enum set
    UnknownValue { field: &'static str, value: String },

    /// Channel key not one of the five allowed shapes
    InvalidChannel(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnknownValue { field, value } => {
                write!(f, "Unknown {} value: {}", field, value)
            }
            Error::InvalidChannel(raw) => write!(f, "Invalid channel: {}", raw),
        }
    }
}

impl std::error::Error for Error {}
