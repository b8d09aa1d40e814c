use std::fmt;

/// Result type for agenthub-auth operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur when signing or verifying tokens
#[derive(Debug)]
pub enum Error {
    /// Token structure or payload could not be parsed
    Malformed(String),

    /// Signature did not verify under the configured secret
    Signature,

    /// Claims verified but the expiration is past
    Expired,

    /// Claims could not be serialized
    Encode(serde_json::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Malformed(msg) => write!(f, "Malformed token: {}", msg),
            Error::Signature => write!(f, "Token signature verification failed"),
            Error::Expired => write!(f, "Token is expired"),
            Error::Encode(err) => write!(f, "Claims encoding failed: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Encode(err) => Some(err),
            Error::Malformed(_) | Error::Signature | Error::Expired => None,
        }
    }
}
