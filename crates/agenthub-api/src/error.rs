use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;

/// Result type for API handlers
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Per-field validation detail
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Handler-boundary error taxonomy. Everything below maps onto exactly one
/// HTTP status and a stable error code.
#[derive(Debug)]
pub enum ApiError {
    Validation {
        message: String,
        details: Vec<FieldError>,
    },
    NotFound(String),
    Conflict(String),
    RateLimited {
        retry_after_secs: u64,
    },
    Auth(String),
    Timeout,
    /// Dependency failures; detail is logged, production responses stay terse
    Internal(String),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let field = field.into();
        let message = message.into();
        ApiError::Validation {
            message: "Validation failed".to_string(),
            details: vec![FieldError { field, message }],
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        ApiError::NotFound(what.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::Timeout | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Validation { .. } => "VALIDATION_FAILED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::RateLimited { .. } => "RATE_LIMITED",
            ApiError::Auth(_) => "UNAUTHORIZED",
            ApiError::Timeout => "TIMEOUT",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Renders with full detail; the production mode filter happens in
    /// [`into_response_for_mode`](Self::into_response_for_mode).
    fn body(&self, terse_internal: bool) -> serde_json::Value {
        match self {
            ApiError::Validation { message, details } => json!({
                "error": message,
                "code": self.code(),
                "details": details,
            }),
            ApiError::NotFound(what) => json!({
                "error": format!("{} not found", what),
                "code": self.code(),
            }),
            ApiError::Conflict(message) => json!({
                "error": message,
                "code": self.code(),
            }),
            ApiError::RateLimited { retry_after_secs } => json!({
                "error": "Rate limit exceeded",
                "code": self.code(),
                "retry_after_secs": retry_after_secs,
            }),
            ApiError::Auth(message) => json!({
                "error": message,
                "code": self.code(),
            }),
            ApiError::Timeout => json!({
                "error": "Deadline exceeded",
                "code": self.code(),
            }),
            ApiError::Internal(detail) => {
                if terse_internal {
                    json!({ "error": "Internal server error", "code": self.code() })
                } else {
                    json!({ "error": detail, "code": self.code() })
                }
            }
        }
    }

}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(detail) = &self {
            tracing::error!("internal error: {}", detail);
        }
        // production deployments redact 5xx bodies in the router layer
        (self.status(), Json(self.body(false))).into_response()
    }
}

impl From<agenthub_store::Error> for ApiError {
    fn from(err: agenthub_store::Error) -> Self {
        match err {
            agenthub_store::Error::Timeout => ApiError::Timeout,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<agenthub_brief::Error> for ApiError {
    fn from(err: agenthub_brief::Error) -> Self {
        match err {
            agenthub_brief::Error::SessionNotFound(id) => {
                ApiError::NotFound(format!("session {}", id))
            }
            agenthub_brief::Error::Store(store) => store.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_match_taxonomy() {
        assert_eq!(ApiError::validation("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::not_found("session").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Conflict("dup".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::RateLimited { retry_after_secs: 1 }.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(ApiError::Auth("no".into()).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Timeout.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn field_details_are_reported() {
        let err = ApiError::invalid_field("prompt_type", "unknown value: urgent");
        let body = err.body(false);
        assert_eq!(body["code"], "VALIDATION_FAILED");
        assert_eq!(body["details"][0]["field"], "prompt_type");
    }

    #[test]
    fn production_hides_internal_detail() {
        let err = ApiError::Internal("database file is on fire".into());
        assert_eq!(err.body(true)["error"], "Internal server error");
        assert_eq!(err.body(false)["error"], "database file is on fire");
    }
}
