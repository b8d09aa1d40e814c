//! Small extraction and validation helpers shared by the handlers.
//! Input keys are snake_case throughout the surface.

use axum::extract::FromRequestParts;
use axum::extract::connect_info::ConnectInfo;
use axum::http::request::Parts;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ApiError;

/// Parses a closed-set field, reporting the offending field on failure.
pub fn parse_field<T>(raw: &str, field: &'static str) -> Result<T, ApiError>
where
    T: FromStr<Err = agenthub_types::Error>,
{
    raw.parse()
        .map_err(|e: agenthub_types::Error| ApiError::invalid_field(field, e.to_string()))
}

pub fn parse_field_opt<T>(raw: Option<&str>, field: &'static str) -> Result<Option<T>, ApiError>
where
    T: FromStr<Err = agenthub_types::Error>,
{
    raw.map(|r| parse_field(r, field)).transpose()
}

pub fn parse_id(raw: &str, field: &'static str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::invalid_field(field, "not a valid id"))
}

pub fn require<T>(value: Option<T>, field: &'static str) -> Result<T, ApiError> {
    value.ok_or_else(|| ApiError::invalid_field(field, "is required"))
}

/// Source identity for rate limiting: `x-forwarded-for` when fronted by a
/// proxy, the socket peer otherwise, `local` for in-process tests.
pub struct SourceIp(pub String);

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for SourceIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(forwarded) = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
        {
            if let Some(first) = forwarded.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return Ok(SourceIp(first.to_string()));
                }
            }
        }
        if let Some(ConnectInfo(addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            return Ok(SourceIp(addr.ip().to_string()));
        }
        Ok(SourceIp("local".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenthub_types::PromptType;

    #[test]
    fn parse_field_reports_the_field() {
        let err = parse_field::<PromptType>("urgent", "prompt_type").unwrap_err();
        match err {
            ApiError::Validation { details, .. } => {
                assert_eq!(details[0].field, "prompt_type");
            }
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(parse_field::<PromptType>("debug", "prompt_type").is_ok());
    }

    #[test]
    fn require_flags_missing_fields() {
        assert!(require(Some(1), "x").is_ok());
        assert!(require::<i32>(None, "x").is_err());
    }
}
