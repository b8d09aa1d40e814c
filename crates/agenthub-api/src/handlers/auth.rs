use agenthub_auth::TokenClaims;
use axum::Json;
use axum::extract::State;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::extract::SourceIp;
use crate::state::ApiState;

#[derive(Debug, Deserialize)]
pub struct TokenBody {
    pub agent_id: String,
    pub session_id: Option<String>,
}

/// POST /api/auth/token — HMAC-signed agent token, one hour TTL, ten
/// requests per fifteen minutes per source IP.
pub async fn token(
    State(state): State<Arc<ApiState>>,
    SourceIp(source): SourceIp,
    Json(body): Json<TokenBody>,
) -> ApiResult<Json<serde_json::Value>> {
    if body.agent_id.trim().is_empty() {
        return Err(ApiError::invalid_field("agent_id", "is required"));
    }

    if let Err(retry_after) = state.token_limiter.check(&source) {
        return Err(ApiError::RateLimited {
            retry_after_secs: retry_after.as_secs().max(1),
        });
    }

    let claims = TokenClaims::issue(&body.agent_id, body.session_id.clone(), Utc::now());
    let token = agenthub_auth::sign(&claims, &state.auth_secret)
        .map_err(|e| ApiError::Internal(format!("token signing failed: {}", e)))?;

    Ok(Json(json!({
        "token": token,
        "agent_id": claims.agent_id,
        "session_id": claims.session_id,
        "issued_at": claims.iat,
        "expires_at": claims.exp,
    })))
}
