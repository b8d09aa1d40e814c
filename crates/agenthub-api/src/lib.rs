//! HTTP ingestion and query surface (axum).
//!
//! Every mutation handler follows one shape: validate against the closed
//! sets, run a single transaction on the store, then emit a best-effort wake
//! envelope. The wake channel feeds the notification bridge; query handlers
//! read directly.

pub mod error;
mod extract;
pub mod handlers;
mod notify;
mod rate_limit;
mod state;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use std::sync::Arc;

pub use error::{ApiError, ApiResult};
pub use rate_limit::RateLimiter;
pub use state::{ApiState, Mode};

pub fn router(state: Arc<ApiState>) -> Router {
    let production = state.is_production();
    let router = Router::new()
        // health and stats
        .route("/health", get(handlers::health::health))
        .route("/stats", get(handlers::health::stats))
        .route("/stats/tools-summary", get(handlers::health::tools_summary))
        .route("/api/cleanup/stats", get(handlers::health::cleanup_stats))
        // projects
        .route(
            "/api/projects",
            post(handlers::projects::create).get(handlers::projects::list),
        )
        .route("/api/projects/by-path", get(handlers::projects::by_path))
        .route("/api/projects/:id", get(handlers::projects::get))
        // requests
        .route(
            "/api/requests",
            post(handlers::requests::create).get(handlers::requests::list),
        )
        .route(
            "/api/requests/:id",
            get(handlers::requests::get).patch(handlers::requests::patch),
        )
        // task lists
        .route(
            "/api/tasks",
            post(handlers::tasks::create).get(handlers::tasks::list),
        )
        .route(
            "/api/tasks/:id",
            get(handlers::tasks::get).patch(handlers::tasks::patch),
        )
        // subtasks
        .route(
            "/api/subtasks",
            post(handlers::subtasks::create).get(handlers::subtasks::list),
        )
        .route(
            "/api/subtasks/:id",
            get(handlers::subtasks::get).patch(handlers::subtasks::patch),
        )
        // actions
        .route(
            "/api/actions",
            post(handlers::actions::create).get(handlers::actions::list),
        )
        .route("/api/actions/hourly", get(handlers::actions::hourly))
        // sessions
        .route(
            "/api/sessions",
            post(handlers::sessions::create).get(handlers::sessions::list),
        )
        .route("/api/sessions/stats", get(handlers::sessions::stats))
        .route(
            "/api/sessions/:id",
            get(handlers::sessions::get).patch(handlers::sessions::patch),
        )
        .route("/api/active-sessions", get(handlers::sessions::active))
        // messaging
        .route("/api/messages", post(handlers::messages::send))
        .route("/api/messages/:agent_id", get(handlers::messages::inbox))
        .route("/api/subscribe", post(handlers::subscriptions::subscribe))
        .route("/api/unsubscribe", post(handlers::subscriptions::unsubscribe))
        .route("/api/subscriptions", get(handlers::subscriptions::list))
        .route(
            "/api/subscriptions/:id",
            get(handlers::subscriptions::list_for_agent).delete(handlers::subscriptions::delete),
        )
        // blocking
        .route("/api/blocking", post(handlers::blocking::block))
        .route("/api/unblock", post(handlers::blocking::unblock))
        .route("/api/blocking/check", get(handlers::blocking::check))
        .route(
            "/api/blocking/:id",
            get(handlers::blocking::for_agent).delete(handlers::blocking::delete),
        )
        // routing intelligence
        .route("/api/routing/suggest", get(handlers::routing::suggest))
        .route("/api/routing/stats", get(handlers::routing::stats))
        .route("/api/routing/feedback", post(handlers::routing::feedback))
        // hierarchy
        .route("/api/hierarchy/:id", get(handlers::hierarchy::hierarchy))
        // context and compact cycle
        .route("/api/context/generate", post(handlers::context::generate))
        .route("/api/context/:agent_id", get(handlers::context::get))
        .route("/api/compact/save", post(handlers::context::compact_save))
        .route("/api/compact/restore", post(handlers::context::compact_restore))
        .route(
            "/api/compact/status/:session_id",
            get(handlers::context::compact_status),
        )
        .route(
            "/api/compact/snapshot/:session_id",
            get(handlers::context::compact_snapshot),
        )
        // auth
        .route("/api/auth/token", post(handlers::auth::token))
        .with_state(state);

    if production {
        router.layer(middleware::from_fn(redact_internal_errors))
    } else {
        router
    }
}

/// Production responses never leak dependency detail; the full error is in
/// the logs.
async fn redact_internal_errors(
    request: axum::extract::Request,
    next: middleware::Next,
) -> Response {
    let response = next.run(request).await;
    if response.status().is_server_error() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "error": "Internal server error",
                "code": "INTERNAL_ERROR",
            })),
        )
            .into_response();
    }
    response
}
