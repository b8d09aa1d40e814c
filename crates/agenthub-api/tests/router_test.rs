//! Router-level tests driven through tower without binding a socket.

use agenthub_api::{ApiState, Mode, router};
use agenthub_store::Database;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

fn dev_state() -> Arc<ApiState> {
    let db = Database::open_in_memory(2).unwrap();
    Arc::new(ApiState::new(
        db,
        Mode::Development,
        "router-test-secret-0123456789abcdef",
    ))
}

async fn call(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn post(path: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_reports_database_up() {
    let app = router(dev_state());
    let (status, body) = call(app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "up");
    assert_eq!(body["realtime"]["status"], "detached");
}

#[tokio::test]
async fn validation_errors_carry_field_detail() {
    let app = router(dev_state());
    let (status, body) = call(
        app,
        post(
            "/api/messages",
            json!({ "topic": "breakroom", "to_agent": "a" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Validation failed");
    assert_eq!(body["code"], "VALIDATION_FAILED");
    assert_eq!(body["details"][0]["field"], "topic");
}

#[tokio::test]
async fn unknown_entities_return_not_found() {
    let app = router(dev_state());
    let (status, body) = call(
        app,
        get("/api/requests/00000000-0000-4000-8000-000000000000"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn stats_counts_grow_with_writes() {
    let state = dev_state();
    let app = router(state.clone());

    let (status, _) = call(
        app.clone(),
        post("/api/projects", json!({ "path": "/tmp/oneshot" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, stats) = call(app, get("/stats")).await;
    assert_eq!(stats["projects"], 1);
}

#[tokio::test]
async fn mutations_land_on_the_wake_channel() {
    let state = dev_state();
    let mut wake = state.db.notifier().subscribe();
    let app = router(state);

    let (status, _) = call(
        app,
        post("/api/projects", json!({ "path": "/tmp/wake" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let envelope = wake.try_recv().unwrap();
    assert_eq!(envelope.channel, "global");
    assert_eq!(envelope.event, "project.created");
    assert_eq!(envelope.data["path"], "/tmp/wake");
}

#[tokio::test]
async fn production_redacts_internal_errors() {
    // a closed pool produces a dependency error; production must hide detail
    let db = Database::open_in_memory(1).unwrap();
    let state = Arc::new(ApiState::new(
        db,
        Mode::Production,
        "router-test-secret-0123456789abcdef",
    ));
    let app = router(state);

    // malformed uuid is still a 400 with full detail (not internal)
    let (status, body) = call(app.clone(), get("/api/requests/not-a-uuid")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");
}
