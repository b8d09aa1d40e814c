use agenthub_api::{ApiState, Mode};
use agenthub_realtime::{AuthMode, AuthPolicy, FanoutHub, HubConfig, RealtimeState};
use agenthub_store::Database;
use anyhow::{Context, Result};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::ws::WsClient;

pub const TEST_SECRET: &str = "integration-test-secret-0123456789abcdef";

/// Builder for worlds that need non-default modes or hub timing.
pub struct TestWorldBuilder {
    mode: Mode,
    hub_config: HubConfig,
    message_ttl_secs: Option<i64>,
}

impl TestWorldBuilder {
    pub fn new() -> Self {
        Self {
            mode: Mode::Development,
            hub_config: HubConfig::default(),
            message_ttl_secs: None,
        }
    }

    /// Production mode: token-only realtime auth, terse 5xx bodies.
    pub fn production(mut self) -> Self {
        self.mode = Mode::Production;
        self
    }

    /// Shrinks the hub's retry/ack/idle timing for fast delivery tests.
    pub fn hub_config(mut self, config: HubConfig) -> Self {
        self.hub_config = config;
        self
    }

    pub fn message_ttl_secs(mut self, ttl: i64) -> Self {
        self.message_ttl_secs = Some(ttl);
        self
    }

    pub async fn build(self) -> Result<TestWorld> {
        let db = Database::open_in_memory(4).context("opening in-memory store")?;
        let hub = FanoutHub::new(self.hub_config);
        let maintenance = hub.spawn_maintenance();

        let notifier = db.notifier().clone();
        let bridge = tokio::spawn(agenthub_realtime::run_bridge(
            move || notifier.subscribe(),
            hub.clone(),
        ));

        let mut api_state =
            ApiState::new(db.clone(), self.mode, TEST_SECRET).with_hub(hub.clone());
        api_state.default_message_ttl_secs = self.message_ttl_secs;
        let api_router = agenthub_api::router(Arc::new(api_state));

        let auth_mode = match self.mode {
            Mode::Production => AuthMode::Production,
            Mode::Development => AuthMode::Development,
        };
        let realtime_state = Arc::new(RealtimeState::new(
            hub.clone(),
            AuthPolicy {
                mode: auth_mode,
                secret: TEST_SECRET.to_string(),
            },
        ));

        let api_listener = TcpListener::bind("127.0.0.1:0").await?;
        let api_addr = api_listener.local_addr()?;
        let realtime_listener = TcpListener::bind("127.0.0.1:0").await?;
        let realtime_addr = realtime_listener.local_addr()?;

        let api_task = tokio::spawn(async move {
            let _ = axum::serve(api_listener, api_router).await;
        });
        let realtime_task = tokio::spawn(async move {
            let _ = agenthub_realtime::run_on_listener(realtime_listener, realtime_state).await;
        });

        Ok(TestWorld {
            db,
            hub,
            api_addr,
            realtime_addr,
            http: reqwest::Client::new(),
            handles: vec![maintenance, bridge, api_task, realtime_task],
        })
    }
}

impl Default for TestWorldBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct TestWorld {
    pub db: Database,
    pub hub: FanoutHub,
    pub api_addr: SocketAddr,
    pub realtime_addr: SocketAddr,
    pub http: reqwest::Client,
    handles: Vec<JoinHandle<()>>,
}

impl TestWorld {
    /// Development-mode world with default hub timing.
    pub async fn start() -> Result<Self> {
        TestWorldBuilder::new().build().await
    }

    pub fn builder() -> TestWorldBuilder {
        TestWorldBuilder::new()
    }

    pub fn api_url(&self, path: &str) -> String {
        format!("http://{}{}", self.api_addr, path)
    }

    pub fn realtime_url(&self) -> String {
        format!("ws://{}/", self.realtime_addr)
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<reqwest::Response> {
        Ok(self
            .http
            .post(self.api_url(path))
            .json(&body)
            .send()
            .await?)
    }

    pub async fn patch(&self, path: &str, body: Value) -> Result<reqwest::Response> {
        Ok(self
            .http
            .patch(self.api_url(path))
            .json(&body)
            .send()
            .await?)
    }

    pub async fn get(&self, path: &str) -> Result<reqwest::Response> {
        Ok(self.http.get(self.api_url(path)).send().await?)
    }

    /// POST and decode, asserting a 2xx status.
    pub async fn post_ok(&self, path: &str, body: Value) -> Result<Value> {
        let response = self.post(path, body).await?;
        let status = response.status();
        let value: Value = response.json().await?;
        anyhow::ensure!(
            status.is_success(),
            "POST {} returned {}: {}",
            path,
            status,
            value
        );
        Ok(value)
    }

    pub async fn get_ok(&self, path: &str) -> Result<Value> {
        let response = self.get(path).await?;
        let status = response.status();
        let value: Value = response.json().await?;
        anyhow::ensure!(
            status.is_success(),
            "GET {} returned {}: {}",
            path,
            status,
            value
        );
        Ok(value)
    }

    /// Opens a realtime connection; the `connected` frame is consumed.
    pub async fn connect_ws(&self) -> Result<WsClient> {
        WsClient::connect(&self.realtime_url()).await
    }

    /// Seeds the S1 fixture: project, session, request. Returns
    /// (project_id, request_id).
    pub async fn seed_session(&self, path: &str, session_id: &str) -> Result<(String, String)> {
        let project = self
            .post_ok("/api/projects", serde_json::json!({ "path": path }))
            .await?;
        let project_id = project["id"].as_str().context("project id")?.to_string();

        self.post_ok(
            "/api/sessions",
            serde_json::json!({ "session_id": session_id, "project_id": project_id }),
        )
        .await?;

        let request = self
            .post_ok(
                "/api/requests",
                serde_json::json!({
                    "project_id": project_id,
                    "session_id": session_id,
                    "prompt": "Add OAuth",
                    "prompt_type": "feature",
                }),
            )
            .await?;
        let request_id = request["id"].as_str().context("request id")?.to_string();

        Ok((project_id, request_id))
    }
}

impl Drop for TestWorld {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn world_boots_and_answers_health() {
        let world = TestWorld::start().await.unwrap();
        let health = world.get_ok("/health").await.unwrap();
        assert_eq!(health["database"], "up");
    }
}
