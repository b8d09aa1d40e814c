//! Daemon wiring: one embedded store, the HTTP API listener, the realtime
//! WebSocket listener, the notification bridge and the periodic workers, all
//! in one process.

pub mod config;
pub mod workers;

use agenthub_api::{ApiState, Mode as ApiMode};
use agenthub_realtime::{AuthMode, AuthPolicy, FanoutHub, HubConfig, RealtimeState};
use agenthub_store::Database;
use anyhow::Context;
use axum::http::HeaderValue;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use config::Config;
use workers::{WorkerConfig, spawn_workers};

/// Builds and serves both surfaces until ctrl-c or a listener error.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let db = Database::open(&config.db_path, config.pool_size, config.db_max_retries)
        .with_context(|| format!("opening store at {}", config.db_path.display()))?;
    tracing::info!(path = %config.db_path.display(), pool = config.pool_size, "store opened");

    let hub = FanoutHub::new(HubConfig::default());
    let maintenance = hub.spawn_maintenance();

    let notifier = db.notifier().clone();
    let bridge = tokio::spawn(agenthub_realtime::run_bridge(
        move || notifier.subscribe(),
        hub.clone(),
    ));

    let worker_handles = spawn_workers(db.clone(), hub.clone(), WorkerConfig::from_config(&config));

    let api_mode = if config.is_production() {
        ApiMode::Production
    } else {
        ApiMode::Development
    };
    let mut api_state = ApiState::new(db.clone(), api_mode, &config.auth_secret).with_hub(hub.clone());
    api_state.inactive_minutes = config.inactive_minutes;
    api_state.default_message_ttl_secs = config.message_ttl_secs;
    let api_router = agenthub_api::router(Arc::new(api_state)).layer(cors_layer(&config)?);

    let auth_mode = if config.is_production() {
        AuthMode::Production
    } else {
        AuthMode::Development
    };
    let realtime_state = Arc::new(RealtimeState::new(
        hub.clone(),
        AuthPolicy {
            mode: auth_mode,
            secret: config.auth_secret.clone(),
        },
    ));

    let api_listener = TcpListener::bind((config.api_host.as_str(), config.api_port))
        .await
        .with_context(|| format!("binding API listener on port {}", config.api_port))?;
    let realtime_listener = TcpListener::bind((config.api_host.as_str(), config.realtime_port))
        .await
        .with_context(|| format!("binding realtime listener on port {}", config.realtime_port))?;
    tracing::info!(
        api = %api_listener.local_addr()?,
        realtime = %realtime_listener.local_addr()?,
        "agenthubd listening"
    );

    let result = tokio::select! {
        r = axum::serve(api_listener, api_router) => r.context("API server"),
        r = agenthub_realtime::run_on_listener(realtime_listener, realtime_state) => {
            r.context("realtime server")
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            Ok(())
        }
    };

    bridge.abort();
    maintenance.abort();
    for worker in worker_handles {
        worker.abort();
    }
    result
}

fn cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    if config.cors_origins.iter().any(|o| o == "*") {
        // wildcard already rejected for production by config validation
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any));
    }
    let origins = config
        .cors_origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .with_context(|| format!("invalid CORS origin {:?}", origin))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any))
}
