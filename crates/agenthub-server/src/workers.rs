//! Interval-driven background jobs. Every tick swallows and logs its own
//! errors; a failing store never terminates a worker.

use agenthub_realtime::FanoutHub;
use agenthub_store::{Database, queries};
use agenthub_types::ChannelKey;
use chrono::{Duration as ChronoDuration, Utc};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::Config;

const MESSAGE_EXPIRY_INTERVAL: Duration = Duration::from_secs(60);
const METRIC_INTERVAL: Duration = Duration::from_secs(5);
const WORKER_DB_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub message_expiry_interval: Duration,
    pub cleanup_interval: Duration,
    pub metric_interval: Duration,
    pub healthcheck_interval: Duration,
    pub read_message_max_age: ChronoDuration,
    pub snapshot_max_age: ChronoDuration,
    pub stale_after: ChronoDuration,
}

impl WorkerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            message_expiry_interval: MESSAGE_EXPIRY_INTERVAL,
            cleanup_interval: Duration::from_secs(config.cleanup_interval_secs.max(1)),
            metric_interval: METRIC_INTERVAL,
            healthcheck_interval: Duration::from_secs(config.healthcheck_secs.max(1)),
            read_message_max_age: ChronoDuration::hours(config.read_message_max_hours),
            snapshot_max_age: ChronoDuration::hours(config.snapshot_max_hours),
            stale_after: ChronoDuration::minutes(config.stale_minutes),
        }
    }
}

/// Spawns the four periodic workers; abort the handles on shutdown.
pub fn spawn_workers(db: Database, hub: FanoutHub, config: WorkerConfig) -> Vec<JoinHandle<()>> {
    vec![
        spawn_message_expiry(db.clone(), config.clone()),
        spawn_cleanup(db.clone(), config.clone()),
        spawn_metrics(db.clone(), hub, config.clone()),
        spawn_healthcheck(db, config),
    ]
}

fn spawn_message_expiry(db: Database, config: WorkerConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(config.message_expiry_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            let read_cutoff = Utc::now() - config.read_message_max_age;
            let result = db
                .with_conn(WORKER_DB_DEADLINE, move |conn| {
                    let expired = queries::message::delete_expired(conn, Utc::now())?;
                    let aged = queries::message::delete_read_older_than(conn, read_cutoff)?;
                    Ok((expired, aged))
                })
                .await;
            match result {
                Ok((0, 0)) => {}
                Ok((expired, aged)) => {
                    tracing::info!(expired, aged_out = aged, "message expiry sweep");
                }
                Err(e) => tracing::warn!("message expiry sweep failed: {}", e),
            }
        }
    })
}

fn spawn_cleanup(db: Database, config: WorkerConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(config.cleanup_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tick.tick().await;

            let snapshot_cutoff = Utc::now() - config.snapshot_max_age;
            match db
                .with_conn(WORKER_DB_DEADLINE, move |conn| {
                    queries::context::delete_snapshots_older_than(conn, snapshot_cutoff)
                })
                .await
            {
                Ok(0) => {}
                Ok(purged) => tracing::info!(purged, "compact snapshots aged out"),
                Err(e) => tracing::warn!("snapshot age-out failed: {}", e),
            }

            let stale_cutoff = Utc::now() - config.stale_after;
            match db
                .with_conn(WORKER_DB_DEADLINE, move |conn| {
                    queries::session::end_stale(conn, stale_cutoff, Utc::now())
                })
                .await
            {
                Ok(closed) => {
                    for session_id in closed {
                        tracing::info!(session = %session_id, "stale session closed");
                        db.notifier().notify(
                            ChannelKey::session(&session_id).to_string(),
                            "session.ended",
                            serde_json::json!({ "id": session_id, "reason": "stale" }),
                        );
                    }
                }
                Err(e) => tracing::warn!("stale session sweep failed: {}", e),
            }
        }
    })
}

fn spawn_metrics(db: Database, hub: FanoutHub, config: WorkerConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(config.metric_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            match db
                .with_conn(WORKER_DB_DEADLINE, |conn| {
                    queries::stats::metric_snapshot(conn, Utc::now())
                })
                .await
            {
                Ok(snapshot) => {
                    let data = serde_json::to_value(&snapshot).unwrap_or(serde_json::Value::Null);
                    hub.publish(&ChannelKey::Metrics.to_string(), "metric.update", data);
                }
                Err(e) => tracing::warn!("metric snapshot failed: {}", e),
            }
        }
    })
}

fn spawn_healthcheck(db: Database, config: WorkerConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(config.healthcheck_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            let probe = db
                .with_conn(WORKER_DB_DEADLINE, |conn| {
                    Ok(conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?)
                })
                .await;
            match probe {
                Ok(_) => tracing::debug!("store healthcheck ok"),
                Err(e) => tracing::warn!("store healthcheck failed: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenthub_realtime::HubConfig;
    use agenthub_store::queries::message::NewMessage;
    use agenthub_types::{MessageType, Topic};

    fn fast_config() -> WorkerConfig {
        WorkerConfig {
            message_expiry_interval: Duration::from_millis(30),
            cleanup_interval: Duration::from_millis(30),
            metric_interval: Duration::from_millis(30),
            healthcheck_interval: Duration::from_secs(60),
            read_message_max_age: ChronoDuration::hours(24),
            snapshot_max_age: ChronoDuration::hours(24),
            stale_after: ChronoDuration::minutes(30),
        }
    }

    #[tokio::test]
    async fn expired_messages_are_swept() {
        let db = Database::open_in_memory(2).unwrap();
        db.with_conn(Duration::from_secs(5), |conn| {
            queries::message::insert(
                conn,
                &NewMessage {
                    project_id: None,
                    from_agent: None,
                    to_agent: Some("a"),
                    topic: Topic::General,
                    message_type: MessageType::Info,
                    payload: None,
                    priority: 5,
                    expires_at: Some(Utc::now() - ChronoDuration::seconds(5)),
                },
                Utc::now() - ChronoDuration::minutes(1),
            )?;
            Ok(())
        })
        .await
        .unwrap();

        let hub = FanoutHub::new(HubConfig::default());
        let workers = spawn_workers(db.clone(), hub, fast_config());
        tokio::time::sleep(Duration::from_millis(120)).await;
        for worker in &workers {
            worker.abort();
        }

        let remaining: i64 = db
            .with_conn(Duration::from_secs(5), |conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM agent_messages", [], |r| r.get(0))?)
            })
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn metric_updates_reach_the_metrics_channel() {
        let db = Database::open_in_memory(2).unwrap();
        let hub = FanoutHub::new(HubConfig::default());
        let (client, mut rx) = hub.connect();
        hub.authenticate(&client, "dashboard", None).unwrap();
        hub.subscribe_channel(&client, &"metrics".parse().unwrap()).unwrap();

        let workers = spawn_workers(db, hub, fast_config());
        let frame = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match rx.recv().await {
                    Some(agenthub_realtime::ServerFrame::Event { channel, event, .. })
                        if event == "metric.update" =>
                    {
                        return channel;
                    }
                    Some(_) => continue,
                    None => panic!("queue closed"),
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(frame, "metrics");
        for worker in &workers {
            worker.abort();
        }
    }
}
