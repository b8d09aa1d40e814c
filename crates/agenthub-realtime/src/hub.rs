//! In-memory fanout hub: subscriber registry, channel rooms, and the
//! at-least-once retry queue for tracked events.
//!
//! Rooms live in sharded maps so a slow subscriber only ever stalls its own
//! bounded outbound queue; overflow evicts the subscriber instead of
//! back-pressuring delivery to everyone else.

use agenthub_types::{ChannelKey, is_known_event, is_tracked_event};
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::frames::ServerFrame;
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// How often retry queues and idle subscribers are scanned
    pub retry_scan_interval: Duration,
    /// Tracked events unacked for this long are resent
    pub ack_timeout: Duration,
    /// Resends before a tracked event is dropped with a warning
    pub max_resends: u32,
    /// Subscribers silent for this long are evicted
    pub idle_timeout: Duration,
    /// Outbound queue depth per subscriber; overflow evicts
    pub outbound_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            retry_scan_interval: Duration::from_secs(2),
            ack_timeout: Duration::from_secs(5),
            max_resends: 3,
            idle_timeout: Duration::from_secs(60),
            outbound_buffer: 256,
        }
    }
}

struct Pending {
    id: String,
    channel: String,
    event: String,
    data: Value,
    sent_at: Instant,
    resends: u32,
}

struct Subscriber {
    agent_id: Option<String>,
    session_id: Option<String>,
    tx: mpsc::Sender<ServerFrame>,
    last_seen: Mutex<Instant>,
    retry: Mutex<Vec<Pending>>,
}

impl Subscriber {
    fn is_authenticated(&self) -> bool {
        self.agent_id.is_some()
    }
}

struct Inner {
    config: HubConfig,
    subscribers: DashMap<String, Subscriber>,
    rooms: DashMap<String, HashSet<String>>,
}

/// Cheap to clone; all clones share the same registry.
#[derive(Clone)]
pub struct FanoutHub {
    inner: Arc<Inner>,
}

impl FanoutHub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                subscribers: DashMap::new(),
                rooms: DashMap::new(),
            }),
        }
    }

    /// Registers a connection and returns its id plus the outbound queue the
    /// transport writer drains.
    pub fn connect(&self) -> (String, mpsc::Receiver<ServerFrame>) {
        let client_id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(self.inner.config.outbound_buffer);
        self.inner.subscribers.insert(
            client_id.clone(),
            Subscriber {
                agent_id: None,
                session_id: None,
                tx,
                last_seen: Mutex::new(Instant::now()),
                retry: Mutex::new(Vec::new()),
            },
        );
        (client_id, rx)
    }

    /// Marks the subscriber authenticated, auto-joins `global`,
    /// `agents/{id}` and (when known) `sessions/{id}`, then announces the
    /// agent on `global`.
    pub fn authenticate(
        &self,
        client_id: &str,
        agent_id: &str,
        session_id: Option<&str>,
    ) -> Result<()> {
        {
            let mut subscriber = self
                .inner
                .subscribers
                .get_mut(client_id)
                .ok_or_else(|| Error::UnknownSubscriber(client_id.to_string()))?;
            subscriber.agent_id = Some(agent_id.to_string());
            subscriber.session_id = session_id.map(str::to_string);
        }

        self.join(client_id, &ChannelKey::Global);
        self.join(client_id, &ChannelKey::agent(agent_id));
        if let Some(session) = session_id {
            self.join(client_id, &ChannelKey::session(session));
        }

        self.publish(
            &ChannelKey::Global.to_string(),
            "agent.connected",
            serde_json::json!({ "agent_id": agent_id, "client_id": client_id }),
        );
        Ok(())
    }

    pub fn is_authenticated(&self, client_id: &str) -> bool {
        self.inner
            .subscribers
            .get(client_id)
            .is_some_and(|s| s.is_authenticated())
    }

    /// Joins an extra channel. The key has already been shape-checked by the
    /// caller (parse the raw string first).
    pub fn subscribe_channel(&self, client_id: &str, key: &ChannelKey) -> Result<()> {
        if !self.inner.subscribers.contains_key(client_id) {
            return Err(Error::UnknownSubscriber(client_id.to_string()));
        }
        self.join(client_id, key);
        Ok(())
    }

    pub fn unsubscribe_channel(&self, client_id: &str, key: &ChannelKey) {
        let channel = key.to_string();
        if let Some(mut room) = self.inner.rooms.get_mut(&channel) {
            room.remove(client_id);
        }
        self.inner.rooms.remove_if(&channel, |_, members| members.is_empty());
    }

    fn join(&self, client_id: &str, key: &ChannelKey) {
        self.inner
            .rooms
            .entry(key.to_string())
            .or_default()
            .insert(client_id.to_string());
    }

    /// Client-initiated publish: channel shape and event name are validated,
    /// nothing is persisted.
    pub fn client_publish(
        &self,
        client_id: &str,
        channel: &str,
        event: &str,
        data: Value,
    ) -> Result<usize> {
        if !self.is_authenticated(client_id) {
            return Err(Error::NotAuthenticated);
        }
        let key: ChannelKey = channel.parse()?;
        if !is_known_event(event) {
            return Err(Error::UnknownEvent(event.to_string()));
        }
        Ok(self.publish(&key.to_string(), event, data))
    }

    /// Routes one event to every subscriber of the channel. Tracked events
    /// (task.*, subtask.*, message.*) get a delivery id and enter the
    /// per-subscriber retry queue. Returns the number of queued deliveries.
    pub fn publish(&self, channel: &str, event: &str, data: Value) -> usize {
        let members: Vec<String> = match self.inner.rooms.get(channel) {
            Some(room) => room.iter().cloned().collect(),
            None => return 0,
        };

        let tracked = is_tracked_event(event);
        let mut delivered = 0;
        let mut to_evict = Vec::new();

        for member in members {
            let Some(subscriber) = self.inner.subscribers.get(&member) else {
                continue;
            };
            let message_id = tracked.then(|| Uuid::new_v4().to_string());
            let frame = ServerFrame::event(channel, event, data.clone(), message_id.clone());

            match subscriber.tx.try_send(frame) {
                Ok(()) => {
                    delivered += 1;
                    if let Some(id) = message_id {
                        subscriber
                            .retry
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner())
                            .push(Pending {
                                id,
                                channel: channel.to_string(),
                                event: event.to_string(),
                                data: data.clone(),
                                sent_at: Instant::now(),
                                resends: 0,
                            });
                    }
                }
                Err(_) => {
                    tracing::warn!(subscriber = %member, channel, "outbound queue overflow, evicting subscriber");
                    to_evict.push(member.clone());
                }
            }
        }

        for member in to_evict {
            self.disconnect(&member);
        }
        delivered
    }

    /// Queues a control frame (ack, pong, error) behind any events already
    /// queued for the subscriber.
    pub fn send_to(&self, client_id: &str, frame: ServerFrame) {
        if let Some(subscriber) = self.inner.subscribers.get(client_id) {
            let _ = subscriber.tx.try_send(frame);
        }
    }

    /// Acknowledges a tracked delivery; the entry is never resent afterwards.
    pub fn ack(&self, client_id: &str, message_id: &str) {
        if let Some(subscriber) = self.inner.subscribers.get(client_id) {
            subscriber
                .retry
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .retain(|p| p.id != message_id);
        }
    }

    /// Records inbound traffic for the idle sweep.
    pub fn touch(&self, client_id: &str) {
        if let Some(subscriber) = self.inner.subscribers.get(client_id) {
            *subscriber
                .last_seen
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()) = Instant::now();
        }
    }

    /// Removes a subscriber and its memberships; announces the departure
    /// when the subscriber had authenticated.
    pub fn disconnect(&self, client_id: &str) {
        let Some((_, subscriber)) = self.inner.subscribers.remove(client_id) else {
            return;
        };

        let channels: Vec<String> = self.inner.rooms.iter().map(|r| r.key().clone()).collect();
        for channel in channels {
            if let Some(mut room) = self.inner.rooms.get_mut(&channel) {
                room.remove(client_id);
            }
            self.inner.rooms.remove_if(&channel, |_, members| members.is_empty());
        }

        if let Some(agent_id) = subscriber.agent_id {
            self.publish(
                &ChannelKey::Global.to_string(),
                "agent.disconnected",
                serde_json::json!({ "agent_id": agent_id, "client_id": client_id }),
            );
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Spawns the maintenance loop: retry-queue scan plus idle eviction on
    /// every tick. Abort the handle to stop it.
    pub fn spawn_maintenance(&self) -> tokio::task::JoinHandle<()> {
        let hub = self.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(hub.inner.config.retry_scan_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                hub.scan_retries();
                hub.sweep_idle();
            }
        })
    }

    fn scan_retries(&self) {
        let config = &self.inner.config;
        let mut to_evict = Vec::new();

        for subscriber in self.inner.subscribers.iter() {
            let mut retry = subscriber
                .retry
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let mut kept = Vec::with_capacity(retry.len());
            for mut pending in retry.drain(..) {
                if pending.sent_at.elapsed() < config.ack_timeout {
                    kept.push(pending);
                    continue;
                }
                if pending.resends >= config.max_resends {
                    tracing::warn!(
                        subscriber = %subscriber.key(),
                        message_id = %pending.id,
                        event = %pending.event,
                        resends = pending.resends,
                        "tracked event exhausted retries, dropping"
                    );
                    continue;
                }
                let frame = ServerFrame::event(
                    pending.channel.clone(),
                    pending.event.clone(),
                    pending.data.clone(),
                    Some(pending.id.clone()),
                );
                match subscriber.tx.try_send(frame) {
                    Ok(()) => {
                        pending.resends += 1;
                        pending.sent_at = Instant::now();
                        kept.push(pending);
                    }
                    Err(_) => {
                        to_evict.push(subscriber.key().clone());
                        kept.push(pending);
                        break;
                    }
                }
            }
            *retry = kept;
        }

        for member in to_evict {
            self.disconnect(&member);
        }
    }

    fn sweep_idle(&self) {
        let idle_timeout = self.inner.config.idle_timeout;
        let idle: Vec<String> = self
            .inner
            .subscribers
            .iter()
            .filter(|s| {
                s.last_seen
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .elapsed()
                    > idle_timeout
            })
            .map(|s| s.key().clone())
            .collect();

        for member in idle {
            tracing::info!(subscriber = %member, "evicting idle subscriber");
            self.disconnect(&member);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::Receiver;

    fn test_config() -> HubConfig {
        HubConfig {
            retry_scan_interval: Duration::from_millis(20),
            ack_timeout: Duration::from_millis(50),
            max_resends: 3,
            idle_timeout: Duration::from_secs(60),
            outbound_buffer: 8,
        }
    }

    async fn next_event(rx: &mut Receiver<ServerFrame>) -> (String, String, Option<String>) {
        loop {
            match rx.recv().await.expect("channel open") {
                ServerFrame::Event {
                    channel, event, id, ..
                } => return (channel, event, id),
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn auth_joins_default_channels_and_announces() {
        let hub = FanoutHub::new(test_config());
        let (client, mut rx) = hub.connect();
        hub.authenticate(&client, "backend", Some("s1")).unwrap();

        // the subscriber is in global when its own announcement goes out
        let (channel, event, _) = next_event(&mut rx).await;
        assert_eq!(channel, "global");
        assert_eq!(event, "agent.connected");

        hub.publish("agents/backend", "context.updated", serde_json::json!({}));
        let (channel, event, _) = next_event(&mut rx).await;
        assert_eq!(channel, "agents/backend");
        assert_eq!(event, "context.updated");

        hub.publish("sessions/s1", "session.updated", serde_json::json!({}));
        let (channel, _, _) = next_event(&mut rx).await;
        assert_eq!(channel, "sessions/s1");
    }

    #[tokio::test]
    async fn topic_publish_reaches_only_topic_subscribers() {
        let hub = FanoutHub::new(test_config());
        let (a, mut rx_a) = hub.connect();
        let (b, mut rx_b) = hub.connect();
        hub.authenticate(&a, "backend", None).unwrap();
        hub.authenticate(&b, "frontend", None).unwrap();
        hub.subscribe_channel(&b, &"topics/api_endpoint_created".parse().unwrap())
            .unwrap();

        // drain the two connection announcements from both queues
        for rx in [&mut rx_a, &mut rx_b] {
            while let Ok(frame) = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await {
                match frame {
                    Some(ServerFrame::Event { event, .. }) if event == "agent.connected" => continue,
                    _ => break,
                }
            }
        }

        let delivered = hub.publish(
            "topics/api_endpoint_created",
            "message.sent",
            serde_json::json!({"topic": "api_endpoint_created"}),
        );
        assert_eq!(delivered, 1);

        let (channel, event, id) = next_event(&mut rx_b).await;
        assert_eq!(channel, "topics/api_endpoint_created");
        assert_eq!(event, "message.sent");
        assert!(id.is_some(), "tracked event must carry a delivery id");

        // subscriber A is not on the topic channel
        assert!(
            tokio::time::timeout(Duration::from_millis(50), next_event(&mut rx_a))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn acked_delivery_is_never_resent() {
        let hub = FanoutHub::new(test_config());
        let (client, mut rx) = hub.connect();
        hub.authenticate(&client, "backend", None).unwrap();
        let _ = next_event(&mut rx).await; // agent.connected

        hub.publish("agents/backend", "message.sent", serde_json::json!({}));
        let (_, _, id) = next_event(&mut rx).await;
        hub.ack(&client, &id.unwrap());

        let _maintenance = hub.spawn_maintenance();
        // well past the ack timeout; nothing further may arrive
        assert!(
            tokio::time::timeout(Duration::from_millis(200), next_event(&mut rx))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn unacked_delivery_is_resent_at_most_three_times() {
        let hub = FanoutHub::new(test_config());
        let (client, mut rx) = hub.connect();
        hub.authenticate(&client, "backend", None).unwrap();
        let _ = next_event(&mut rx).await;

        hub.publish("agents/backend", "subtask.updated", serde_json::json!({}));
        let maintenance = hub.spawn_maintenance();

        let mut deliveries = Vec::new();
        while let Ok(event) =
            tokio::time::timeout(Duration::from_millis(400), next_event(&mut rx)).await
        {
            deliveries.push(event);
        }
        maintenance.abort();

        // one original plus exactly three resends, all with the same id
        assert_eq!(deliveries.len(), 4);
        let first_id = deliveries[0].2.clone().unwrap();
        assert!(deliveries.iter().all(|(_, _, id)| id.as_deref() == Some(first_id.as_str())));
    }

    #[tokio::test]
    async fn slow_subscriber_is_evicted_on_overflow() {
        let mut config = test_config();
        config.outbound_buffer = 1;
        let hub = FanoutHub::new(config);
        let (client, _rx) = hub.connect();
        hub.authenticate(&client, "backend", None).unwrap();

        // queue holds the announcement; the next publishes overflow
        hub.publish("global", "project.created", serde_json::json!({}));
        hub.publish("global", "project.created", serde_json::json!({}));
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn idle_subscribers_are_swept() {
        let mut config = test_config();
        config.idle_timeout = Duration::from_millis(50);
        let hub = FanoutHub::new(config);
        let (client, mut rx) = hub.connect();
        hub.authenticate(&client, "backend", None).unwrap();
        let _ = next_event(&mut rx).await;

        let maintenance = hub.spawn_maintenance();
        tokio::time::sleep(Duration::from_millis(150)).await;
        maintenance.abort();
        assert_eq!(hub.subscriber_count(), 0);
        assert!(!hub.is_authenticated(&client));
    }

    #[tokio::test]
    async fn client_publish_validates_channel_and_event() {
        let hub = FanoutHub::new(test_config());
        let (client, _rx) = hub.connect();

        assert!(matches!(
            hub.client_publish(&client, "global", "agent.status", serde_json::json!({})),
            Err(Error::NotAuthenticated)
        ));

        hub.authenticate(&client, "backend", None).unwrap();
        assert!(matches!(
            hub.client_publish(&client, "rooms/x", "agent.status", serde_json::json!({})),
            Err(Error::InvalidChannel(_))
        ));
        assert!(matches!(
            hub.client_publish(&client, "global", "not.an.event", serde_json::json!({})),
            Err(Error::UnknownEvent(_))
        ));
        assert!(hub
            .client_publish(&client, "global", "agent.status", serde_json::json!({}))
            .is_ok());
    }
}
