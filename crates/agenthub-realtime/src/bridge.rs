//! Notification bridge: the sole consumer of the store's wake channel.
//! A pure translator with no per-subscriber state; envelopes go straight to
//! the hub. Events that arrive while the bridge is reconnecting are lost by
//! design, subscribers re-query the API for missed state.

use agenthub_types::NotifyEnvelope;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::hub::FanoutHub;

const BACKOFF_INITIAL: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Runs until aborted. `resubscribe` hands out a fresh wake-channel receiver
/// per connect epoch; reconnects use capped exponential backoff.
pub async fn run_bridge<F>(mut resubscribe: F, hub: FanoutHub)
where
    F: FnMut() -> broadcast::Receiver<NotifyEnvelope>,
{
    let mut backoff = BACKOFF_INITIAL;
    loop {
        let mut rx = resubscribe();
        tracing::info!("notification bridge attached to wake channel");
        loop {
            match rx.recv().await {
                Ok(envelope) => {
                    backoff = BACKOFF_INITIAL;
                    route(&hub, envelope);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "bridge lagged behind wake channel; events lost");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        tracing::warn!(retry_in = ?backoff, "wake channel closed; reconnecting");
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(BACKOFF_CAP);
    }
}

fn route(hub: &FanoutHub, envelope: NotifyEnvelope) {
    let delivered = hub.publish(&envelope.channel, &envelope.event, envelope.data);
    tracing::trace!(
        channel = %envelope.channel,
        event = %envelope.event,
        delivered,
        "routed wake envelope"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::ServerFrame;
    use crate::hub::{FanoutHub, HubConfig};

    #[tokio::test]
    async fn envelopes_reach_hub_subscribers() {
        let hub = FanoutHub::new(HubConfig::default());
        let (client, mut rx) = hub.connect();
        hub.authenticate(&client, "backend", None).unwrap();

        let (tx, _) = broadcast::channel(16);
        let bridge = tokio::spawn(run_bridge(
            {
                let tx = tx.clone();
                move || tx.subscribe()
            },
            hub.clone(),
        ));

        // give the bridge a moment to attach
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(NotifyEnvelope::new(
            "agents/backend",
            "context.updated",
            serde_json::json!({"agent_id": "backend"}),
        ))
        .unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                match rx.recv().await {
                    Some(ServerFrame::Event { channel, event, .. })
                        if event == "context.updated" =>
                    {
                        return (channel, event);
                    }
                    Some(_) => continue,
                    None => panic!("subscriber queue closed"),
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(frame.0, "agents/backend");

        bridge.abort();
    }
}
