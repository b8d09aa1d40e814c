//! In-process wake channel. The API publishes one envelope per committed
//! mutation; the notification bridge is the sole long-lived consumer.
//! Receivers that lag past the buffer lose events (no replay).

use agenthub_types::NotifyEnvelope;
use tokio::sync::broadcast;

const WAKE_BUFFER: usize = 1024;

/// Sender half of the wake channel, cheap to clone into handlers.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<NotifyEnvelope>,
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(WAKE_BUFFER);
        Self { tx }
    }

    /// Best-effort publish. Having no connected bridge is not an error;
    /// the drop is logged and the originating call still succeeds.
    pub fn notify(&self, channel: impl Into<String>, event: impl Into<String>, data: serde_json::Value) {
        let envelope = NotifyEnvelope::new(channel, event, data);
        if self.tx.send(envelope).is_err() {
            tracing::debug!("wake envelope dropped: no bridge connected");
        }
    }

    /// Subscribes a new receiver (used by the bridge and by tests).
    pub fn subscribe(&self) -> broadcast::Receiver<NotifyEnvelope> {
        self.tx.subscribe()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_to_connected_receiver() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();
        notifier.notify("global", "project.created", serde_json::json!({"id": "p1"}));
        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.channel, "global");
        assert_eq!(envelope.event, "project.created");
    }

    #[tokio::test]
    async fn publish_without_receiver_is_ok() {
        let notifier = Notifier::new();
        notifier.notify("global", "project.created", serde_json::Value::Null);
    }
}
