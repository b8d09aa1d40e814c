use anyhow::{Context, Result, bail};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Thin frame-level client over the realtime surface.
pub struct WsClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    pub client_id: String,
}

impl WsClient {
    /// Connects and consumes the `connected` frame.
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, _) = connect_async(url).await.context("ws connect")?;
        let mut client = Self {
            stream,
            client_id: String::new(),
        };
        let connected = client.recv().await?;
        anyhow::ensure!(
            connected["type"] == "connected",
            "expected connected frame, got {}",
            connected
        );
        client.client_id = connected["client_id"]
            .as_str()
            .context("client_id")?
            .to_string();
        Ok(client)
    }

    pub async fn send(&mut self, frame: Value) -> Result<()> {
        self.send_raw(&frame.to_string()).await
    }

    /// Sends arbitrary text (for malformed-frame tests).
    pub async fn send_raw(&mut self, text: &str) -> Result<()> {
        self.stream
            .send(Message::Text(text.to_string()))
            .await
            .context("ws send")
    }

    /// Next JSON frame within the timeout; protocol pings are skipped.
    pub async fn recv(&mut self) -> Result<Value> {
        self.recv_within(RECV_TIMEOUT).await
    }

    pub async fn recv_within(&mut self, timeout: Duration) -> Result<Value> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline
                .checked_duration_since(tokio::time::Instant::now())
                .unwrap_or(Duration::ZERO);
            let message = tokio::time::timeout(remaining, self.stream.next())
                .await
                .context("ws recv timeout")?;
            match message {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str(&text).context("ws frame json");
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => bail!("connection closed"),
                Some(Ok(_)) => continue,
                Some(Err(e)) => bail!("ws error: {}", e),
            }
        }
    }

    /// Skips frames until one with `event` arrives.
    pub async fn recv_event(&mut self, event: &str) -> Result<Value> {
        let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
        loop {
            let remaining = deadline
                .checked_duration_since(tokio::time::Instant::now())
                .unwrap_or(Duration::ZERO);
            let frame = self.recv_within(remaining).await?;
            if frame["event"] == event {
                return Ok(frame);
            }
        }
    }

    /// True when no frame with `event` arrives within `window`.
    pub async fn assert_silent(&mut self, event: &str, window: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + window;
        loop {
            let remaining = deadline
                .checked_duration_since(tokio::time::Instant::now())
                .unwrap_or(Duration::ZERO);
            if remaining.is_zero() {
                return Ok(());
            }
            match self.recv_within(remaining).await {
                Ok(frame) if frame["event"] == event => {
                    bail!("unexpected {} frame: {}", event, frame)
                }
                Ok(_) => continue,
                Err(_) => return Ok(()),
            }
        }
    }

    /// Development-mode auth with a bare agent id.
    pub async fn auth(&mut self, agent_id: &str, session_id: Option<&str>) -> Result<()> {
        self.send(json!({
            "type": "auth",
            "agent_id": agent_id,
            "session_id": session_id,
        }))
        .await?;
        // own agent.connected broadcast doubles as the success signal
        self.recv_event("agent.connected").await?;
        Ok(())
    }

    /// Production-mode auth with a signed token.
    pub async fn auth_token(&mut self, token: &str) -> Result<()> {
        self.send(json!({ "type": "auth", "token": token })).await?;
        self.recv_event("agent.connected").await?;
        Ok(())
    }

    /// Subscribe and wait for the ack.
    pub async fn subscribe(&mut self, channel: &str) -> Result<Value> {
        self.send(json!({
            "type": "subscribe",
            "channel": channel,
            "id": format!("sub-{}", channel),
        }))
        .await?;
        let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
        loop {
            let remaining = deadline
                .checked_duration_since(tokio::time::Instant::now())
                .unwrap_or(Duration::ZERO);
            let frame = self.recv_within(remaining).await?;
            if frame["type"] == "ack" {
                return Ok(frame);
            }
        }
    }

    pub async fn ack(&mut self, message_id: &str) -> Result<()> {
        self.send(json!({ "type": "ack", "id": message_id })).await
    }
}
