//! Axum WebSocket server for the real-time surface: upgrade, auth handshake,
//! frame dispatch, and the per-connection writer with its ping heartbeat.

use axum::{
    Router,
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
    routing::get,
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::frames::{ClientFrame, ServerFrame, codes};
use crate::hub::FanoutHub;

const PING_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Production,
    Development,
}

/// How auth frames are judged. In development a bare agent id is enough;
/// in production the token must verify and be unexpired.
#[derive(Clone)]
pub struct AuthPolicy {
    pub mode: AuthMode,
    pub secret: String,
}

pub struct RealtimeState {
    pub hub: FanoutHub,
    pub auth: AuthPolicy,
    /// Socket writes slower than this evict the subscriber as unhealthy
    pub write_deadline: Duration,
}

impl RealtimeState {
    pub fn new(hub: FanoutHub, auth: AuthPolicy) -> Self {
        Self {
            hub,
            auth,
            write_deadline: Duration::from_secs(2),
        }
    }
}

/// Optional identity hints on the query string; applied only after a
/// successful auth frame.
#[derive(Debug, Clone, Default, Deserialize)]
struct ConnectParams {
    agent_id: Option<String>,
    session_id: Option<String>,
}

pub fn router(state: Arc<RealtimeState>) -> Router {
    Router::new().route("/", get(ws_handler)).with_state(state)
}

/// Serves connections on an existing listener (tests bind 127.0.0.1:0 and
/// pass it in).
pub async fn run_on_listener(
    listener: TcpListener,
    state: Arc<RealtimeState>,
) -> std::io::Result<()> {
    tracing::info!(addr = %listener.local_addr()?, "realtime server listening");
    axum::serve(listener, router(state)).await
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<RealtimeState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params))
}

async fn handle_socket(socket: WebSocket, state: Arc<RealtimeState>, params: ConnectParams) {
    let (client_id, outbound) = state.hub.connect();
    let (mut sink, mut stream) = socket.split();

    let connected = ServerFrame::connected(client_id.clone());
    if send_frame(&mut sink, &connected, state.write_deadline).await.is_err() {
        state.hub.disconnect(&client_id);
        return;
    }

    let writer = tokio::spawn(write_loop(sink, outbound, state.write_deadline));

    while let Some(result) = stream.next().await {
        let message = match result {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(client = %client_id, "read error (client closed?): {}", e);
                break;
            }
        };
        state.hub.touch(&client_id);
        match message {
            Message::Text(text) => handle_frame(&state, &client_id, &params, &text),
            Message::Binary(bytes) => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                handle_frame(&state, &client_id, &params, &text);
            }
            // tungstenite answers pings on its own; both directions just
            // count as liveness here
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => break,
        }
    }

    state.hub.disconnect(&client_id);
    writer.abort();
}

/// Drains the hub's outbound queue onto the socket and emits the periodic
/// protocol ping. A write slower than the deadline ends the connection.
async fn write_loop(
    mut sink: futures_util::stream::SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<ServerFrame>,
    write_deadline: Duration,
) {
    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ping.tick().await; // immediate first tick

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                if send_frame(&mut sink, &frame, write_deadline).await.is_err() {
                    break;
                }
            }
            _ = ping.tick() => {
                let deadline = tokio::time::timeout(write_deadline, sink.send(Message::Ping(Vec::new())));
                if !matches!(deadline.await, Ok(Ok(()))) {
                    break;
                }
            }
        }
    }
}

async fn send_frame(
    sink: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    frame: &ServerFrame,
    write_deadline: Duration,
) -> Result<(), ()> {
    let text = match serde_json::to_string(frame) {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!("frame serialization failed: {}", e);
            return Ok(());
        }
    };
    match tokio::time::timeout(write_deadline, sink.send(Message::Text(text))).await {
        Ok(Ok(())) => Ok(()),
        _ => Err(()),
    }
}

fn handle_frame(state: &RealtimeState, client_id: &str, params: &ConnectParams, text: &str) {
    let hub = &state.hub;

    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            hub.send_to(
                client_id,
                ServerFrame::error(format!("parse error: {}", e), codes::PARSE_ERROR),
            );
            return;
        }
    };
    let frame: ClientFrame = match serde_json::from_value(value.clone()) {
        Ok(f) => f,
        Err(e) => {
            let (message, code) = match value.get("type") {
                Some(Value::String(kind)) if !KNOWN_TYPES.contains(&kind.as_str()) => (
                    format!("unknown message type: {}", kind),
                    codes::UNKNOWN_MESSAGE_TYPE,
                ),
                _ => (format!("parse error: {}", e), codes::PARSE_ERROR),
            };
            hub.send_to(client_id, ServerFrame::error(message, code));
            return;
        }
    };

    match frame {
        ClientFrame::Auth {
            agent_id,
            session_id,
            token,
        } => handle_auth(state, client_id, params, agent_id, session_id, token),
        ClientFrame::Subscribe { channel, id } => {
            if !hub.is_authenticated(client_id) {
                hub.send_to(
                    client_id,
                    ServerFrame::error("authenticate first", codes::MISSING_CREDENTIALS),
                );
                return;
            }
            match channel.parse() {
                Ok(key) => {
                    let _ = hub.subscribe_channel(client_id, &key);
                    hub.send_to(client_id, ServerFrame::ack_ok(id));
                }
                Err(e) => {
                    hub.send_to(client_id, ServerFrame::ack_err(id, format!("{}", e)));
                }
            }
        }
        ClientFrame::Unsubscribe { channel } => {
            if let Ok(key) = channel.parse() {
                hub.unsubscribe_channel(client_id, &key);
            }
            hub.send_to(client_id, ServerFrame::ack_ok(None));
        }
        ClientFrame::Publish {
            channel,
            event,
            data,
        } => match hub.client_publish(client_id, &channel, &event, data) {
            Ok(_) => {}
            Err(crate::Error::NotAuthenticated) => hub.send_to(
                client_id,
                ServerFrame::error("authenticate first", codes::MISSING_CREDENTIALS),
            ),
            Err(crate::Error::InvalidChannel(raw)) => hub.send_to(
                client_id,
                ServerFrame::error(format!("invalid channel: {}", raw), codes::INVALID_CHANNEL),
            ),
            Err(crate::Error::UnknownEvent(name)) => hub.send_to(
                client_id,
                ServerFrame::error(format!("unknown event: {}", name), codes::INVALID_EVENT),
            ),
            Err(e) => hub.send_to(
                client_id,
                ServerFrame::error(e.to_string(), codes::PARSE_ERROR),
            ),
        },
        ClientFrame::Ping => hub.send_to(client_id, ServerFrame::pong()),
        ClientFrame::Ack { id } => hub.ack(client_id, &id),
    }
}

const KNOWN_TYPES: &[&str] = &["auth", "subscribe", "unsubscribe", "publish", "ping", "ack"];

fn handle_auth(
    state: &RealtimeState,
    client_id: &str,
    params: &ConnectParams,
    agent_id: Option<String>,
    session_id: Option<String>,
    token: Option<String>,
) {
    let hub = &state.hub;
    let (agent, session) = match state.auth.mode {
        AuthMode::Production => {
            let Some(token) = token else {
                hub.send_to(
                    client_id,
                    ServerFrame::error("token required", codes::MISSING_CREDENTIALS),
                );
                return;
            };
            match agenthub_auth::verify(&token, &state.auth.secret, Utc::now()) {
                Ok(claims) => {
                    let session = claims
                        .session_id
                        .or(session_id)
                        .or_else(|| params.session_id.clone());
                    (claims.agent_id, session)
                }
                Err(e) => {
                    hub.send_to(
                        client_id,
                        ServerFrame::error(e.to_string(), codes::AUTH_FAILED),
                    );
                    return;
                }
            }
        }
        AuthMode::Development => {
            // bare agent id accepted; query-string identity as fallback
            let Some(agent) = agent_id.or_else(|| params.agent_id.clone()) else {
                hub.send_to(
                    client_id,
                    ServerFrame::error("agent_id required", codes::MISSING_CREDENTIALS),
                );
                return;
            };
            (agent, session_id.or_else(|| params.session_id.clone()))
        }
    };

    if let Err(e) = hub.authenticate(client_id, &agent, session.as_deref()) {
        hub.send_to(client_id, ServerFrame::error(e.to_string(), codes::AUTH_FAILED));
    }
}
