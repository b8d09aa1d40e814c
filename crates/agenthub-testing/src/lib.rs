//! Testing infrastructure for agenthub integration tests.
//!
//! `TestWorld` boots the full backbone in-process: an in-memory store, the
//! HTTP API and the realtime server on ephemeral ports, the notification
//! bridge, and the hub maintenance loop. Tests talk to it exactly like the
//! lifecycle hooks and agents do: HTTP via reqwest, frames via a WebSocket
//! client.

mod world;
mod ws;

pub use world::{TEST_SECRET, TestWorld, TestWorldBuilder};
pub use ws::WsClient;
