//! Real-time fanout for agenthub (axum + ws).
//!
//! The [`FanoutHub`] owns all subscriber state; the WebSocket server feeds it
//! inbound frames and drains its per-subscriber queues; the
//! [`bridge`](run_bridge) translates store wake envelopes into hub publishes.

mod bridge;
mod error;
pub mod frames;
mod hub;
mod server;

pub use bridge::run_bridge;
pub use error::{Error, Result};
pub use frames::{ClientFrame, ServerFrame};
pub use hub::{FanoutHub, HubConfig};
pub use server::{AuthMode, AuthPolicy, RealtimeState, router, run_on_listener};
