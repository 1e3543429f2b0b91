//! Duplex signaling channel to the relay.
//!
//! `SignalingTransport` is the seam the session manager talks to;
//! `SignalingClient` is the WebSocket implementation, with a background
//! connection loop handling heartbeats, inbound frame parsing, and
//! optional reconnect with backoff.

mod client;
mod connection;
mod handler;
mod types;

pub use client::SignalingClient;
pub use types::{ConnectionStatus, SignalingConfig, SignalingEvent, SignalingTransport};
