//! Signaling relay connection settings.

use serde::{Deserialize, Serialize};

/// How to reach the signaling relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingSection {
    /// WebSocket URL of the relay.
    pub endpoint: String,
    /// Optional bearer credential, sent as the `token` query parameter.
    pub token: Option<String>,
    pub connect_timeout_secs: u64,
    pub heartbeat_interval_secs: u64,
    /// Reconnect automatically after the transport closes.
    pub reconnect: bool,
    pub reconnect_delay_secs: u64,
    pub max_reconnect_delay_secs: u64,
}

impl Default for SignalingSection {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:8080/ws".into(),
            token: None,
            connect_timeout_secs: 15,
            heartbeat_interval_secs: 25,
            reconnect: true,
            reconnect_delay_secs: 1,
            max_reconnect_delay_secs: 30,
        }
    }
}
