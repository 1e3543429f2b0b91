use serde::{Deserialize, Serialize};

/// Configuration for the reference signaling relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySection {
    pub port: u16,
    /// Seconds a client gets to complete the WebSocket handshake.
    pub handshake_timeout_secs: u64,
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            port: 8080,
            handshake_timeout_secs: 10,
        }
    }
}
