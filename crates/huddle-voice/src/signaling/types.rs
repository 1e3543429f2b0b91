//! Configuration, events, and the transport trait for the signaling channel.

use async_trait::async_trait;
use huddle_config::schema::SignalingSection;
use serde::Serialize;

use crate::error::SignalingError;
use crate::protocol::Envelope;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for connecting to the signaling relay.
#[derive(Clone)]
pub struct SignalingConfig {
    /// WebSocket URL of the relay (e.g. "wss://relay.example.com/ws").
    pub endpoint: String,
    /// Optional credential passed to the relay as the `token` query parameter.
    pub token: Option<String>,
    pub connect_timeout_secs: u64,
    /// Interval between WebSocket pings.
    pub heartbeat_interval_secs: u64,
    /// Reconnect after the transport closes.
    pub reconnect: bool,
    /// Reconnect base delay in seconds.
    pub reconnect_delay_secs: u64,
    /// Maximum reconnect delay in seconds.
    pub max_reconnect_delay_secs: u64,
}

impl std::fmt::Debug for SignalingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalingConfig")
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("heartbeat_interval_secs", &self.heartbeat_interval_secs)
            .field("reconnect", &self.reconnect)
            .field("reconnect_delay_secs", &self.reconnect_delay_secs)
            .field("max_reconnect_delay_secs", &self.max_reconnect_delay_secs)
            .finish()
    }
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self::from(&SignalingSection::default())
    }
}

impl From<&SignalingSection> for SignalingConfig {
    fn from(section: &SignalingSection) -> Self {
        Self {
            endpoint: section.endpoint.clone(),
            token: section.token.clone(),
            connect_timeout_secs: section.connect_timeout_secs,
            heartbeat_interval_secs: section.heartbeat_interval_secs,
            reconnect: section.reconnect,
            reconnect_delay_secs: section.reconnect_delay_secs,
            max_reconnect_delay_secs: section.max_reconnect_delay_secs,
        }
    }
}

impl SignalingConfig {
    /// Build the WebSocket URL, appending the credential if present.
    pub(crate) fn ws_url(&self) -> String {
        match &self.token {
            Some(token) => {
                let sep = if self.endpoint.contains('?') { '&' } else { '?' };
                format!("{}{sep}token={token}", self.endpoint)
            }
            None => self.endpoint.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Connectivity of the signaling channel, as shown to the UI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    #[default]
    Disconnected,
}

/// Events delivered by the signaling channel, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingEvent {
    Status(ConnectionStatus),
    /// The relay asserted our user id for this connection.
    Identity(String),
    Envelope(Envelope),
}

/// Commands sent to the background connection task.
#[derive(Debug)]
pub(crate) enum SignalingCommand {
    Send(String),
    Disconnect,
}

// ---------------------------------------------------------------------------
// Transport trait
// ---------------------------------------------------------------------------

/// Outbound half of the signaling channel.
///
/// `send` never retries. It fails when the channel is disconnected or
/// before the relay has assigned an identity; callers log and move on.
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    async fn send(&self, envelope: Envelope) -> Result<(), SignalingError>;

    async fn status(&self) -> ConnectionStatus;

    async fn local_user_id(&self) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_without_token() {
        let config = SignalingConfig {
            endpoint: "ws://localhost:8080/ws".into(),
            ..Default::default()
        };
        assert_eq!(config.ws_url(), "ws://localhost:8080/ws");
    }

    #[test]
    fn ws_url_appends_token() {
        let config = SignalingConfig {
            endpoint: "wss://relay.example.com/ws".into(),
            token: Some("abc".into()),
            ..Default::default()
        };
        assert_eq!(config.ws_url(), "wss://relay.example.com/ws?token=abc");

        let config = SignalingConfig {
            endpoint: "wss://relay.example.com/ws?v=1".into(),
            token: Some("abc".into()),
            ..Default::default()
        };
        assert_eq!(config.ws_url(), "wss://relay.example.com/ws?v=1&token=abc");
    }

    #[test]
    fn debug_redacts_token() {
        let config = SignalingConfig {
            token: Some("secret-token".into()),
            ..Default::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&ConnectionStatus::Connecting).unwrap();
        assert_eq!(json, "\"connecting\"");
        assert_eq!(ConnectionStatus::default(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn config_from_section() {
        let section = SignalingSection {
            endpoint: "ws://10.0.0.1:9000/ws".into(),
            reconnect: false,
            ..Default::default()
        };
        let config = SignalingConfig::from(&section);
        assert_eq!(config.endpoint, "ws://10.0.0.1:9000/ws");
        assert!(!config.reconnect);
        assert_eq!(config.max_reconnect_delay_secs, 30);
    }
}
