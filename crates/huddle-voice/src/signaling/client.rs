//! Public handle for interacting with the signaling relay connection.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::SignalingError;
use crate::protocol::Envelope;

use super::connection::connection_loop;
use super::types::{
    ConnectionStatus, SignalingCommand, SignalingConfig, SignalingEvent, SignalingTransport,
};

/// Connection state shared between the handle and the background task.
#[derive(Default)]
pub(crate) struct SharedState {
    pub(crate) status: RwLock<ConnectionStatus>,
    /// Identity asserted by the relay for the current connection.
    pub(crate) user_id: RwLock<Option<String>>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Handle for interacting with the relay connection.
///
/// All methods are non-blocking and send commands to the background
/// connection task.
pub struct SignalingClient {
    command_tx: mpsc::Sender<SignalingCommand>,
    shared: Arc<SharedState>,
    shutdown: CancellationToken,
}

impl SignalingClient {
    /// Create a new client and start the background connection.
    /// Returns `(client, event_receiver)`.
    pub fn connect(config: SignalingConfig) -> (Self, mpsc::Receiver<SignalingEvent>) {
        let (event_tx, event_rx) = mpsc::channel(256);
        let (command_tx, command_rx) = mpsc::channel(64);
        let shared = Arc::new(SharedState::default());
        let shutdown = CancellationToken::new();

        let client = Self {
            command_tx,
            shared: Arc::clone(&shared),
            shutdown: shutdown.clone(),
        };

        tokio::spawn(connection_loop(config, shared, event_tx, command_rx, shutdown));

        (client, event_rx)
    }

    /// Close the connection and stop reconnecting.
    pub async fn disconnect(&self) {
        let _ = self.command_tx.send(SignalingCommand::Disconnect).await;
        self.shutdown.cancel();
    }
}

#[async_trait]
impl SignalingTransport for SignalingClient {
    async fn send(&self, envelope: Envelope) -> Result<(), SignalingError> {
        if *self.shared.status.read().await != ConnectionStatus::Connected {
            warn!(kind = envelope.kind(), "Dropping envelope: signaling not connected");
            return Err(SignalingError::NotConnected);
        }
        if self.shared.user_id.read().await.is_none() {
            warn!(kind = envelope.kind(), "Dropping envelope: no identity yet");
            return Err(SignalingError::NoIdentity);
        }

        let json = serde_json::to_string(&envelope)?;
        self.command_tx
            .send(SignalingCommand::Send(json))
            .await
            .map_err(|_| SignalingError::Closed)
    }

    async fn status(&self) -> ConnectionStatus {
        *self.shared.status.read().await
    }

    async fn local_user_id(&self) -> Option<String> {
        self.shared.user_id.read().await.clone()
    }
}
