//! Incoming relay frame handler.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::protocol::Envelope;

use super::client::SharedState;
use super::types::SignalingEvent;

// ---------------------------------------------------------------------------
// Frame Handler
// ---------------------------------------------------------------------------

/// Handle a single incoming text frame.
///
/// `identity` frames update the shared state before being announced.
/// Everything else is forwarded untouched; malformed frames are dropped.
pub(crate) async fn handle_text_frame(
    text: &str,
    shared: &SharedState,
    event_tx: &mpsc::Sender<SignalingEvent>,
) {
    let envelope = match serde_json::from_str::<Envelope>(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "Dropping malformed signaling frame");
            return;
        }
    };

    match envelope {
        Envelope::Identity { user_id } => {
            info!(user_id = %user_id, "Relay assigned identity");
            *shared.user_id.write().await = Some(user_id.clone());
            let _ = event_tx.send(SignalingEvent::Identity(user_id)).await;
        }
        other => {
            debug!(kind = other.kind(), "Signaling frame received");
            let _ = event_tx.send(SignalingEvent::Envelope(other)).await;
        }
    }
}
