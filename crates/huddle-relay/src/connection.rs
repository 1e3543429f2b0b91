//! Per-connection handler: assign an identity, register, then route frames.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use huddle_voice::protocol::Envelope;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::hub::Hub;

/// Handle a single WebSocket connection until either side closes it.
pub async fn handle_connection<S>(
    ws: tokio_tungstenite::WebSocketStream<S>,
    addr: SocketAddr,
    hub: Hub,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = ws.split();
    let user_id = huddle_common::new_user_id();

    // 1. Tell the client who it is before anything else can reach it.
    let identity = Envelope::Identity {
        user_id: user_id.clone(),
    };
    let json = match serde_json::to_string(&identity) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!(peer = %addr, error = %e, "Failed to encode identity");
            return;
        }
    };
    if sink.send(Message::Text(json.into())).await.is_err() {
        return;
    }

    // 2. Register our receive channel.
    let (tx, mut rx) = mpsc::channel::<String>(256);
    hub.register(&user_id, tx).await;
    tracing::info!(peer = %addr, user_id = %user_id, "Client registered");

    // 3. Routing loop.
    loop {
        tokio::select! {
            Some(msg) = rx.recv() => {
                if sink.send(Message::Text(msg.into())).await.is_err() {
                    break;
                }
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<Envelope>(&text) {
                        Ok(envelope) => hub.dispatch(&user_id, envelope).await,
                        Err(e) => {
                            tracing::warn!(user_id = %user_id, error = %e, "Malformed frame dropped");
                        }
                    },
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(peer = %addr, error = %e, "WS error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    // 4. Cleanup.
    tracing::info!(peer = %addr, user_id = %user_id, "Client disconnected");
    hub.unregister(&user_id).await;
}
