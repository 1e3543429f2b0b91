//! huddle-relay: reference signaling relay for voice channels.
//!
//! Accepts WebSocket connections, assigns each one a fresh user id, and
//! routes voice signaling between them. Membership is tracked per
//! channel so joiners get a roster snapshot; offers, answers and ICE
//! candidates go only to their target, with the sender stamped by the
//! relay. Media never passes through here.

pub mod connection;
pub mod hub;

use std::time::Duration;

use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;

pub use connection::handle_connection;
pub use hub::Hub;

/// Accept connections on `listener` forever.
pub async fn serve(listener: TcpListener, hub: Hub, handshake_timeout: Duration) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let hub = hub.clone();
                tokio::spawn(async move {
                    match tokio::time::timeout(handshake_timeout, accept_async(stream)).await {
                        Ok(Ok(ws)) => handle_connection(ws, addr, hub).await,
                        Ok(Err(e)) => {
                            tracing::warn!(peer = %addr, error = %e, "WS handshake failed");
                        }
                        Err(_) => {
                            tracing::warn!(peer = %addr, "WS handshake timed out");
                        }
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept error");
            }
        }
    }
}
