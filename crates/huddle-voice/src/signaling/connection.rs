//! Background WebSocket connection loop with auto-reconnect.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::client::SharedState;
use super::handler::handle_text_frame;
use super::types::{ConnectionStatus, SignalingCommand, SignalingConfig, SignalingEvent};

// ---------------------------------------------------------------------------
// Connection Loop
// ---------------------------------------------------------------------------

/// Background task managing the WebSocket connection with auto-reconnect.
pub(crate) async fn connection_loop(
    config: SignalingConfig,
    shared: Arc<SharedState>,
    event_tx: mpsc::Sender<SignalingEvent>,
    command_rx: mpsc::Receiver<SignalingCommand>,
    shutdown: CancellationToken,
) {
    let command_rx = Arc::new(Mutex::new(command_rx));
    let mut reconnect_delay = config.reconnect_delay_secs;

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        set_status(&shared, &event_tx, ConnectionStatus::Connecting).await;

        let url = config.ws_url();
        info!(url = %url.split('?').next().unwrap_or(""), "Connecting to signaling relay");

        let connect = tokio::time::timeout(
            Duration::from_secs(config.connect_timeout_secs),
            tokio_tungstenite::connect_async(&url),
        );
        let result = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = connect => result,
        };

        match result {
            Ok(Ok((ws_stream, _))) => {
                reconnect_delay = config.reconnect_delay_secs;

                // Frames queued against the previous connection are stale.
                if drain_stale_commands(&command_rx).await {
                    shutdown.cancel();
                }

                set_status(&shared, &event_tx, ConnectionStatus::Connected).await;

                let (ws_write, mut ws_read) = ws_stream.split();
                let ws_write = Arc::new(Mutex::new(ws_write));

                let heartbeat_handle = tokio::spawn(heartbeat_task(
                    Arc::clone(&ws_write),
                    config.heartbeat_interval_secs,
                ));
                let cmd_handle = tokio::spawn(command_forwarder(
                    Arc::clone(&command_rx),
                    Arc::clone(&ws_write),
                    shutdown.clone(),
                ));

                // Process incoming messages.
                loop {
                    let msg_result = tokio::select! {
                        _ = shutdown.cancelled() => {
                            let _ = ws_write.lock().await.send(WsMessage::Close(None)).await;
                            break;
                        }
                        next = ws_read.next() => match next {
                            Some(result) => result,
                            None => break,
                        },
                    };
                    match msg_result {
                        Ok(WsMessage::Text(text)) => {
                            handle_text_frame(&text, &shared, &event_tx).await;
                        }
                        Ok(WsMessage::Close(_)) => {
                            info!("Signaling relay closed connection");
                            break;
                        }
                        Err(e) => {
                            warn!(error = %e, "WebSocket error");
                            break;
                        }
                        _ => {}
                    }
                }

                // Cleanup.
                heartbeat_handle.abort();
                cmd_handle.abort();
                *shared.user_id.write().await = None;
                set_status(&shared, &event_tx, ConnectionStatus::Disconnected).await;
            }
            Ok(Err(e)) => {
                error!(error = %e, "Failed to connect to signaling relay");
                set_status(&shared, &event_tx, ConnectionStatus::Disconnected).await;
            }
            Err(_elapsed) => {
                error!(
                    timeout_secs = config.connect_timeout_secs,
                    "Signaling connection timed out"
                );
                set_status(&shared, &event_tx, ConnectionStatus::Disconnected).await;
            }
        }

        if !config.reconnect || shutdown.is_cancelled() {
            break;
        }

        // Exponential backoff reconnect.
        info!(delay = reconnect_delay, "Reconnecting in {} seconds", reconnect_delay);
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_secs(reconnect_delay)) => {}
        }
        reconnect_delay = (reconnect_delay * 2).min(config.max_reconnect_delay_secs);
    }

    debug!("Signaling connection loop exited");
}

/// Record and announce a status transition. Repeated statuses are not re-sent.
async fn set_status(
    shared: &SharedState,
    event_tx: &mpsc::Sender<SignalingEvent>,
    status: ConnectionStatus,
) {
    {
        let mut current = shared.status.write().await;
        if *current == status {
            return;
        }
        *current = status;
    }
    let _ = event_tx.send(SignalingEvent::Status(status)).await;
}

/// Discard queued frames. Returns `true` if a disconnect was requested.
async fn drain_stale_commands(command_rx: &Mutex<mpsc::Receiver<SignalingCommand>>) -> bool {
    let mut rx = command_rx.lock().await;
    let mut dropped = 0usize;
    let mut disconnect = false;
    while let Ok(cmd) = rx.try_recv() {
        match cmd {
            SignalingCommand::Send(_) => dropped += 1,
            SignalingCommand::Disconnect => disconnect = true,
        }
    }
    if dropped > 0 {
        debug!(dropped, "Discarded stale outbound frames");
    }
    disconnect
}

// ---------------------------------------------------------------------------
// Heartbeat
// ---------------------------------------------------------------------------

async fn heartbeat_task<S>(ws_write: Arc<Mutex<S>>, interval_secs: u64)
where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    let period = Duration::from_secs(interval_secs.max(1));
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    loop {
        interval.tick().await;
        let mut writer = ws_write.lock().await;
        if writer.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Command Forwarder
// ---------------------------------------------------------------------------

async fn command_forwarder<S>(
    cmd_rx: Arc<Mutex<mpsc::Receiver<SignalingCommand>>>,
    cmd_write: Arc<Mutex<S>>,
    shutdown: CancellationToken,
) where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    let mut rx = cmd_rx.lock().await;
    while let Some(cmd) = rx.recv().await {
        match cmd {
            SignalingCommand::Send(json) => {
                let mut writer = cmd_write.lock().await;
                if writer.send(WsMessage::Text(json.into())).await.is_err() {
                    warn!("Failed to write signaling frame");
                    break;
                }
            }
            SignalingCommand::Disconnect => {
                let mut writer = cmd_write.lock().await;
                let _ = writer.send(WsMessage::Close(None)).await;
                shutdown.cancel();
                break;
            }
        }
    }
}
