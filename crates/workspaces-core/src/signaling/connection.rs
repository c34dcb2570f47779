//! Background WebSocket connection loop with auto-reconnect.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use super::types::{SignalingClientConfig, SignalingCommand, SignalingEvent};
use crate::protocol::ServerMessage;

// ---------------------------------------------------------------------------
// Connection Loop
// ---------------------------------------------------------------------------

/// Background task managing the relay connection with auto-reconnect.
///
/// Runs until a `Disconnect` command arrives or every client handle has
/// been dropped.
pub(crate) async fn connection_loop(
    config: SignalingClientConfig,
    connected: Arc<RwLock<bool>>,
    event_tx: mpsc::Sender<SignalingEvent>,
    command_rx: mpsc::Receiver<SignalingCommand>,
) {
    let command_rx = Arc::new(Mutex::new(command_rx));
    let shutdown = Arc::new(AtomicBool::new(false));
    let connect_timeout = Duration::from_secs(config.connect_timeout_secs);
    let mut reconnect_delay = config.reconnect_delay_secs;

    loop {
        info!(url = %config.url, "Connecting to signaling relay");

        match tokio::time::timeout(
            connect_timeout,
            tokio_tungstenite::connect_async(config.url.as_str()),
        )
        .await
        {
            Ok(Ok((ws_stream, _))) => {
                reconnect_delay = config.reconnect_delay_secs;
                *connected.write().await = true;
                let _ = event_tx.send(SignalingEvent::Connected).await;

                let (ws_write, mut ws_read) = ws_stream.split();
                let ws_write = Arc::new(Mutex::new(ws_write));

                let cmd_handle = tokio::spawn(command_forwarder(
                    Arc::clone(&command_rx),
                    Arc::clone(&ws_write),
                    Arc::clone(&shutdown),
                ));

                while let Some(msg_result) = ws_read.next().await {
                    match msg_result {
                        Ok(WsMessage::Text(text)) => {
                            match serde_json::from_str::<ServerMessage>(&text) {
                                Ok(message) => {
                                    let _ = event_tx.send(SignalingEvent::Message(message)).await;
                                }
                                Err(e) => {
                                    debug!(error = %e, text = %text, "Unrecognized relay message");
                                }
                            }
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

                cmd_handle.abort();
                *connected.write().await = false;
                let _ = event_tx.send(SignalingEvent::Disconnected).await;
            }
            Ok(Err(e)) => {
                error!(error = %e, "Failed to connect to signaling relay");
                let _ = event_tx
                    .send(SignalingEvent::Error(format!("Connection failed: {e}")))
                    .await;
            }
            Err(_elapsed) => {
                error!(
                    timeout_secs = config.connect_timeout_secs,
                    "Signaling connection timed out"
                );
                let _ = event_tx
                    .send(SignalingEvent::Error(format!(
                        "Connection timed out after {}s",
                        config.connect_timeout_secs
                    )))
                    .await;
            }
        }

        if shutdown.load(Ordering::SeqCst) || event_tx.is_closed() {
            info!("Signaling connection stopped");
            return;
        }

        // Exponential backoff reconnect.
        info!(delay = reconnect_delay, "Reconnecting in {} seconds", reconnect_delay);
        tokio::time::sleep(Duration::from_secs(reconnect_delay)).await;
        reconnect_delay = (reconnect_delay * 2).min(config.max_reconnect_delay_secs);
    }
}

// ---------------------------------------------------------------------------
// Command Forwarder
// ---------------------------------------------------------------------------

async fn command_forwarder<S>(
    cmd_rx: Arc<Mutex<mpsc::Receiver<SignalingCommand>>>,
    cmd_write: Arc<Mutex<S>>,
    shutdown: Arc<AtomicBool>,
) where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    let mut rx = cmd_rx.lock().await;
    while let Some(cmd) = rx.recv().await {
        match cmd {
            SignalingCommand::Emit(message) => {
                let event = message.event_name();
                match serde_json::to_string(&message) {
                    Ok(json) => {
                        let mut writer = cmd_write.lock().await;
                        if writer.send(WsMessage::Text(json.into())).await.is_err() {
                            warn!(event, "Dropped message, relay socket is gone");
                        }
                    }
                    Err(e) => error!(event, error = %e, "Failed to encode relay message"),
                }
            }
            SignalingCommand::Disconnect => {
                shutdown.store(true, Ordering::SeqCst);
                let mut writer = cmd_write.lock().await;
                let _ = writer.send(WsMessage::Close(None)).await;
                return;
            }
        }
    }
    // Every client handle is gone.
    shutdown.store(true, Ordering::SeqCst);
    let mut writer = cmd_write.lock().await;
    let _ = writer.send(WsMessage::Close(None)).await;
}
