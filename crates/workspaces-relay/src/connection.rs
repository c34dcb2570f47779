//! Per-connection handler: decode client frames, route them, and pump the
//! connection's outbox back onto the socket.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use workspaces_core::protocol::{AlertNotice, ClientMessage, ServerMessage};

use crate::router::{Connection, Router};

/// Capacity of a connection's outbound frame queue.
const OUTBOX_CAPACITY: usize = 256;

/// Handle a single WebSocket connection until either side closes it.
pub async fn handle_connection(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    addr: SocketAddr,
    router: Router,
) {
    let (mut sink, mut stream) = ws.split();
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOX_CAPACITY);
    let mut conn = Connection::new(tx.clone());

    tracing::info!(peer = %addr, "Client connected");

    loop {
        tokio::select! {
            Some(msg) = rx.recv() => {
                if sink.send(Message::Text(msg.into())).await.is_err() {
                    break;
                }
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(message) => {
                                tracing::debug!(peer = %addr, event = message.event_name(), "Client event");
                                router.handle(&mut conn, message).await;
                            }
                            Err(e) => {
                                tracing::debug!(peer = %addr, error = %e, "Malformed client frame");
                                reject(&tx, &e.to_string());
                            }
                        }
                    }
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

    tracing::info!(
        peer = %addr,
        attendee_id = conn.seat().map(|s| s.attendee_id.as_str()).unwrap_or("-"),
        "Client disconnected"
    );
    router.disconnect(&conn).await;
}

fn reject(tx: &mpsc::Sender<String>, reason: &str) {
    let alert = ServerMessage::Alert(AlertNotice {
        message: format!("malformed message: {reason}"),
    });
    if let Ok(json) = serde_json::to_string(&alert) {
        let _ = tx.try_send(json);
    }
}
