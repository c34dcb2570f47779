//! Public handle for the relay connection.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use super::connection::connection_loop;
use super::types::{SignalingClientConfig, SignalingCommand, SignalingEvent};
use super::SignalingChannel;
use crate::protocol::ClientMessage;

/// Handle for the background relay connection.
///
/// All methods are non-blocking and send commands to the connection task.
pub struct SignalingClient {
    command_tx: mpsc::Sender<SignalingCommand>,
    connected: Arc<RwLock<bool>>,
}

impl SignalingClient {
    /// Create a new client and start the background connection.
    /// Returns `(client, event_receiver)`.
    pub fn connect(config: SignalingClientConfig) -> (Self, mpsc::Receiver<SignalingEvent>) {
        let (event_tx, event_rx) = mpsc::channel(256);
        let (command_tx, command_rx) = mpsc::channel(64);
        let connected = Arc::new(RwLock::new(false));

        let client = Self {
            command_tx,
            connected: Arc::clone(&connected),
        };

        tokio::spawn(connection_loop(config, connected, event_tx, command_rx));

        (client, event_rx)
    }

    /// Lightweight handle onto the same connection.
    pub fn clone_sender(&self) -> Self {
        Self {
            command_tx: self.command_tx.clone(),
            connected: Arc::clone(&self.connected),
        }
    }

    pub async fn is_connected(&self) -> bool {
        *self.connected.read().await
    }

    /// Close the socket and stop reconnecting.
    pub async fn disconnect(&self) {
        let _ = self.command_tx.send(SignalingCommand::Disconnect).await;
    }
}

#[async_trait]
impl SignalingChannel for SignalingClient {
    async fn emit(&self, message: ClientMessage) {
        debug!(event = message.event_name(), "Emitting to relay");
        let _ = self.command_tx.send(SignalingCommand::Emit(message)).await;
    }
}
