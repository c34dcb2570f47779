//! Configuration and event/command enums for the signaling client.

use workspaces_config::SignalingConfig;

use crate::protocol::{ClientMessage, ServerMessage};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SignalingClientConfig {
    /// Relay WebSocket URL (`ws://` or `wss://`).
    pub url: String,
    pub connect_timeout_secs: u64,
    /// Reconnect base delay in seconds.
    pub reconnect_delay_secs: u64,
    /// Maximum reconnect delay in seconds.
    pub max_reconnect_delay_secs: u64,
}

impl Default for SignalingClientConfig {
    fn default() -> Self {
        Self::from(&SignalingConfig::default())
    }
}

impl From<&SignalingConfig> for SignalingClientConfig {
    fn from(config: &SignalingConfig) -> Self {
        Self {
            url: config.url.clone(),
            connect_timeout_secs: u64::from(config.connect_timeout_secs),
            reconnect_delay_secs: u64::from(config.reconnect_delay_secs),
            max_reconnect_delay_secs: u64::from(config.max_reconnect_delay_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Events & Commands
// ---------------------------------------------------------------------------

/// Events surfaced by the background connection task.
#[derive(Debug, Clone)]
pub enum SignalingEvent {
    Connected,
    Disconnected,
    Message(ServerMessage),
    Error(String),
}

/// Commands accepted by the background connection task.
#[derive(Debug)]
pub enum SignalingCommand {
    Emit(ClientMessage),
    Disconnect,
}
