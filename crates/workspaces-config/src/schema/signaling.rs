use serde::{Deserialize, Serialize};

/// Connection settings for the signaling relay client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    /// WebSocket URL of the signaling relay.
    pub url: String,
    /// Seconds to wait for the WebSocket handshake (valid range: 1-120).
    pub connect_timeout_secs: u32,
    /// Base reconnect delay in seconds (valid range: 1-60).
    pub reconnect_delay_secs: u32,
    /// Upper bound for the exponential reconnect backoff.
    pub max_reconnect_delay_secs: u32,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080".into(),
            connect_timeout_secs: 15,
            reconnect_delay_secs: 1,
            max_reconnect_delay_secs: 30,
        }
    }
}
