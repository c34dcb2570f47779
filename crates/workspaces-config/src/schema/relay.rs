use serde::{Deserialize, Serialize};

/// A STUN/TURN server handed to clients on `iceservers-query`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

/// Configuration for the signaling relay server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Port to listen on.
    pub port: u16,
    /// Attendees allowed per workspace, owner included (valid range: 2-64).
    pub max_attendees: u32,
    /// Seconds a workspace with no connected attendee survives before it is reaped.
    pub session_ttl_secs: u32,
    pub ice_servers: Vec<IceServerConfig>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            max_attendees: 8,
            session_ttl_secs: 300,
            ice_servers: vec![IceServerConfig {
                urls: vec!["stun:stun.l.google.com:19302".into()],
                username: None,
                credential: None,
            }],
        }
    }
}
