//! Configuration schema types for webrtc workspaces.
//!
//! All structs use `serde(default)` so partial configs work correctly.
//! Missing fields are filled with sensible defaults.

mod call;
mod relay;
mod signaling;
mod system;

pub use call::*;
pub use relay::*;
pub use signaling::*;
pub use system::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration shared by the client library and the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct WorkspacesConfig {
    pub signaling: SignalingConfig,
    pub call: CallConfig,
    pub storage: StorageConfig,
    pub relay: RelayConfig,
    pub logging: LoggingConfig,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn default_config_has_correct_signaling() {
        let config = WorkspacesConfig::default();
        assert_eq!(config.signaling.url, "ws://127.0.0.1:8080");
        assert_eq!(config.signaling.connect_timeout_secs, 15);
        assert_eq!(config.signaling.reconnect_delay_secs, 1);
        assert_eq!(config.signaling.max_reconnect_delay_secs, 30);
    }

    #[test]
    fn default_config_has_correct_call() {
        let config = WorkspacesConfig::default();
        assert_eq!(config.call.ringing_timeout_ms, DEFAULT_RINGING_TIMEOUT_MS);
        assert_eq!(
            config.call.effective_ringing_timeout(),
            Duration::from_millis(45_000)
        );
    }

    #[test]
    fn default_storage_is_disabled() {
        let config = WorkspacesConfig::default();
        assert!(!config.storage.enabled);
        assert!(config.storage.path.is_none());
    }

    #[test]
    fn default_config_has_correct_relay() {
        let config = WorkspacesConfig::default();
        assert_eq!(config.relay.port, 8080);
        assert_eq!(config.relay.max_attendees, 8);
        assert_eq!(config.relay.session_ttl_secs, 300);
        assert_eq!(config.relay.ice_servers.len(), 1);
        assert_eq!(
            config.relay.ice_servers[0].urls,
            vec!["stun:stun.l.google.com:19302".to_string()]
        );
    }

    #[test]
    fn default_log_level_is_info() {
        let config = WorkspacesConfig::default();
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let toml_str = r#"
[call]
ringing_timeout_ms = 20000
"#;
        let config: WorkspacesConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.call.ringing_timeout_ms, 20_000);
        assert_eq!(config.signaling.url, "ws://127.0.0.1:8080");
        assert_eq!(config.relay.max_attendees, 8);
    }

    #[test]
    fn ice_servers_parse_from_toml() {
        let toml_str = r#"
[[relay.ice_servers]]
urls = ["turn:turn.example.com:3478"]
username = "user"
credential = "secret"
"#;
        let config: WorkspacesConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.relay.ice_servers.len(), 1);
        let server = &config.relay.ice_servers[0];
        assert_eq!(server.username.as_deref(), Some("user"));
        assert_eq!(server.credential.as_deref(), Some("secret"));
    }

    #[test]
    fn log_level_deserializes_uppercase() {
        let toml_str = r#"
[logging]
level = "DEBUG"
"#;
        let config: WorkspacesConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.level.as_filter(), "debug");
    }
}
