//! Workspaces configuration system.
//!
//! Provides TOML-based configuration with full validation. All config
//! sections use sensible defaults so partial configs work out of the box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use workspaces_config::{load_config, config_to_json};
//!
//! let config = load_config().expect("failed to load config");
//! let json = config_to_json(&config);
//! println!("{json}");
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{
    CallConfig, IceServerConfig, LogLevel, LoggingConfig, RelayConfig, SignalingConfig,
    StorageConfig, WorkspacesConfig, CONFIG_SCHEMA_VERSION,
};

use workspaces_common::ConfigError;

/// Convenience function to load config from the platform default path.
///
/// Loads `config.toml` from the OS config directory, creates a default
/// if none exists, and validates the result.
pub fn load_config() -> Result<WorkspacesConfig, ConfigError> {
    let config = toml_loader::load_default()?;
    validation::validate(&config)?;
    Ok(config)
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &WorkspacesConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_to_json_contains_all_sections() {
        let config = WorkspacesConfig::default();
        let json = config_to_json(&config);
        assert!(json.contains("\"signaling\""));
        assert!(json.contains("\"call\""));
        assert!(json.contains("\"storage\""));
        assert!(json.contains("\"relay\""));
        assert!(json.contains("\"logging\""));
    }

    #[test]
    fn config_schema_version_is_1() {
        assert_eq!(CONFIG_SCHEMA_VERSION, 1);
    }

    #[test]
    fn default_config_round_trips_through_json() {
        let config = WorkspacesConfig::default();
        let json = config_to_json(&config);
        let parsed: WorkspacesConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.signaling.url, "ws://127.0.0.1:8080");
        assert_eq!(parsed.call.ringing_timeout_ms, 45_000);
        assert_eq!(parsed.relay.port, 8080);
    }
}
