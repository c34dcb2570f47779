//! Full configuration validation.
//!
//! Each section has its own submodule; this orchestrator calls them all
//! and collects errors into a single `ConfigError`.

mod helpers;
mod relay;
mod signaling;

#[cfg(test)]
mod tests;

use crate::schema::WorkspacesConfig;
use workspaces_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &WorkspacesConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    signaling::validate_signaling(&mut errors, config);
    signaling::validate_call(&mut errors, config);
    relay::validate_relay(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}
