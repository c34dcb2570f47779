//! Validation for the client-side sections: signaling and call.

use std::sync::LazyLock;

use regex::Regex;

use crate::schema::WorkspacesConfig;

use super::helpers::{validate_pattern, validate_range};

const MAX_RINGING_TIMEOUT_MS: u32 = 600_000;

static WS_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^wss?://[^\s/?#]+(/\S*)?$").unwrap());

/// Validate signaling connection constraints.
pub(crate) fn validate_signaling(errors: &mut Vec<String>, config: &WorkspacesConfig) {
    let signaling = &config.signaling;
    validate_pattern(
        errors,
        "signaling.url",
        &signaling.url,
        &WS_URL_RE,
        "a ws:// or wss:// url",
    );
    validate_range(
        errors,
        "signaling.connect_timeout_secs",
        signaling.connect_timeout_secs,
        1,
        120,
    );
    validate_range(
        errors,
        "signaling.reconnect_delay_secs",
        signaling.reconnect_delay_secs,
        1,
        60,
    );
    if signaling.max_reconnect_delay_secs < signaling.reconnect_delay_secs {
        errors.push(format!(
            "signaling.max_reconnect_delay_secs = {} is below reconnect_delay_secs = {}",
            signaling.max_reconnect_delay_secs, signaling.reconnect_delay_secs
        ));
    }
}

/// Validate call constraints. Short ringing timeouts are not an error,
/// they fall back to the default at use.
pub(crate) fn validate_call(errors: &mut Vec<String>, config: &WorkspacesConfig) {
    let timeout = config.call.ringing_timeout_ms;
    if timeout > MAX_RINGING_TIMEOUT_MS {
        errors.push(format!(
            "call.ringing_timeout_ms = {timeout} exceeds {MAX_RINGING_TIMEOUT_MS}"
        ));
    }
}
