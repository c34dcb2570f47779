//! Validation for the relay server section.

use std::sync::LazyLock;

use regex::Regex;

use crate::schema::WorkspacesConfig;

use super::helpers::{validate_pattern, validate_range};

static ICE_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(stun|stuns|turn|turns):\S+$").unwrap());

/// Validate relay constraints.
pub(crate) fn validate_relay(errors: &mut Vec<String>, config: &WorkspacesConfig) {
    let relay = &config.relay;
    validate_range(errors, "relay.port", u32::from(relay.port), 1, 65535);
    validate_range(errors, "relay.max_attendees", relay.max_attendees, 2, 64);
    validate_range(
        errors,
        "relay.session_ttl_secs",
        relay.session_ttl_secs,
        60,
        86_400,
    );

    for (i, server) in relay.ice_servers.iter().enumerate() {
        if server.urls.is_empty() {
            errors.push(format!("relay.ice_servers[{i}].urls is empty"));
        }
        for url in &server.urls {
            validate_pattern(
                errors,
                &format!("relay.ice_servers[{i}].urls"),
                url,
                &ICE_URL_RE,
                "a stun: or turn: url",
            );
        }
    }
}
