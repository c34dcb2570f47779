//! Tests for the full validation pipeline.

use super::*;
use crate::schema::*;

#[test]
fn default_config_validates() {
    let config = WorkspacesConfig::default();
    assert!(validate(&config).is_ok());
}

#[test]
fn accepts_secure_signaling_url_with_path() {
    let mut config = WorkspacesConfig::default();
    config.signaling.url = "wss://relay.example.com:9443/ws".into();
    assert!(validate(&config).is_ok());
}

#[test]
fn catches_http_signaling_url() {
    let mut config = WorkspacesConfig::default();
    config.signaling.url = "https://relay.example.com".into();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("signaling.url"));
}

#[test]
fn catches_connect_timeout_zero() {
    let mut config = WorkspacesConfig::default();
    config.signaling.connect_timeout_secs = 0;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("signaling.connect_timeout_secs"));
}

#[test]
fn catches_backoff_cap_below_base() {
    let mut config = WorkspacesConfig::default();
    config.signaling.reconnect_delay_secs = 10;
    config.signaling.max_reconnect_delay_secs = 5;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("signaling.max_reconnect_delay_secs"));
}

#[test]
fn short_ringing_timeout_is_not_an_error() {
    let mut config = WorkspacesConfig::default();
    config.call.ringing_timeout_ms = 1000;
    assert!(validate(&config).is_ok());
}

#[test]
fn catches_huge_ringing_timeout() {
    let mut config = WorkspacesConfig::default();
    config.call.ringing_timeout_ms = 3_600_000;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("call.ringing_timeout_ms"));
}

#[test]
fn catches_single_seat_workspace() {
    let mut config = WorkspacesConfig::default();
    config.relay.max_attendees = 1;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("relay.max_attendees"));
}

#[test]
fn catches_port_zero() {
    let mut config = WorkspacesConfig::default();
    config.relay.port = 0;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("relay.port"));
}

#[test]
fn catches_bad_ice_server_url() {
    let mut config = WorkspacesConfig::default();
    config.relay.ice_servers[0].urls = vec!["http://stun.example.com".into()];
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("relay.ice_servers[0].urls"));
}

#[test]
fn catches_empty_ice_server_urls() {
    let mut config = WorkspacesConfig::default();
    config.relay.ice_servers[0].urls.clear();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("is empty"));
}

#[test]
fn collects_multiple_errors() {
    let mut config = WorkspacesConfig::default();
    config.signaling.url = "nope".into();
    config.relay.session_ttl_secs = 1;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("signaling.url"));
    assert!(err.contains("relay.session_ttl_secs"));
    assert!(err.contains("; "));
}
