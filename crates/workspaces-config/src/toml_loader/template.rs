//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# webrtc-workspaces configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[signaling]
url = "ws://127.0.0.1:8080"
# connect_timeout_secs = 15     # 1-120
# reconnect_delay_secs = 1      # 1-60
# max_reconnect_delay_secs = 30

[call]
# ringing_timeout_ms = 45000    # values below 10000 fall back to 45000

[storage]
# enabled = false               # persist workspace/attendee/access token
# path = "/path/to/session.json"

[relay]
# port = 8080
# max_attendees = 8             # 2-64
# session_ttl_secs = 300        # 60-86400

# [[relay.ice_servers]]
# urls = ["stun:stun.l.google.com:19302"]

# [[relay.ice_servers]]
# urls = ["turn:turn.example.com:3478"]
# username = "user"
# credential = "secret"

[logging]
# level = "INFO"                # TRACE, DEBUG, INFO, WARNING, ERROR
"##
    .to_string()
}
