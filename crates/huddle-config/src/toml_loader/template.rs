//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# Huddle Configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[signaling]
# endpoint = "ws://127.0.0.1:8080/ws"
# token = "..."
# connect_timeout_secs = 15      # 1-120
# heartbeat_interval_secs = 25   # 5-300
# reconnect = true
# reconnect_delay_secs = 1       # 1-60
# max_reconnect_delay_secs = 30  # >= reconnect_delay_secs

[voice]
# input_mode = "activity"        # "activity" | "push_to_talk"
# ptt_key = "Backquote"

[voice.vad]
# interval_ms = 50               # 10-500
# threshold = 0.06               # 0.0-1.0
# release_samples = 8            # 1-100

[relay]
# port = 8080
# handshake_timeout_secs = 10     # 1-120

[logging]
# level = "INFO"                 # DEBUG | INFO | WARNING | ERROR
"##
    .to_string()
}
