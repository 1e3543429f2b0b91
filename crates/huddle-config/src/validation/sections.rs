//! Validation for the signaling, voice, and relay sections.

use crate::schema::HuddleConfig;

use super::helpers::{validate_range, validate_range_f64};

/// Validate signaling endpoint and timing constraints.
pub(crate) fn validate_signaling(errors: &mut Vec<String>, config: &HuddleConfig) {
    let s = &config.signaling;
    if !(s.endpoint.starts_with("ws://") || s.endpoint.starts_with("wss://")) {
        errors.push(format!(
            "signaling.endpoint = {:?} must be a ws:// or wss:// URL",
            s.endpoint
        ));
    }
    validate_range(
        errors,
        "signaling.connect_timeout_secs",
        s.connect_timeout_secs,
        1,
        120,
    );
    validate_range(
        errors,
        "signaling.heartbeat_interval_secs",
        s.heartbeat_interval_secs,
        5,
        300,
    );
    validate_range(
        errors,
        "signaling.reconnect_delay_secs",
        s.reconnect_delay_secs,
        1,
        60,
    );
    if s.max_reconnect_delay_secs < s.reconnect_delay_secs {
        errors.push(format!(
            "signaling.max_reconnect_delay_secs = {} is below reconnect_delay_secs = {}",
            s.max_reconnect_delay_secs, s.reconnect_delay_secs
        ));
    }
}

/// Validate voice-activity detection constraints.
pub(crate) fn validate_voice(errors: &mut Vec<String>, config: &HuddleConfig) {
    let vad = &config.voice.vad;
    validate_range(errors, "voice.vad.interval_ms", vad.interval_ms, 10, 500);
    validate_range_f64(errors, "voice.vad.threshold", vad.threshold, 0.0, 1.0);
    validate_range(
        errors,
        "voice.vad.release_samples",
        u64::from(vad.release_samples),
        1,
        100,
    );
}

/// Validate relay constraints.
pub(crate) fn validate_relay(errors: &mut Vec<String>, config: &HuddleConfig) {
    validate_range(
        errors,
        "relay.handshake_timeout_secs",
        config.relay.handshake_timeout_secs,
        1,
        120,
    );
}
