//! Types, configuration, and events for the session manager.

use huddle_common::DeviceError;
use huddle_config::schema::{HuddleConfig, InputModeSetting};
use serde::Serialize;

use crate::media::RemoteTrack;
use crate::protocol::VoiceMember;
use crate::signaling::ConnectionStatus;
use crate::vad::VadSettings;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    #[default]
    Activity,
    PushToTalk,
}

impl From<InputModeSetting> for InputMode {
    fn from(setting: InputModeSetting) -> Self {
        match setting {
            InputModeSetting::Activity => Self::Activity,
            InputModeSetting::PushToTalk => Self::PushToTalk,
        }
    }
}

/// The local participant's state, as shown to the UI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LocalVoiceState {
    pub joined_channel_id: Option<String>,
    pub is_muted: bool,
    /// Implies muted while set.
    pub is_deafened: bool,
    pub is_talking: bool,
    pub input_mode: InputMode,
    pub is_screen_sharing: bool,
}

/// Runtime settings for a `SessionManager`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Name announced with `join_voice`.
    pub display_name: String,
    pub vad: VadSettings,
    pub input_mode: InputMode,
}

impl EngineConfig {
    pub fn from_config(config: &HuddleConfig, display_name: &str) -> Self {
        Self {
            display_name: display_name.to_string(),
            vad: VadSettings::from(&config.voice.vad),
            input_mode: config.voice.input_mode.into(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_config(&HuddleConfig::default(), "")
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Events emitted by the voice engine for the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceEvent {
    Joined {
        channel_id: String,
    },
    Left {
        channel_id: String,
    },
    MemberJoined {
        channel_id: String,
        member: VoiceMember,
    },
    MemberLeft {
        channel_id: String,
        user_id: String,
    },
    MemberUpdated {
        channel_id: String,
        member: VoiceMember,
    },
    /// A roster snapshot replaced the channel's members.
    RosterReplaced {
        channel_id: String,
        members: Vec<VoiceMember>,
    },
    TalkingChanged {
        user_id: String,
        talking: bool,
    },
    LocalStateChanged(LocalVoiceState),
    ScreenShareStarted {
        user_id: String,
        track: RemoteTrack,
    },
    ScreenShareEnded {
        user_id: String,
    },
    ConnectionChanged(ConnectionStatus),
    IdentityAssigned {
        user_id: String,
    },
    /// Capture failed; the action that needed the device did not happen.
    DeviceFailed {
        error: DeviceError,
    },
    PeerFailed {
        user_id: String,
    },
}
