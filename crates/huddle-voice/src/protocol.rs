//! Wire protocol for voice signaling.
//!
//! Every frame exchanged with the relay is a JSON object tagged by
//! `type`. The set of kinds is closed: adding one means adding a variant
//! here and a match arm in the dispatcher.

use serde::{Deserialize, Serialize};

/// One participant of a voice channel as seen by the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceMember {
    pub user_id: String,
    #[serde(default, alias = "user_name")]
    pub display_name: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub is_muted: bool,
    #[serde(default)]
    pub is_deafened: bool,
}

impl VoiceMember {
    pub fn new(user_id: &str, display_name: &str, channel_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            channel_id: channel_id.to_string(),
            is_muted: false,
            is_deafened: false,
        }
    }
}

/// A signaling envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// Relay → client, first frame after connect.
    Identity { user_id: String },
    JoinVoice {
        channel_id: String,
        user_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_name: Option<String>,
    },
    LeaveVoice {
        channel_id: String,
        user_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_name: Option<String>,
    },
    /// Relay → client roster snapshot.
    VoiceMembers {
        channel_id: String,
        members: Vec<VoiceMember>,
    },
    VoicePeerJoined {
        channel_id: String,
        user_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_name: Option<String>,
    },
    VoicePeerLeft {
        channel_id: String,
        user_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_name: Option<String>,
    },
    VoiceOffer {
        channel_id: String,
        target_user_id: String,
        from_user_id: String,
        sdp: String,
    },
    VoiceAnswer {
        channel_id: String,
        target_user_id: String,
        from_user_id: String,
        sdp: String,
    },
    IceCandidate {
        channel_id: String,
        target_user_id: String,
        from_user_id: String,
        candidate: String,
    },
    VoiceTalking {
        channel_id: String,
        user_id: String,
        talking: bool,
    },
    VoiceStatusUpdate {
        channel_id: String,
        user_id: String,
        is_muted: bool,
        is_deafened: bool,
    },
}

impl Envelope {
    /// The wire `type` tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Identity { .. } => "identity",
            Self::JoinVoice { .. } => "join_voice",
            Self::LeaveVoice { .. } => "leave_voice",
            Self::VoiceMembers { .. } => "voice_members",
            Self::VoicePeerJoined { .. } => "voice_peer_joined",
            Self::VoicePeerLeft { .. } => "voice_peer_left",
            Self::VoiceOffer { .. } => "voice_offer",
            Self::VoiceAnswer { .. } => "voice_answer",
            Self::IceCandidate { .. } => "ice_candidate",
            Self::VoiceTalking { .. } => "voice_talking",
            Self::VoiceStatusUpdate { .. } => "voice_status_update",
        }
    }

    pub fn channel_id(&self) -> Option<&str> {
        match self {
            Self::Identity { .. } => None,
            Self::JoinVoice { channel_id, .. }
            | Self::LeaveVoice { channel_id, .. }
            | Self::VoiceMembers { channel_id, .. }
            | Self::VoicePeerJoined { channel_id, .. }
            | Self::VoicePeerLeft { channel_id, .. }
            | Self::VoiceOffer { channel_id, .. }
            | Self::VoiceAnswer { channel_id, .. }
            | Self::IceCandidate { channel_id, .. }
            | Self::VoiceTalking { channel_id, .. }
            | Self::VoiceStatusUpdate { channel_id, .. } => Some(channel_id),
        }
    }

    /// Recipient of a peer-directed envelope; `None` for broadcasts.
    pub fn target_user_id(&self) -> Option<&str> {
        match self {
            Self::VoiceOffer { target_user_id, .. }
            | Self::VoiceAnswer { target_user_id, .. }
            | Self::IceCandidate { target_user_id, .. } => Some(target_user_id),
            _ => None,
        }
    }

    /// Sender of a peer-directed envelope; `None` for broadcasts.
    pub fn from_user_id(&self) -> Option<&str> {
        match self {
            Self::VoiceOffer { from_user_id, .. }
            | Self::VoiceAnswer { from_user_id, .. }
            | Self::IceCandidate { from_user_id, .. } => Some(from_user_id),
            _ => None,
        }
    }

    /// Overwrite the sender of a peer-directed envelope. Used by the relay,
    /// which never trusts the client-supplied value.
    pub fn set_from_user_id(&mut self, user_id: &str) {
        match self {
            Self::VoiceOffer { from_user_id, .. }
            | Self::VoiceAnswer { from_user_id, .. }
            | Self::IceCandidate { from_user_id, .. } => *from_user_id = user_id.to_string(),
            _ => {}
        }
    }
}
