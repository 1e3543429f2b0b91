//! Error types for the voice engine.

use huddle_common::{DeviceError, HuddleError};

/// Errors reported by the media-transport library backing a peer connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The transport refused a transition from its current signaling state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid ICE candidate: {0}")]
    InvalidCandidate(String),

    #[error("peer connection closed")]
    Closed,

    #[error("transport failure: {0}")]
    Failed(String),
}

impl TransportError {
    /// Errors expected when negotiation triggers interleave. These are
    /// logged and swallowed, never surfaced.
    pub fn is_negotiation_race(&self) -> bool {
        matches!(self, Self::InvalidState(_) | Self::InvalidCandidate(_))
    }
}

/// Errors from the signaling channel.
#[derive(Debug, thiserror::Error)]
pub enum SignalingError {
    #[error("signaling channel not connected")]
    NotConnected,

    #[error("no identity assigned by the relay yet")]
    NoIdentity,

    #[error("failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("signaling channel closed")]
    Closed,
}

/// Errors surfaced by the public `SessionManager` contract.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("not in a voice channel")]
    NotJoined,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Signaling(#[from] SignalingError),
}

impl From<VoiceError> for HuddleError {
    fn from(err: VoiceError) -> Self {
        match err {
            VoiceError::Device(e) => HuddleError::Device(e),
            VoiceError::Signaling(e) => HuddleError::Signaling(e.to_string()),
            other => HuddleError::Other(other.to_string()),
        }
    }
}
