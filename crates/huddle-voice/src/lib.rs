//! Voice sessions for huddle: channel membership, peer-to-peer media
//! negotiation, local voice activity, and screen sharing over a relay.

pub mod error;
pub mod media;
pub mod peer;
pub mod protocol;
pub mod session;
pub mod signaling;
pub mod vad;

#[cfg(test)]
mod testing;

pub use error::{SignalingError, TransportError, VoiceError};
pub use media::{AudioSink, LevelMeter, MediaDevices, MediaSource, RemoteTrack, TrackKind};
pub use peer::{
    PeerConnection, PeerConnectionEvent, PeerConnectionFactory, PeerConnectionState,
    SessionDescription, SignalingState,
};
pub use protocol::{Envelope, VoiceMember};
pub use session::{EngineConfig, InputMode, LocalVoiceState, SessionManager, VoiceEvent};
pub use signaling::{ConnectionStatus, SignalingClient, SignalingConfig, SignalingEvent, SignalingTransport};
