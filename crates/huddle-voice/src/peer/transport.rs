//! Seam to the media-transport library.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::media::{MediaSource, RemoteTrack};

/// Description state of a connection, as the transport reports it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SignalingState {
    #[default]
    Stable,
    /// A local offer is applied and awaits an answer.
    LocalOffer,
    /// A remote offer is applied and awaits our answer.
    RemoteOffer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Aggregate connectivity of a peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Callbacks from the transport, delivered in order on one channel.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerConnectionEvent {
    /// A local ICE candidate was gathered and should be sent to the peer.
    IceCandidate(String),
    Track(RemoteTrack),
    TrackEnded { track_id: String },
    StateChanged(PeerConnectionState),
}

/// One media connection to one remote peer.
///
/// Description-changing calls fail with `TransportError::InvalidState`
/// when the current `signaling_state` does not allow them.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    fn signaling_state(&self) -> SignalingState;

    async fn create_offer(&self) -> Result<SessionDescription, TransportError>;

    async fn create_answer(&self) -> Result<SessionDescription, TransportError>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), TransportError>;

    async fn set_remote_description(&self, desc: SessionDescription)
        -> Result<(), TransportError>;

    /// Revert a pending local or remote offer back to `Stable`.
    async fn rollback(&self) -> Result<(), TransportError>;

    async fn add_ice_candidate(&self, candidate: &str) -> Result<(), TransportError>;

    async fn add_track(&self, source: Arc<dyn MediaSource>) -> Result<(), TransportError>;

    async fn remove_track(&self, track_id: &str) -> Result<(), TransportError>;

    async fn close(&self);
}

/// Creates peer connections configured with the deployment's ICE servers.
pub trait PeerConnectionFactory: Send + Sync {
    #[allow(clippy::type_complexity)]
    fn create(
        &self,
        local_user_id: &str,
        remote_user_id: &str,
    ) -> Result<
        (
            Arc<dyn PeerConnection>,
            mpsc::UnboundedReceiver<PeerConnectionEvent>,
        ),
        TransportError,
    >;
}
