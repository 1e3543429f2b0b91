//! One negotiated media connection per remote participant.
//!
//! Negotiation follows the perfect-negotiation pattern: each pair of peers
//! agrees on a polite and an impolite side from their user ids alone, and
//! offer collisions are resolved by the polite side rolling back.

mod negotiation;
mod session;
mod transport;


pub use negotiation::{is_polite, NegotiationPhase};
pub(crate) use session::PeerInput;
pub use session::{NegotiationOutcome, OfferOutcome, PeerNotice, PeerSession, PeerSessionParams};
pub use transport::{
    PeerConnection, PeerConnectionEvent, PeerConnectionFactory, PeerConnectionState, SdpKind,
    SessionDescription, SignalingState,
};
