//! Per-peer negotiation and media routing.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::TransportError;
use crate::media::{AudioSink, MediaDevices, MediaSource, RemoteTrack, TrackKind};
use crate::protocol::Envelope;
use crate::signaling::SignalingTransport;

use super::negotiation::{is_polite, MakingOfferGuard, NegotiationPhase};
use super::transport::{
    PeerConnection, PeerConnectionEvent, PeerConnectionFactory, PeerConnectionState,
    SessionDescription, SignalingState,
};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Everything a session needs at creation.
pub struct PeerSessionParams {
    pub local_user_id: String,
    pub remote_user_id: String,
    pub channel_id: String,
    pub signaling: Arc<dyn SignalingTransport>,
    pub devices: Arc<dyn MediaDevices>,
    /// Local sources to carry from the start.
    pub sources: Vec<Arc<dyn MediaSource>>,
    /// Whether remote audio starts muted (local user is deafened).
    pub output_muted: bool,
    pub notices: mpsc::UnboundedSender<PeerNotice>,
}

/// Session-level happenings the owner has to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerNotice {
    ScreenShareStarted { user_id: String, track: RemoteTrack },
    ScreenShareEnded { user_id: String, track_id: String },
    /// The transport failed permanently; the session should be dropped.
    Failed { user_id: String },
}

/// Inputs serialized through the session's run loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PeerInput {
    Offer(String),
    Answer(String),
    Candidate(String),
    Renegotiate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationOutcome {
    /// An offer was applied locally and sent.
    Sent,
    /// An offer was already in flight or the session was not stable.
    Skipped,
    /// State moved underneath the attempt; the offer was dropped unsent.
    Aborted,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferOutcome {
    Accepted,
    /// Collided with our own offer and we are the impolite side.
    Ignored,
    Failed,
}

#[derive(Default)]
struct SessionState {
    has_remote_description: bool,
    /// Bumped whenever a remote offer is taken; offers produced across a
    /// bump are stale.
    remote_offers_accepted: u64,
    /// At least one offer/answer exchange completed.
    exchanged: bool,
    pending_candidates: Vec<String>,
    local_tracks: Vec<String>,
    audio_sinks: Vec<(String, Box<dyn AudioSink>)>,
    remote_video: HashSet<String>,
    output_muted: bool,
    closed: bool,
}

pub(crate) struct PeerTasks {
    inbox: mpsc::UnboundedReceiver<PeerInput>,
    events: mpsc::UnboundedReceiver<PeerConnectionEvent>,
}

// ---------------------------------------------------------------------------
// Peer Session
// ---------------------------------------------------------------------------

/// The connection to one remote member of the joined channel.
pub struct PeerSession {
    local_user_id: String,
    remote_user_id: String,
    channel_id: String,
    polite: bool,
    connection: Arc<dyn PeerConnection>,
    signaling: Arc<dyn SignalingTransport>,
    devices: Arc<dyn MediaDevices>,
    making_offer: AtomicBool,
    state: Mutex<SessionState>,
    inbox: mpsc::UnboundedSender<PeerInput>,
    notices: mpsc::UnboundedSender<PeerNotice>,
    token: CancellationToken,
}

impl PeerSession {
    /// Create the session and start its run loop. The impolite side
    /// queues the first offer; the polite side waits for it.
    pub async fn spawn(
        params: PeerSessionParams,
        factory: &dyn PeerConnectionFactory,
    ) -> Result<Arc<Self>, TransportError> {
        let (session, tasks) = Self::open(params, factory).await?;
        tokio::spawn(Arc::clone(&session).run(tasks));
        if !session.polite {
            session.request_negotiation();
        }
        Ok(session)
    }

    /// Create the session without a run loop.
    pub(crate) async fn open(
        params: PeerSessionParams,
        factory: &dyn PeerConnectionFactory,
    ) -> Result<(Arc<Self>, PeerTasks), TransportError> {
        let (connection, events) = factory.create(&params.local_user_id, &params.remote_user_id)?;
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();

        let session = Arc::new(Self {
            polite: is_polite(&params.local_user_id, &params.remote_user_id),
            local_user_id: params.local_user_id,
            remote_user_id: params.remote_user_id,
            channel_id: params.channel_id,
            connection,
            signaling: params.signaling,
            devices: params.devices,
            making_offer: AtomicBool::new(false),
            state: Mutex::new(SessionState {
                output_muted: params.output_muted,
                ..Default::default()
            }),
            inbox: inbox_tx,
            notices: params.notices,
            token: CancellationToken::new(),
        });

        for source in params.sources {
            session.add_local_track(source).await;
        }

        info!(
            remote_user_id = %session.remote_user_id,
            polite = session.polite,
            "Peer session created"
        );

        let tasks = PeerTasks {
            inbox: inbox_rx,
            events,
        };
        Ok((session, tasks))
    }

    async fn run(self: Arc<Self>, tasks: PeerTasks) {
        let PeerTasks {
            mut inbox,
            mut events,
        } = tasks;
        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                Some(input) = inbox.recv() => self.handle_input(input).await,
                Some(event) = events.recv() => self.handle_transport_event(event).await,
            }
        }
        debug!(remote_user_id = %self.remote_user_id, "Peer session loop exited");
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue an inbound signaling input for the run loop.
    pub(crate) fn deliver(&self, input: PeerInput) {
        let _ = self.inbox.send(input);
    }

    /// Ask for a renegotiation. Runs as its own task so inbound offers can
    /// interleave with it.
    pub fn request_negotiation(&self) {
        self.deliver(PeerInput::Renegotiate);
    }

    async fn handle_input(self: &Arc<Self>, input: PeerInput) {
        match input {
            PeerInput::Offer(sdp) => {
                self.handle_offer(&sdp).await;
            }
            PeerInput::Answer(sdp) => {
                self.handle_answer(&sdp).await;
            }
            PeerInput::Candidate(candidate) => self.handle_candidate(&candidate).await,
            PeerInput::Renegotiate => {
                let session = Arc::clone(self);
                let token = self.token.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = token.cancelled() => {}
                        _ = session.negotiate() => {}
                    }
                });
            }
        }
    }

    // -----------------------------------------------------------------------
    // Negotiation
    // -----------------------------------------------------------------------

    /// Produce and send an offer if nothing else is in flight.
    pub async fn negotiate(&self) -> NegotiationOutcome {
        if self.is_closed() {
            return NegotiationOutcome::Skipped;
        }
        let Some(_guard) = MakingOfferGuard::acquire(&self.making_offer) else {
            debug!(remote_user_id = %self.remote_user_id, "Offer already in flight");
            return NegotiationOutcome::Skipped;
        };
        if self.connection.signaling_state() != SignalingState::Stable {
            debug!(remote_user_id = %self.remote_user_id, "Not stable; skipping offer");
            return NegotiationOutcome::Skipped;
        }
        let generation = self.state().remote_offers_accepted;

        let offer = match self.connection.create_offer().await {
            Ok(offer) => offer,
            Err(e) => return self.offer_failed("create_offer", &e),
        };

        // Anything may have happened while the offer was being produced.
        if self.is_closed() {
            return NegotiationOutcome::Aborted;
        }
        if self.connection.signaling_state() != SignalingState::Stable
            || self.state().remote_offers_accepted != generation
        {
            debug!(remote_user_id = %self.remote_user_id, "State changed during offer; dropping it");
            return NegotiationOutcome::Aborted;
        }

        let sdp = offer.sdp.clone();
        if let Err(e) = self.connection.set_local_description(offer).await {
            return self.offer_failed("set_local_description", &e);
        }

        // A remote offer accepted while ours was being applied wins.
        if self.state().remote_offers_accepted != generation {
            debug!(remote_user_id = %self.remote_user_id, "Remote offer arrived during commit; rolling back ours");
            if self.connection.signaling_state() == SignalingState::LocalOffer {
                if let Err(e) = self.connection.rollback().await {
                    self.log_transport_error("rollback", &e);
                }
            }
            return NegotiationOutcome::Aborted;
        }
        if self.is_closed() {
            return NegotiationOutcome::Aborted;
        }

        let sent = self
            .send(Envelope::VoiceOffer {
                channel_id: self.channel_id.clone(),
                target_user_id: self.remote_user_id.clone(),
                from_user_id: self.local_user_id.clone(),
                sdp,
            })
            .await;
        if sent {
            debug!(remote_user_id = %self.remote_user_id, "Offer sent");
            NegotiationOutcome::Sent
        } else {
            NegotiationOutcome::Failed
        }
    }

    fn offer_failed(&self, step: &'static str, err: &TransportError) -> NegotiationOutcome {
        self.log_transport_error(step, err);
        if err.is_negotiation_race() {
            NegotiationOutcome::Aborted
        } else {
            NegotiationOutcome::Failed
        }
    }

    /// Apply a remote offer, resolving collisions by politeness.
    pub async fn handle_offer(&self, sdp: &str) -> OfferOutcome {
        if self.is_closed() {
            return OfferOutcome::Ignored;
        }
        let state = self.connection.signaling_state();
        let collision =
            self.making_offer.load(Ordering::Acquire) || state != SignalingState::Stable;

        if collision && !self.polite {
            debug!(remote_user_id = %self.remote_user_id, "Offer collision; keeping ours");
            return OfferOutcome::Ignored;
        }

        // Mark before awaiting so an offer attempt in progress sees it.
        self.state().remote_offers_accepted += 1;

        // Our own offer may have been committed since `state` was read.
        if self.connection.signaling_state() != SignalingState::Stable {
            debug!(remote_user_id = %self.remote_user_id, "Offer collision; rolling back ours");
            if let Err(e) = self.connection.rollback().await {
                self.log_transport_error("rollback", &e);
                return OfferOutcome::Failed;
            }
        }

        if let Err(e) = self
            .connection
            .set_remote_description(SessionDescription::offer(sdp))
            .await
        {
            self.log_transport_error("set_remote_description", &e);
            return OfferOutcome::Failed;
        }
        self.state().has_remote_description = true;
        self.flush_candidates().await;

        let answer = match self.connection.create_answer().await {
            Ok(answer) => answer,
            Err(e) => {
                self.log_transport_error("create_answer", &e);
                return OfferOutcome::Failed;
            }
        };
        if self.is_closed() {
            return OfferOutcome::Ignored;
        }
        let sdp = answer.sdp.clone();
        if let Err(e) = self.connection.set_local_description(answer).await {
            self.log_transport_error("set_local_description", &e);
            return OfferOutcome::Failed;
        }
        self.state().exchanged = true;

        self.send(Envelope::VoiceAnswer {
            channel_id: self.channel_id.clone(),
            target_user_id: self.remote_user_id.clone(),
            from_user_id: self.local_user_id.clone(),
            sdp,
        })
        .await;
        OfferOutcome::Accepted
    }

    /// Apply a remote answer. Only valid while our offer is outstanding.
    pub async fn handle_answer(&self, sdp: &str) -> bool {
        if self.is_closed() {
            return false;
        }
        if self.connection.signaling_state() != SignalingState::LocalOffer {
            debug!(remote_user_id = %self.remote_user_id, "Discarding answer with no outstanding offer");
            return false;
        }
        if let Err(e) = self
            .connection
            .set_remote_description(SessionDescription::answer(sdp))
            .await
        {
            self.log_transport_error("set_remote_description", &e);
            return false;
        }
        {
            let mut state = self.state();
            state.has_remote_description = true;
            state.exchanged = true;
        }
        self.flush_candidates().await;
        true
    }

    /// Apply a remote ICE candidate, buffering it until a remote
    /// description exists.
    pub async fn handle_candidate(&self, candidate: &str) {
        {
            let mut state = self.state();
            if state.closed {
                return;
            }
            if !state.has_remote_description {
                state.pending_candidates.push(candidate.to_string());
                return;
            }
        }
        self.apply_candidate(candidate).await;
    }

    async fn flush_candidates(&self) {
        let pending = std::mem::take(&mut self.state().pending_candidates);
        if !pending.is_empty() {
            debug!(remote_user_id = %self.remote_user_id, count = pending.len(), "Replaying buffered candidates");
        }
        for candidate in pending {
            self.apply_candidate(&candidate).await;
        }
    }

    async fn apply_candidate(&self, candidate: &str) {
        if let Err(e) = self.connection.add_ice_candidate(candidate).await {
            self.log_transport_error("add_ice_candidate", &e);
        }
    }

    // -----------------------------------------------------------------------
    // Transport events
    // -----------------------------------------------------------------------

    async fn handle_transport_event(&self, event: PeerConnectionEvent) {
        match event {
            PeerConnectionEvent::IceCandidate(candidate) => {
                self.send(Envelope::IceCandidate {
                    channel_id: self.channel_id.clone(),
                    target_user_id: self.remote_user_id.clone(),
                    from_user_id: self.local_user_id.clone(),
                    candidate,
                })
                .await;
            }
            PeerConnectionEvent::Track(track) => self.on_remote_track(track),
            PeerConnectionEvent::TrackEnded { track_id } => self.on_remote_track_ended(&track_id),
            PeerConnectionEvent::StateChanged(state) => {
                debug!(remote_user_id = %self.remote_user_id, ?state, "Peer connection state");
                if state == PeerConnectionState::Failed && !self.is_closed() {
                    warn!(remote_user_id = %self.remote_user_id, "Peer connection failed");
                    let _ = self.notices.send(PeerNotice::Failed {
                        user_id: self.remote_user_id.clone(),
                    });
                }
            }
        }
    }

    fn on_remote_track(&self, track: RemoteTrack) {
        match track.kind {
            TrackKind::Audio => {
                let mut sink = self.devices.attach_remote_audio(&self.remote_user_id, &track);
                let mut state = self.state();
                if state.closed {
                    sink.detach();
                    return;
                }
                sink.set_muted(state.output_muted);
                state.audio_sinks.push((track.id.clone(), sink));
                debug!(remote_user_id = %self.remote_user_id, track_id = %track.id, "Remote audio attached");
            }
            TrackKind::Video => {
                {
                    let mut state = self.state();
                    if state.closed || !state.remote_video.insert(track.id.clone()) {
                        return;
                    }
                }
                info!(remote_user_id = %self.remote_user_id, track_id = %track.id, "Remote screen share started");
                let _ = self.notices.send(PeerNotice::ScreenShareStarted {
                    user_id: self.remote_user_id.clone(),
                    track,
                });
            }
        }
    }

    fn on_remote_track_ended(&self, track_id: &str) {
        let (was_video, sink) = {
            let mut state = self.state();
            let was_video = state.remote_video.remove(track_id);
            let sink = state
                .audio_sinks
                .iter()
                .position(|(id, _)| id == track_id)
                .map(|i| state.audio_sinks.remove(i).1);
            (was_video, sink)
        };
        if let Some(mut sink) = sink {
            sink.detach();
        }
        if was_video {
            info!(remote_user_id = %self.remote_user_id, track_id, "Remote screen share ended");
            let _ = self.notices.send(PeerNotice::ScreenShareEnded {
                user_id: self.remote_user_id.clone(),
                track_id: track_id.to_string(),
            });
        }
    }

    // -----------------------------------------------------------------------
    // Local media
    // -----------------------------------------------------------------------

    async fn add_local_track(&self, source: Arc<dyn MediaSource>) -> bool {
        let track_id = source.id().to_string();
        {
            let state = self.state();
            if state.closed || state.local_tracks.contains(&track_id) {
                return false;
            }
        }
        if let Err(e) = self.connection.add_track(source).await {
            self.log_transport_error("add_track", &e);
            return false;
        }
        self.state().local_tracks.push(track_id);
        true
    }

    /// Start sending a local source and renegotiate.
    pub async fn attach_source(&self, source: Arc<dyn MediaSource>) {
        if self.add_local_track(source).await {
            self.request_negotiation();
        }
    }

    /// Stop sending a local source and renegotiate.
    pub async fn detach_source(&self, track_id: &str) {
        {
            let state = self.state();
            if state.closed || !state.local_tracks.iter().any(|id| id == track_id) {
                return;
            }
        }
        if let Err(e) = self.connection.remove_track(track_id).await {
            self.log_transport_error("remove_track", &e);
        }
        self.state().local_tracks.retain(|id| id != track_id);
        self.request_negotiation();
    }

    /// Mute or unmute playback of this peer's audio.
    pub fn set_output_muted(&self, muted: bool) {
        let mut state = self.state();
        state.output_muted = muted;
        for (_, sink) in state.audio_sinks.iter_mut() {
            sink.set_muted(muted);
        }
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Release the transport and playback sinks. Idempotent.
    pub async fn close(&self) {
        let sinks = {
            let mut state = self.state();
            if state.closed {
                return;
            }
            state.closed = true;
            state.pending_candidates.clear();
            state.remote_video.clear();
            std::mem::take(&mut state.audio_sinks)
        };
        self.token.cancel();
        for (_, mut sink) in sinks {
            sink.detach();
        }
        self.connection.close().await;
        info!(remote_user_id = %self.remote_user_id, "Peer session closed");
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn send(&self, envelope: Envelope) -> bool {
        let kind = envelope.kind();
        match self.signaling.send(envelope).await {
            Ok(()) => true,
            Err(e) => {
                warn!(remote_user_id = %self.remote_user_id, kind, error = %e, "Signaling send failed");
                false
            }
        }
    }

    fn log_transport_error(&self, step: &'static str, err: &TransportError) {
        if err.is_negotiation_race() {
            warn!(remote_user_id = %self.remote_user_id, step, error = %err, "Negotiation race ignored");
        } else {
            error!(remote_user_id = %self.remote_user_id, step, error = %err, "Peer transport error");
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn remote_user_id(&self) -> &str {
        &self.remote_user_id
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn is_polite(&self) -> bool {
        self.polite
    }

    pub fn signaling_state(&self) -> SignalingState {
        self.connection.signaling_state()
    }

    pub fn phase(&self) -> NegotiationPhase {
        let exchanged = self.state().exchanged;
        NegotiationPhase::derive(
            self.connection.signaling_state(),
            self.making_offer.load(Ordering::Acquire),
            exchanged,
        )
    }

    pub fn is_making_offer(&self) -> bool {
        self.making_offer.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    pub fn pending_candidates(&self) -> usize {
        self.state().pending_candidates.len()
    }

    pub fn local_track_ids(&self) -> Vec<String> {
        self.state().local_tracks.clone()
    }

    pub fn remote_screen_tracks(&self) -> Vec<String> {
        self.state().remote_video.iter().cloned().collect()
    }
}
