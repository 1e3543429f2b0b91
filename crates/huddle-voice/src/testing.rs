//! In-memory fakes for the transport, device and signaling seams.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use huddle_common::DeviceError;
use tokio::sync::{mpsc, watch, Semaphore};

use crate::error::{SignalingError, TransportError};
use crate::media::{AudioSink, LevelMeter, MediaDevices, MediaSource, RemoteTrack, TrackKind};
use crate::peer::{
    PeerConnection, PeerConnectionEvent, PeerConnectionFactory, SdpKind, SessionDescription,
    SignalingState,
};
use crate::protocol::Envelope;
use crate::signaling::{ConnectionStatus, SignalingTransport};

/// Poll `cond` while letting spawned tasks run, up to a bounded number of yields.
pub(crate) async fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::task::yield_now().await;
    }
    for _ in 0..50 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

// ---------------------------------------------------------------------------
// Media
// ---------------------------------------------------------------------------

pub(crate) struct FakeSource {
    id: String,
    kind: TrackKind,
    enabled: AtomicBool,
    stop_calls: AtomicUsize,
    ended_tx: watch::Sender<bool>,
    levels: Arc<Mutex<VecDeque<f32>>>,
    open_meters: Arc<AtomicUsize>,
}

impl FakeSource {
    fn new(id: &str, kind: TrackKind) -> Self {
        let (ended_tx, _) = watch::channel(false);
        Self {
            id: id.to_string(),
            kind,
            enabled: AtomicBool::new(true),
            stop_calls: AtomicUsize::new(0),
            ended_tx,
            levels: Arc::new(Mutex::new(VecDeque::new())),
            open_meters: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn microphone(id: &str) -> Self {
        Self::new(id, TrackKind::Audio)
    }

    pub(crate) fn screen(id: &str) -> Self {
        Self::new(id, TrackKind::Video)
    }

    /// Levels returned by successive meter samples; silence afterwards.
    pub(crate) fn script_levels(&self, levels: &[f32]) {
        self.levels.lock().unwrap().extend(levels.iter().copied());
    }

    pub(crate) fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn open_meters(&self) -> usize {
        self.open_meters.load(Ordering::SeqCst)
    }

    /// Simulate the OS ending the capture.
    pub(crate) fn end(&self) {
        self.ended_tx.send_replace(true);
    }
}

impl MediaSource for FakeSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn ended(&self) -> watch::Receiver<bool> {
        self.ended_tx.subscribe()
    }

    fn level_meter(&self) -> Option<Box<dyn LevelMeter>> {
        if self.kind != TrackKind::Audio {
            return None;
        }
        self.open_meters.fetch_add(1, Ordering::SeqCst);
        Some(Box::new(FakeMeter {
            levels: Arc::clone(&self.levels),
            open: Arc::clone(&self.open_meters),
        }))
    }
}

struct FakeMeter {
    levels: Arc<Mutex<VecDeque<f32>>>,
    open: Arc<AtomicUsize>,
}

impl LevelMeter for FakeMeter {
    fn sample(&mut self) -> f32 {
        self.levels.lock().unwrap().pop_front().unwrap_or(0.0)
    }
}

impl Drop for FakeMeter {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SinkRecord {
    pub user_id: String,
    pub track_id: String,
    pub muted: bool,
    pub detach_calls: usize,
}

struct FakeSink(Arc<Mutex<SinkRecord>>);

impl AudioSink for FakeSink {
    fn set_muted(&mut self, muted: bool) {
        self.0.lock().unwrap().muted = muted;
    }

    fn detach(&mut self) {
        self.0.lock().unwrap().detach_calls += 1;
    }
}

#[derive(Default)]
pub(crate) struct FakeDevices {
    mic_error: Mutex<Option<DeviceError>>,
    screen_error: Mutex<Option<DeviceError>>,
    microphones: Mutex<Vec<Arc<FakeSource>>>,
    screens: Mutex<Vec<Arc<FakeSource>>>,
    sinks: Mutex<Vec<Arc<Mutex<SinkRecord>>>>,
}

impl FakeDevices {
    pub(crate) fn fail_microphone(&self, err: DeviceError) {
        *self.mic_error.lock().unwrap() = Some(err);
    }

    pub(crate) fn fail_screen(&self, err: DeviceError) {
        *self.screen_error.lock().unwrap() = Some(err);
    }

    pub(crate) fn clear_failures(&self) {
        *self.mic_error.lock().unwrap() = None;
        *self.screen_error.lock().unwrap() = None;
    }

    pub(crate) fn microphones_opened(&self) -> usize {
        self.microphones.lock().unwrap().len()
    }

    pub(crate) fn screens_opened(&self) -> usize {
        self.screens.lock().unwrap().len()
    }

    pub(crate) fn last_microphone(&self) -> Option<Arc<FakeSource>> {
        self.microphones.lock().unwrap().last().cloned()
    }

    pub(crate) fn last_screen(&self) -> Option<Arc<FakeSource>> {
        self.screens.lock().unwrap().last().cloned()
    }

    pub(crate) fn sinks(&self) -> Vec<SinkRecord> {
        self.sinks
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.lock().unwrap().clone())
            .collect()
    }
}

#[async_trait]
impl MediaDevices for FakeDevices {
    async fn open_microphone(&self) -> Result<Arc<dyn MediaSource>, DeviceError> {
        if let Some(err) = self.mic_error.lock().unwrap().clone() {
            return Err(err);
        }
        let mut mics = self.microphones.lock().unwrap();
        let source = Arc::new(FakeSource::microphone(&format!("mic-{}", mics.len() + 1)));
        mics.push(Arc::clone(&source));
        Ok(source as Arc<dyn MediaSource>)
    }

    async fn open_screen(&self) -> Result<Arc<dyn MediaSource>, DeviceError> {
        if let Some(err) = self.screen_error.lock().unwrap().clone() {
            return Err(err);
        }
        let mut screens = self.screens.lock().unwrap();
        let source = Arc::new(FakeSource::screen(&format!("screen-{}", screens.len() + 1)));
        screens.push(Arc::clone(&source));
        Ok(source as Arc<dyn MediaSource>)
    }

    fn attach_remote_audio(&self, user_id: &str, track: &RemoteTrack) -> Box<dyn AudioSink> {
        let record = Arc::new(Mutex::new(SinkRecord {
            user_id: user_id.to_string(),
            track_id: track.id.clone(),
            muted: false,
            detach_calls: 0,
        }));
        self.sinks.lock().unwrap().push(Arc::clone(&record));
        Box::new(FakeSink(record))
    }
}

// ---------------------------------------------------------------------------
// Peer connection
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakePcState {
    signaling: SignalingState,
    offers: u32,
    answers: u32,
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    candidates: Vec<String>,
    tracks: Vec<String>,
    rollbacks: u32,
    close_calls: u32,
}

/// Parks callers until released. Open unless `hold` was called.
#[derive(Default)]
struct Gate {
    held: Mutex<Option<Arc<Semaphore>>>,
    waiting: AtomicUsize,
}

impl Gate {
    fn hold(&self) {
        *self.held.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    fn release(&self) {
        if let Some(gate) = self.held.lock().unwrap().take() {
            gate.add_permits(64);
        }
    }

    fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    async fn pass(&self) -> Result<(), TransportError> {
        let held = self.held.lock().unwrap().clone();
        let Some(gate) = held else {
            return Ok(());
        };
        self.waiting.fetch_add(1, Ordering::SeqCst);
        let permit = gate.acquire().await;
        self.waiting.fetch_sub(1, Ordering::SeqCst);
        permit.map(|_| ()).map_err(|_| TransportError::Closed)
    }
}

/// A peer connection that enforces the offer/answer state machine.
///
/// `create_offer`, and applying an offer locally or remotely, can each be
/// held open so tests can interleave them.
pub(crate) struct FakePeerConnection {
    label: String,
    state: Mutex<FakePcState>,
    events: mpsc::UnboundedSender<PeerConnectionEvent>,
    create_gate: Gate,
    local_offer_gate: Gate,
    remote_offer_gate: Gate,
}

impl FakePeerConnection {
    pub(crate) fn new(label: &str) -> (Self, mpsc::UnboundedReceiver<PeerConnectionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let pc = Self {
            label: label.to_string(),
            state: Mutex::new(FakePcState::default()),
            events,
            create_gate: Gate::default(),
            local_offer_gate: Gate::default(),
            remote_offer_gate: Gate::default(),
        };
        (pc, rx)
    }

    /// Make `create_offer` wait until `release_offers` is called.
    pub(crate) fn hold_offers(&self) {
        self.create_gate.hold();
    }

    pub(crate) fn release_offers(&self) {
        self.create_gate.release();
    }

    /// Make `set_local_description(offer)` wait before it takes effect.
    pub(crate) fn hold_local_offers(&self) {
        self.local_offer_gate.hold();
    }

    pub(crate) fn release_local_offers(&self) {
        self.local_offer_gate.release();
    }

    pub(crate) fn local_offers_waiting(&self) -> usize {
        self.local_offer_gate.waiting()
    }

    /// Make `set_remote_description(offer)` wait before it takes effect.
    pub(crate) fn hold_remote_offers(&self) {
        self.remote_offer_gate.hold();
    }

    pub(crate) fn release_remote_offers(&self) {
        self.remote_offer_gate.release();
    }

    pub(crate) fn remote_offers_waiting(&self) -> usize {
        self.remote_offer_gate.waiting()
    }

    pub(crate) fn emit(&self, event: PeerConnectionEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) fn rollbacks(&self) -> u32 {
        self.state.lock().unwrap().rollbacks
    }

    pub(crate) fn close_calls(&self) -> u32 {
        self.state.lock().unwrap().close_calls
    }

    pub(crate) fn candidates(&self) -> Vec<String> {
        self.state.lock().unwrap().candidates.clone()
    }

    pub(crate) fn tracks(&self) -> Vec<String> {
        self.state.lock().unwrap().tracks.clone()
    }

    pub(crate) fn local_description(&self) -> Option<SessionDescription> {
        self.state.lock().unwrap().local.clone()
    }

    pub(crate) fn remote_description(&self) -> Option<SessionDescription> {
        self.state.lock().unwrap().remote.clone()
    }

    fn invalid(state: SignalingState, op: &str) -> TransportError {
        TransportError::InvalidState(format!("{op} in {state:?}"))
    }
}

#[async_trait]
impl PeerConnection for FakePeerConnection {
    fn signaling_state(&self) -> SignalingState {
        self.state.lock().unwrap().signaling
    }

    async fn create_offer(&self) -> Result<SessionDescription, TransportError> {
        self.create_gate.pass().await?;
        let mut state = self.state.lock().unwrap();
        if state.close_calls > 0 {
            return Err(TransportError::Closed);
        }
        state.offers += 1;
        Ok(SessionDescription::offer(format!("offer:{}:{}", self.label, state.offers)))
    }

    async fn create_answer(&self) -> Result<SessionDescription, TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.signaling != SignalingState::RemoteOffer {
            return Err(Self::invalid(state.signaling, "create_answer"));
        }
        state.answers += 1;
        Ok(SessionDescription::answer(format!("answer:{}:{}", self.label, state.answers)))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), TransportError> {
        if desc.kind == SdpKind::Offer {
            self.local_offer_gate.pass().await?;
        }
        let mut state = self.state.lock().unwrap();
        let next = match (desc.kind, state.signaling) {
            (SdpKind::Offer, SignalingState::Stable | SignalingState::LocalOffer) => {
                SignalingState::LocalOffer
            }
            (SdpKind::Answer, SignalingState::RemoteOffer) => SignalingState::Stable,
            (_, current) => return Err(Self::invalid(current, "set_local_description")),
        };
        state.signaling = next;
        state.local = Some(desc);
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), TransportError> {
        if desc.kind == SdpKind::Offer {
            self.remote_offer_gate.pass().await?;
        }
        let mut state = self.state.lock().unwrap();
        let next = match (desc.kind, state.signaling) {
            (SdpKind::Offer, SignalingState::Stable | SignalingState::RemoteOffer) => {
                SignalingState::RemoteOffer
            }
            (SdpKind::Answer, SignalingState::LocalOffer) => SignalingState::Stable,
            (_, current) => return Err(Self::invalid(current, "set_remote_description")),
        };
        state.signaling = next;
        state.remote = Some(desc);
        Ok(())
    }

    async fn rollback(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.signaling == SignalingState::Stable {
            return Err(Self::invalid(state.signaling, "rollback"));
        }
        state.signaling = SignalingState::Stable;
        state.rollbacks += 1;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.remote.is_none() {
            return Err(Self::invalid(state.signaling, "add_ice_candidate"));
        }
        if candidate == "bad" {
            return Err(TransportError::InvalidCandidate(candidate.to_string()));
        }
        state.candidates.push(candidate.to_string());
        Ok(())
    }

    async fn add_track(&self, source: Arc<dyn MediaSource>) -> Result<(), TransportError> {
        self.state.lock().unwrap().tracks.push(source.id().to_string());
        Ok(())
    }

    async fn remove_track(&self, track_id: &str) -> Result<(), TransportError> {
        self.state.lock().unwrap().tracks.retain(|t| t != track_id);
        Ok(())
    }

    async fn close(&self) {
        self.state.lock().unwrap().close_calls += 1;
    }
}

#[derive(Default)]
pub(crate) struct FakeFactory {
    connections: Mutex<Vec<(String, Arc<FakePeerConnection>)>>,
    fail: AtomicBool,
}

impl FakeFactory {
    pub(crate) fn fail_next(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    /// Latest connection created towards `remote_user_id`.
    pub(crate) fn connection(&self, remote_user_id: &str) -> Option<Arc<FakePeerConnection>> {
        self.connections
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(remote, _)| remote == remote_user_id)
            .map(|(_, pc)| Arc::clone(pc))
    }

    pub(crate) fn created(&self) -> usize {
        self.connections.lock().unwrap().len()
    }
}

impl PeerConnectionFactory for FakeFactory {
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
    > {
        if self.fail.swap(false, Ordering::SeqCst) {
            return Err(TransportError::Failed("factory".into()));
        }
        let (pc, rx) = FakePeerConnection::new(&format!("{local_user_id}->{remote_user_id}"));
        let pc = Arc::new(pc);
        self.connections
            .lock()
            .unwrap()
            .push((remote_user_id.to_string(), Arc::clone(&pc)));
        Ok((pc as Arc<dyn PeerConnection>, rx))
    }
}

// ---------------------------------------------------------------------------
// Signaling
// ---------------------------------------------------------------------------

/// Records outbound envelopes instead of sending them anywhere.
pub(crate) struct FakeSignaling {
    status: Mutex<ConnectionStatus>,
    user_id: Mutex<Option<String>>,
    sent: Mutex<Vec<Envelope>>,
}

impl FakeSignaling {
    /// Connected, with `user_id` already assigned.
    pub(crate) fn connected(user_id: &str) -> Arc<Self> {
        Arc::new(Self {
            status: Mutex::new(ConnectionStatus::Connected),
            user_id: Mutex::new(Some(user_id.to_string())),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn disconnected() -> Arc<Self> {
        Arc::new(Self {
            status: Mutex::new(ConnectionStatus::Disconnected),
            user_id: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn set_connected(&self, user_id: Option<&str>) {
        *self.status.lock().unwrap() = ConnectionStatus::Connected;
        *self.user_id.lock().unwrap() = user_id.map(str::to_string);
    }

    pub(crate) fn set_disconnected(&self) {
        *self.status.lock().unwrap() = ConnectionStatus::Disconnected;
        *self.user_id.lock().unwrap() = None;
    }

    pub(crate) fn sent(&self) -> Vec<Envelope> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn take_sent(&self) -> Vec<Envelope> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    pub(crate) fn sent_of_kind(&self, kind: &str) -> Vec<Envelope> {
        self.sent()
            .into_iter()
            .filter(|env| env.kind() == kind)
            .collect()
    }
}

#[async_trait]
impl SignalingTransport for FakeSignaling {
    async fn send(&self, envelope: Envelope) -> Result<(), SignalingError> {
        if *self.status.lock().unwrap() != ConnectionStatus::Connected {
            return Err(SignalingError::NotConnected);
        }
        if self.user_id.lock().unwrap().is_none() {
            return Err(SignalingError::NoIdentity);
        }
        self.sent.lock().unwrap().push(envelope);
        Ok(())
    }

    async fn status(&self) -> ConnectionStatus {
        *self.status.lock().unwrap()
    }

    async fn local_user_id(&self) -> Option<String> {
        self.user_id.lock().unwrap().clone()
    }
}
