//! Session manager: join, leave, mute/deafen, input mode and screen share.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::{mpsc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::VoiceError;
use crate::media::{MediaDevices, MediaGate, MediaSource, RemoteTrack};
use crate::peer::{PeerConnectionFactory, PeerNotice, PeerSession, PeerSessionParams};
use crate::protocol::{Envelope, VoiceMember};
use crate::signaling::{ConnectionStatus, SignalingEvent, SignalingTransport};
use crate::vad::ActivityDetector;

use super::roster::Roster;
use super::types::{EngineConfig, InputMode, LocalVoiceState, VoiceEvent};

/// Events beyond this many undelivered ones are dropped.
pub(super) const EVENT_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

/// Notices from tasks the manager owns (VAD, screen watcher).
#[derive(Debug)]
pub(super) enum LocalNotice {
    Talking { generation: u64, talking: bool },
    ScreenEnded { source_id: String },
}

pub(super) struct ManagerState {
    pub(super) local: LocalVoiceState,
    /// The current mute was caused by deafening.
    pub(super) muted_by_deafen: bool,
    pub(super) ptt_pressed: bool,
    pub(super) local_user_id: Option<String>,
    /// Identity the current channel's join was announced under.
    pub(super) announced_as: Option<String>,
    pub(super) connection: ConnectionStatus,
    pub(super) roster: Roster,
    pub(super) talking: BTreeSet<String>,
    pub(super) sessions: HashMap<String, Arc<PeerSession>>,
    pub(super) screen_shares: HashMap<String, RemoteTrack>,
    pub(super) media: MediaGate,
    pub(super) vad: ActivityDetector,
    /// Bumped whenever the VAD is started or stopped; stale callbacks
    /// carry an older value.
    pub(super) vad_generation: u64,
    pub(super) screen_watch: Option<CancellationToken>,
}

/// Side effects collected under the lock and performed after it is released.
#[derive(Default)]
pub(super) struct Outbox {
    pub(super) events: Vec<VoiceEvent>,
    pub(super) envelopes: Vec<Envelope>,
}

struct Receivers {
    peer_rx: mpsc::UnboundedReceiver<PeerNotice>,
    local_rx: mpsc::UnboundedReceiver<LocalNotice>,
}

pub(super) struct Inner {
    pub(super) config: EngineConfig,
    pub(super) signaling: Arc<dyn SignalingTransport>,
    pub(super) factory: Arc<dyn PeerConnectionFactory>,
    pub(super) devices: Arc<dyn MediaDevices>,
    pub(super) state: Mutex<ManagerState>,
    event_tx: mpsc::Sender<VoiceEvent>,
    pub(super) peer_tx: mpsc::UnboundedSender<PeerNotice>,
    pub(super) local_tx: mpsc::UnboundedSender<LocalNotice>,
    receivers: StdMutex<Option<Receivers>>,
    shutdown: CancellationToken,
}

// ---------------------------------------------------------------------------
// Session Manager
// ---------------------------------------------------------------------------

/// The long-lived voice engine. Construct once and share by cloning.
#[derive(Clone)]
pub struct SessionManager {
    pub(super) inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(
        config: EngineConfig,
        signaling: Arc<dyn SignalingTransport>,
        factory: Arc<dyn PeerConnectionFactory>,
        devices: Arc<dyn MediaDevices>,
    ) -> (Self, mpsc::Receiver<VoiceEvent>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let (local_tx, local_rx) = mpsc::unbounded_channel();

        let state = ManagerState {
            local: LocalVoiceState {
                input_mode: config.input_mode,
                ..Default::default()
            },
            muted_by_deafen: false,
            ptt_pressed: false,
            local_user_id: None,
            announced_as: None,
            connection: ConnectionStatus::Disconnected,
            roster: Roster::new(),
            talking: BTreeSet::new(),
            sessions: HashMap::new(),
            screen_shares: HashMap::new(),
            media: MediaGate::new(Arc::clone(&devices)),
            vad: ActivityDetector::new(config.vad),
            vad_generation: 0,
            screen_watch: None,
        };

        let mgr = Self {
            inner: Arc::new(Inner {
                config,
                signaling,
                factory,
                devices,
                state: Mutex::new(state),
                event_tx,
                peer_tx,
                local_tx,
                receivers: StdMutex::new(Some(Receivers { peer_rx, local_rx })),
                shutdown: CancellationToken::new(),
            }),
        };
        (mgr, event_rx)
    }

    /// Start the dispatcher over signaling events and internal notices.
    /// Returns `None` if it was already started.
    pub fn start(&self, mut signaling_rx: mpsc::Receiver<SignalingEvent>) -> Option<JoinHandle<()>> {
        let Receivers {
            mut peer_rx,
            mut local_rx,
        } = self
            .inner
            .receivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;

        let manager = self.clone();
        let shutdown = self.inner.shutdown.clone();
        Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    Some(event) = signaling_rx.recv() => manager.handle_signaling_event(event).await,
                    Some(notice) = peer_rx.recv() => manager.handle_peer_notice(notice).await,
                    Some(notice) = local_rx.recv() => manager.handle_local_notice(notice).await,
                }
            }
            debug!("Voice dispatcher stopped");
        }))
    }

    pub(super) async fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.inner.state.lock().await
    }

    /// Send collected envelopes and events. Call with the lock released.
    pub(super) async fn flush(&self, out: Outbox) {
        for envelope in out.envelopes {
            let kind = envelope.kind();
            if let Err(e) = self.inner.signaling.send(envelope).await {
                warn!(kind, error = %e, "Signaling send failed");
            }
        }
        for event in out.events {
            match self.inner.event_tx.try_send(event) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(event)) => {
                    warn!(event = ?event, "Event queue full; dropping event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
    }

    // -----------------------------------------------------------------------
    // Join / leave
    // -----------------------------------------------------------------------

    /// Join a voice channel, leaving the current one first.
    ///
    /// Fails only when the microphone cannot be opened; nothing is
    /// announced in that case.
    pub async fn join(&self, channel_id: &str) -> Result<(), VoiceError> {
        let mut state = self.lock().await;
        let mut out = Outbox::default();
        let before = state.local.clone();

        self.teardown(&mut state, &mut out).await;

        if let Err(e) = state.media.acquire_microphone().await {
            warn!(channel_id, error = %e, "Microphone unavailable; join aborted");
            out.events.push(VoiceEvent::DeviceFailed { error: e.clone() });
            self.finish_local(&before, &state, &mut out);
            drop(state);
            self.flush(out).await;
            return Err(VoiceError::Device(e));
        }

        state.local.joined_channel_id = Some(channel_id.to_string());
        if state.local_user_id.is_none() {
            state.local_user_id = self.inner.signaling.local_user_id().await;
        }
        out.events.push(VoiceEvent::Joined {
            channel_id: channel_id.to_string(),
        });
        info!(channel_id, "Joined voice channel");

        match state.local_user_id.clone() {
            Some(me) => self.announce_join(&mut state, &me, &mut out),
            None => debug!(channel_id, "Join announcement waits for identity"),
        }

        self.apply_input(&mut state, &mut out);
        self.finish_local(&before, &state, &mut out);
        drop(state);
        self.flush(out).await;
        Ok(())
    }

    /// Leave the current channel. Safe to call when not joined.
    pub async fn leave(&self) {
        let mut state = self.lock().await;
        let mut out = Outbox::default();
        let before = state.local.clone();

        if self.teardown(&mut state, &mut out).await {
            state.local.is_muted = false;
            state.local.is_deafened = false;
            state.muted_by_deafen = false;
        }

        self.finish_local(&before, &state, &mut out);
        drop(state);
        self.flush(out).await;
    }

    /// Leave and stop the dispatcher. The manager is inert afterwards.
    pub async fn dispose(&self) {
        self.leave().await;
        self.inner.shutdown.cancel();
        info!("Voice engine disposed");
    }

    /// Close every session and release media for the joined channel.
    /// Returns `false` when not joined.
    pub(super) async fn teardown(&self, state: &mut ManagerState, out: &mut Outbox) -> bool {
        let Some(channel_id) = state.local.joined_channel_id.take() else {
            return false;
        };

        if let Some(me) = state.announced_as.take() {
            out.envelopes.push(Envelope::LeaveVoice {
                channel_id: channel_id.clone(),
                user_id: me,
                user_name: Some(self.inner.config.display_name.clone()),
            });
        }

        self.stop_vad(state);
        if let Some(token) = state.screen_watch.take() {
            token.cancel();
        }

        let sessions: Vec<Arc<PeerSession>> = state.sessions.drain().map(|(_, s)| s).collect();
        for session in sessions {
            session.close().await;
        }
        state.media.release_all();

        state.roster.clear_channel(&channel_id);
        for user_id in std::mem::take(&mut state.talking) {
            out.events.push(VoiceEvent::TalkingChanged {
                user_id,
                talking: false,
            });
        }
        for (user_id, _) in state.screen_shares.drain() {
            out.events.push(VoiceEvent::ScreenShareEnded { user_id });
        }

        state.local.is_talking = false;
        state.local.is_screen_sharing = false;
        state.ptt_pressed = false;

        out.events.push(VoiceEvent::Left {
            channel_id: channel_id.clone(),
        });
        info!(channel_id = %channel_id, "Left voice channel");
        true
    }

    /// Announce the joined channel under `me` and list self in the roster.
    pub(super) fn announce_join(&self, state: &mut ManagerState, me: &str, out: &mut Outbox) {
        let Some(channel_id) = state.local.joined_channel_id.clone() else {
            return;
        };
        let mut member = VoiceMember::new(me, &self.inner.config.display_name, &channel_id);
        member.is_muted = state.local.is_muted;
        member.is_deafened = state.local.is_deafened;
        if state.roster.insert(member.clone()) {
            out.events.push(VoiceEvent::MemberJoined {
                channel_id: channel_id.clone(),
                member,
            });
        }
        out.envelopes.push(Envelope::JoinVoice {
            channel_id,
            user_id: me.to_string(),
            user_name: Some(self.inner.config.display_name.clone()),
        });
        state.announced_as = Some(me.to_string());
    }

    // -----------------------------------------------------------------------
    // Mute / deafen / input mode
    // -----------------------------------------------------------------------

    /// Mute or unmute the microphone. Unmuting while deafened undeafens too.
    pub async fn set_muted(&self, muted: bool) {
        let mut state = self.lock().await;
        let mut out = Outbox::default();
        let before = state.local.clone();

        if !muted && state.local.is_deafened {
            state.local.is_deafened = false;
            Self::set_output_muted(&state, false);
        }
        state.local.is_muted = muted;
        state.muted_by_deafen = false;

        self.apply_input(&mut state, &mut out);
        self.broadcast_status(&before, &mut state, &mut out);
        self.finish_local(&before, &state, &mut out);
        drop(state);
        self.flush(out).await;
    }

    /// Deafen or undeafen. Deafening mutes; undeafening unmutes only if
    /// the deafen caused the mute.
    pub async fn set_deafened(&self, deafened: bool) {
        let mut state = self.lock().await;
        if state.local.is_deafened == deafened {
            return;
        }
        let mut out = Outbox::default();
        let before = state.local.clone();

        state.local.is_deafened = deafened;
        if deafened {
            if !state.local.is_muted {
                state.local.is_muted = true;
                state.muted_by_deafen = true;
            }
        } else {
            if state.muted_by_deafen {
                state.local.is_muted = false;
            }
            state.muted_by_deafen = false;
        }
        Self::set_output_muted(&state, deafened);

        self.apply_input(&mut state, &mut out);
        self.broadcast_status(&before, &mut state, &mut out);
        self.finish_local(&before, &state, &mut out);
        drop(state);
        self.flush(out).await;
    }

    pub async fn set_input_mode(&self, mode: InputMode) {
        let mut state = self.lock().await;
        let mut out = Outbox::default();
        let before = state.local.clone();

        state.local.input_mode = mode;
        state.ptt_pressed = false;

        self.apply_input(&mut state, &mut out);
        self.finish_local(&before, &state, &mut out);
        drop(state);
        self.flush(out).await;
    }

    /// Push-to-talk key state. Ignored outside push-to-talk mode.
    pub async fn set_push_to_talk(&self, pressed: bool) {
        let mut state = self.lock().await;
        if state.local.input_mode != InputMode::PushToTalk || state.ptt_pressed == pressed {
            return;
        }
        let mut out = Outbox::default();
        let before = state.local.clone();

        state.ptt_pressed = pressed;

        self.apply_input(&mut state, &mut out);
        self.finish_local(&before, &state, &mut out);
        drop(state);
        self.flush(out).await;
    }

    fn set_output_muted(state: &ManagerState, muted: bool) {
        for session in state.sessions.values() {
            session.set_output_muted(muted);
        }
    }

    /// Reconcile microphone enablement, the VAD, and the talking flag with
    /// the current mode and mute state.
    pub(super) fn apply_input(&self, state: &mut ManagerState, out: &mut Outbox) {
        let joined = state.local.joined_channel_id.is_some();
        let open = joined && !state.local.is_muted && !state.local.is_deafened;
        let activity = state.local.input_mode == InputMode::Activity;

        let mic_live = open && (activity || state.ptt_pressed);
        state.media.set_microphone_enabled(mic_live);

        let want_vad = open && activity;
        if want_vad && !state.vad.is_running() {
            self.start_vad(state);
        } else if !want_vad {
            self.stop_vad(state);
        }

        let talking = if activity {
            want_vad && state.local.is_talking
        } else {
            mic_live
        };
        self.set_local_talking(state, talking, out);
    }

    fn start_vad(&self, state: &mut ManagerState) {
        let Some(mic) = state.media.microphone().cloned() else {
            return;
        };
        state.vad_generation += 1;
        let generation = state.vad_generation;
        let tx = self.inner.local_tx.clone();
        state.vad.start(&mic, move |talking| {
            let _ = tx.send(LocalNotice::Talking {
                generation,
                talking,
            });
        });
    }

    fn stop_vad(&self, state: &mut ManagerState) {
        if state.vad.is_running() {
            state.vad.stop();
            state.vad_generation += 1;
        }
    }

    pub(super) fn set_local_talking(&self, state: &mut ManagerState, talking: bool, out: &mut Outbox) {
        if state.local.is_talking == talking {
            return;
        }
        state.local.is_talking = talking;

        let Some(me) = state.local_user_id.clone() else {
            return;
        };
        let changed = if talking {
            state.talking.insert(me.clone())
        } else {
            state.talking.remove(&me)
        };
        if changed {
            out.events.push(VoiceEvent::TalkingChanged {
                user_id: me.clone(),
                talking,
            });
        }
        if let (Some(channel_id), Some(_)) = (&state.local.joined_channel_id, &state.announced_as) {
            out.envelopes.push(Envelope::VoiceTalking {
                channel_id: channel_id.clone(),
                user_id: me,
                talking,
            });
        }
    }

    fn broadcast_status(&self, before: &LocalVoiceState, state: &mut ManagerState, out: &mut Outbox) {
        if before.is_muted == state.local.is_muted && before.is_deafened == state.local.is_deafened {
            return;
        }
        let (Some(channel_id), Some(me)) =
            (state.local.joined_channel_id.clone(), state.announced_as.clone())
        else {
            return;
        };
        let (is_muted, is_deafened) = (state.local.is_muted, state.local.is_deafened);
        if let Some(member) = state.roster.update_status(&channel_id, &me, is_muted, is_deafened) {
            out.events.push(VoiceEvent::MemberUpdated {
                channel_id: channel_id.clone(),
                member,
            });
        }
        out.envelopes.push(Envelope::VoiceStatusUpdate {
            channel_id,
            user_id: me,
            is_muted,
            is_deafened,
        });
    }

    pub(super) fn finish_local(&self, before: &LocalVoiceState, state: &ManagerState, out: &mut Outbox) {
        if *before != state.local {
            out.events.push(VoiceEvent::LocalStateChanged(state.local.clone()));
        }
    }

    // -----------------------------------------------------------------------
    // Screen share
    // -----------------------------------------------------------------------

    /// Start or stop sharing the screen. Returns whether a share is active
    /// afterwards.
    pub async fn toggle_screen_share(&self) -> Result<bool, VoiceError> {
        let mut state = self.lock().await;
        if state.local.joined_channel_id.is_none() {
            return Err(VoiceError::NotJoined);
        }
        let mut out = Outbox::default();
        let before = state.local.clone();

        let result = if state.media.screen().is_some() {
            self.stop_screen_share(&mut state).await;
            Ok(false)
        } else {
            match state.media.acquire_screen().await {
                Ok(screen) => {
                    for session in state.sessions.values() {
                        session.attach_source(Arc::clone(&screen)).await;
                    }
                    state.local.is_screen_sharing = true;
                    state.screen_watch = Some(self.watch_screen(&screen));
                    info!(source_id = screen.id(), "Screen share started");
                    Ok(true)
                }
                Err(e) => {
                    warn!(error = %e, "Screen capture unavailable");
                    out.events.push(VoiceEvent::DeviceFailed { error: e.clone() });
                    Err(VoiceError::Device(e))
                }
            }
        };

        self.finish_local(&before, &state, &mut out);
        drop(state);
        self.flush(out).await;
        result
    }

    /// Release the screen and detach it from every session.
    pub(super) async fn stop_screen_share(&self, state: &mut ManagerState) {
        if let Some(token) = state.screen_watch.take() {
            token.cancel();
        }
        let Some(screen) = state.media.release_screen() else {
            return;
        };
        for session in state.sessions.values() {
            session.detach_source(screen.id()).await;
        }
        state.local.is_screen_sharing = false;
        info!(source_id = screen.id(), "Screen share stopped");
    }

    /// Report when the OS ends the capture on its own.
    fn watch_screen(&self, screen: &Arc<dyn MediaSource>) -> CancellationToken {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let mut ended = screen.ended();
        let source_id = screen.id().to_string();
        let tx = self.inner.local_tx.clone();

        tokio::spawn(async move {
            loop {
                if *ended.borrow_and_update() {
                    let _ = tx.send(LocalNotice::ScreenEnded { source_id });
                    return;
                }
                tokio::select! {
                    _ = cancelled.cancelled() => return,
                    changed = ended.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                }
            }
        });
        token
    }

    // -----------------------------------------------------------------------
    // Peer sessions
    // -----------------------------------------------------------------------

    /// The session for `user_id`, created if missing.
    pub(super) async fn ensure_session(
        &self,
        state: &mut ManagerState,
        user_id: &str,
    ) -> Option<Arc<PeerSession>> {
        if let Some(session) = state.sessions.get(user_id) {
            return Some(Arc::clone(session));
        }
        let channel_id = state.local.joined_channel_id.clone()?;
        let me = state.local_user_id.clone()?;

        let params = PeerSessionParams {
            local_user_id: me,
            remote_user_id: user_id.to_string(),
            channel_id,
            signaling: Arc::clone(&self.inner.signaling),
            devices: Arc::clone(&self.inner.devices),
            sources: state.media.active_sources(),
            output_muted: state.local.is_deafened,
            notices: self.inner.peer_tx.clone(),
        };
        match PeerSession::spawn(params, self.inner.factory.as_ref()).await {
            Ok(session) => {
                state.sessions.insert(user_id.to_string(), Arc::clone(&session));
                Some(session)
            }
            Err(e) => {
                warn!(remote_user_id = user_id, error = %e, "Failed to create peer session");
                None
            }
        }
    }

    /// Close and forget the session for `user_id`, clearing its talking and
    /// screen-share state.
    pub(super) async fn drop_session(&self, state: &mut ManagerState, user_id: &str, out: &mut Outbox) {
        if let Some(session) = state.sessions.remove(user_id) {
            session.close().await;
        }
        if state.talking.remove(user_id) {
            out.events.push(VoiceEvent::TalkingChanged {
                user_id: user_id.to_string(),
                talking: false,
            });
        }
        if state.screen_shares.remove(user_id).is_some() {
            out.events.push(VoiceEvent::ScreenShareEnded {
                user_id: user_id.to_string(),
            });
        }
    }

    // -----------------------------------------------------------------------
    // Projections
    // -----------------------------------------------------------------------

    pub async fn roster(&self, channel_id: &str) -> Vec<VoiceMember> {
        self.lock().await.roster.members(channel_id)
    }

    /// Users currently talking, self included.
    pub async fn talking_users(&self) -> Vec<String> {
        self.lock().await.talking.iter().cloned().collect()
    }

    pub async fn local_state(&self) -> LocalVoiceState {
        self.lock().await.local.clone()
    }

    pub async fn connection_status(&self) -> ConnectionStatus {
        self.lock().await.connection
    }

    /// Live remote screen shares, by user id.
    pub async fn screen_shares(&self) -> HashMap<String, RemoteTrack> {
        self.lock().await.screen_shares.clone()
    }

    pub async fn peer_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().await.sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn peer(&self, user_id: &str) -> Option<Arc<PeerSession>> {
        self.lock().await.sessions.get(user_id).cloned()
    }

    pub async fn local_user_id(&self) -> Option<String> {
        self.lock().await.local_user_id.clone()
    }
}
