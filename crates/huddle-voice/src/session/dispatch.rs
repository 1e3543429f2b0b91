//! Inbound signaling and notice dispatch.

use tracing::{debug, info, warn};

use crate::peer::{PeerInput, PeerNotice};
use crate::protocol::{Envelope, VoiceMember};
use crate::signaling::{ConnectionStatus, SignalingEvent};

use super::manager::{LocalNotice, ManagerState, Outbox, SessionManager};
use super::types::{InputMode, VoiceEvent};

impl SessionManager {
    /// Apply one event from the signaling channel.
    pub async fn handle_signaling_event(&self, event: SignalingEvent) {
        match event {
            SignalingEvent::Status(status) => self.on_status(status).await,
            SignalingEvent::Identity(user_id) => self.on_identity(user_id).await,
            SignalingEvent::Envelope(envelope) => self.on_envelope(envelope).await,
        }
    }

    async fn on_status(&self, status: ConnectionStatus) {
        let mut state = self.lock().await;
        if state.connection == status {
            return;
        }
        state.connection = status;
        if status == ConnectionStatus::Disconnected {
            // Peer media keeps flowing; only signaling is gone.
            state.local_user_id = None;
            info!(peers = state.sessions.len(), "Signaling lost; peer sessions kept");
        }
        drop(state);
        self.flush(Outbox {
            events: vec![VoiceEvent::ConnectionChanged(status)],
            envelopes: Vec::new(),
        })
        .await;
    }

    /// A (possibly new) identity for this connection. Re-announces the
    /// joined channel; sessions made under an older identity are dropped.
    async fn on_identity(&self, user_id: String) {
        let mut state = self.lock().await;
        let mut out = Outbox::default();
        state.local_user_id = Some(user_id.clone());
        out.events.push(VoiceEvent::IdentityAssigned {
            user_id: user_id.clone(),
        });

        if let Some(channel_id) = state.local.joined_channel_id.clone() {
            if let Some(old) = state.announced_as.take() {
                if old != user_id {
                    info!(old = %old, new = %user_id, "Identity changed; rebuilding peer sessions");
                    let peers: Vec<String> = state.sessions.keys().cloned().collect();
                    for peer in peers {
                        self.drop_session(&mut state, &peer, &mut out).await;
                    }
                    if let Some(me) = state.talking.take(&old) {
                        out.events.push(VoiceEvent::TalkingChanged {
                            user_id: me,
                            talking: false,
                        });
                    }
                    if state.roster.remove(&channel_id, &old).is_some() {
                        out.events.push(VoiceEvent::MemberLeft {
                            channel_id: channel_id.clone(),
                            user_id: old,
                        });
                    }
                }
            }
            self.announce_join(&mut state, &user_id, &mut out);
            if state.local.is_talking {
                state.talking.insert(user_id.clone());
            }
        }

        drop(state);
        self.flush(out).await;
    }

    async fn on_envelope(&self, envelope: Envelope) {
        let mut state = self.lock().await;
        let (Some(me), Some(channel_id)) = (
            state.local_user_id.clone(),
            state.local.joined_channel_id.clone(),
        ) else {
            debug!(kind = envelope.kind(), "Envelope outside a joined channel; discarded");
            return;
        };
        if envelope.channel_id() != Some(channel_id.as_str()) {
            debug!(kind = envelope.kind(), "Envelope for another channel; discarded");
            return;
        }
        if let Some(target) = envelope.target_user_id() {
            if target != me {
                debug!(kind = envelope.kind(), target_user_id = target, "Misdirected envelope; discarded");
                return;
            }
        }

        let mut out = Outbox::default();
        match envelope {
            Envelope::Identity { .. } => {}
            Envelope::JoinVoice {
                user_id, user_name, ..
            }
            | Envelope::VoicePeerJoined {
                user_id, user_name, ..
            } => {
                if user_id != me {
                    let member =
                        VoiceMember::new(&user_id, user_name.as_deref().unwrap_or(""), &channel_id);
                    self.member_joined(&mut state, member, &mut out).await;
                }
            }
            Envelope::LeaveVoice { user_id, .. } | Envelope::VoicePeerLeft { user_id, .. } => {
                if user_id != me {
                    self.member_left(&mut state, &channel_id, &user_id, &mut out).await;
                }
            }
            Envelope::VoiceMembers { members, .. } => {
                self.roster_snapshot(&mut state, &channel_id, &me, members, &mut out)
                    .await;
            }
            Envelope::VoiceOffer {
                from_user_id, sdp, ..
            } => {
                if from_user_id == me {
                    return;
                }
                if !state.roster.contains(&channel_id, &from_user_id) {
                    let member = VoiceMember::new(&from_user_id, "", &channel_id);
                    state.roster.insert(member.clone());
                    out.events.push(VoiceEvent::MemberJoined {
                        channel_id: channel_id.clone(),
                        member,
                    });
                }
                if let Some(session) = self.ensure_session(&mut state, &from_user_id).await {
                    session.deliver(PeerInput::Offer(sdp));
                }
            }
            Envelope::VoiceAnswer {
                from_user_id, sdp, ..
            } => match state.sessions.get(&from_user_id) {
                Some(session) => session.deliver(PeerInput::Answer(sdp)),
                None => debug!(from_user_id = %from_user_id, "Answer from unknown peer; discarded"),
            },
            Envelope::IceCandidate {
                from_user_id,
                candidate,
                ..
            } => match state.sessions.get(&from_user_id) {
                Some(session) => session.deliver(PeerInput::Candidate(candidate)),
                None => debug!(from_user_id = %from_user_id, "Candidate from unknown peer; discarded"),
            },
            Envelope::VoiceTalking {
                user_id, talking, ..
            } => {
                if user_id != me {
                    let changed = if talking {
                        state.talking.insert(user_id.clone())
                    } else {
                        state.talking.remove(&user_id)
                    };
                    if changed {
                        out.events.push(VoiceEvent::TalkingChanged { user_id, talking });
                    }
                }
            }
            Envelope::VoiceStatusUpdate {
                user_id,
                is_muted,
                is_deafened,
                ..
            } => {
                if user_id != me {
                    if let Some(member) =
                        state
                            .roster
                            .update_status(&channel_id, &user_id, is_muted, is_deafened)
                    {
                        out.events.push(VoiceEvent::MemberUpdated {
                            channel_id: channel_id.clone(),
                            member,
                        });
                    }
                }
            }
        }

        drop(state);
        self.flush(out).await;
    }

    async fn member_joined(&self, state: &mut ManagerState, member: VoiceMember, out: &mut Outbox) {
        let user_id = member.user_id.clone();
        if !state.roster.insert(member.clone()) {
            if state.sessions.contains_key(&user_id) {
                debug!(user_id = %user_id, "Duplicate join announcement ignored");
            } else {
                info!(user_id = %user_id, "Reconnecting to known member");
                self.ensure_session(state, &user_id).await;
            }
            return;
        }
        info!(user_id = %user_id, channel_id = %member.channel_id, "Member joined voice");
        out.events.push(VoiceEvent::MemberJoined {
            channel_id: member.channel_id.clone(),
            member,
        });
        self.ensure_session(state, &user_id).await;
    }

    async fn member_left(
        &self,
        state: &mut ManagerState,
        channel_id: &str,
        user_id: &str,
        out: &mut Outbox,
    ) {
        let removed = state.roster.remove(channel_id, user_id).is_some();
        self.drop_session(state, user_id, out).await;
        if removed {
            info!(user_id, channel_id, "Member left voice");
            out.events.push(VoiceEvent::MemberLeft {
                channel_id: channel_id.to_string(),
                user_id: user_id.to_string(),
            });
        }
    }

    /// Replace the channel roster with a relay snapshot and reconcile
    /// sessions against it.
    async fn roster_snapshot(
        &self,
        state: &mut ManagerState,
        channel_id: &str,
        me: &str,
        members: Vec<VoiceMember>,
        out: &mut Outbox,
    ) {
        let mut members: Vec<VoiceMember> =
            members.into_iter().filter(|m| m.user_id != me).collect();
        let remote_ids: Vec<String> = members.iter().map(|m| m.user_id.clone()).collect();

        let mut own = VoiceMember::new(me, &self.inner.config.display_name, channel_id);
        own.is_muted = state.local.is_muted;
        own.is_deafened = state.local.is_deafened;
        members.push(own);

        state.roster.replace_channel(channel_id, members);
        debug!(channel_id, remote = remote_ids.len(), "Roster snapshot applied");
        out.events.push(VoiceEvent::RosterReplaced {
            channel_id: channel_id.to_string(),
            members: state.roster.members(channel_id),
        });

        let stale: Vec<String> = state
            .sessions
            .keys()
            .filter(|id| !remote_ids.contains(*id))
            .cloned()
            .collect();
        for user_id in stale {
            self.drop_session(state, &user_id, out).await;
        }
        for user_id in &remote_ids {
            self.ensure_session(state, user_id).await;
        }
    }

    // -----------------------------------------------------------------------
    // Notices
    // -----------------------------------------------------------------------

    pub(super) async fn handle_peer_notice(&self, notice: PeerNotice) {
        let mut state = self.lock().await;
        let mut out = Outbox::default();
        match notice {
            PeerNotice::ScreenShareStarted { user_id, track } => {
                if state.sessions.contains_key(&user_id) {
                    state.screen_shares.insert(user_id.clone(), track.clone());
                    out.events.push(VoiceEvent::ScreenShareStarted { user_id, track });
                }
            }
            PeerNotice::ScreenShareEnded { user_id, track_id } => {
                let current = state.screen_shares.get(&user_id).map(|t| t.id == track_id);
                if current == Some(true) {
                    state.screen_shares.remove(&user_id);
                    out.events.push(VoiceEvent::ScreenShareEnded { user_id });
                }
            }
            PeerNotice::Failed { user_id } => {
                if state.sessions.contains_key(&user_id) {
                    warn!(user_id = %user_id, "Dropping failed peer session");
                    self.drop_session(&mut state, &user_id, &mut out).await;
                    out.events.push(VoiceEvent::PeerFailed { user_id });
                }
            }
        }
        drop(state);
        self.flush(out).await;
    }

    pub(super) async fn handle_local_notice(&self, notice: LocalNotice) {
        let mut state = self.lock().await;
        let mut out = Outbox::default();
        let before = state.local.clone();
        match notice {
            LocalNotice::Talking {
                generation,
                talking,
            } => {
                let current = generation == state.vad_generation
                    && state.vad.is_running()
                    && state.local.input_mode == InputMode::Activity;
                if !current {
                    debug!(generation, "Stale VAD callback ignored");
                    return;
                }
                self.set_local_talking(&mut state, talking, &mut out);
            }
            LocalNotice::ScreenEnded { source_id } => {
                let active = state.media.screen().is_some_and(|s| s.id() == source_id);
                if active {
                    info!(source_id = %source_id, "Screen capture ended by the system");
                    self.stop_screen_share(&mut state).await;
                }
            }
        }
        self.finish_local(&before, &state, &mut out);
        drop(state);
        self.flush(out).await;
    }
}
