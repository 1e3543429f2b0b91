//! Hub: connected clients and voice channel membership.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use huddle_voice::protocol::{Envelope, VoiceMember};
use tokio::sync::{mpsc, RwLock};

#[derive(Default)]
struct HubState {
    clients: HashMap<String, mpsc::Sender<String>>,
    /// channel id -> members by user id.
    channels: HashMap<String, BTreeMap<String, VoiceMember>>,
    /// user id -> joined channel id.
    joined: HashMap<String, String>,
}

impl HubState {
    fn remove_member(&mut self, user_id: &str) -> Option<(String, VoiceMember)> {
        let channel_id = self.joined.remove(user_id)?;
        let members = self.channels.get_mut(&channel_id)?;
        let member = members.remove(user_id)?;
        if members.is_empty() {
            self.channels.remove(&channel_id);
        }
        Some((channel_id, member))
    }

    fn others(&self, channel_id: &str, except: &str) -> Vec<String> {
        self.channels
            .get(channel_id)
            .map(|members| {
                members
                    .keys()
                    .filter(|id| id.as_str() != except)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn left_broadcast(&self, channel_id: &str, member: &VoiceMember, out: &mut Vec<(String, Envelope)>) {
        let env = Envelope::VoicePeerLeft {
            channel_id: channel_id.to_string(),
            user_id: member.user_id.clone(),
            user_name: Some(member.display_name.clone()),
        };
        for id in self.others(channel_id, &member.user_id) {
            out.push((id, env.clone()));
        }
    }
}

/// Thread-safe client registry and channel membership.
#[derive(Clone, Default)]
pub struct Hub {
    state: Arc<RwLock<HubState>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client's outbound queue under `user_id`.
    pub async fn register(&self, user_id: &str, tx: mpsc::Sender<String>) {
        self.state
            .write()
            .await
            .clients
            .insert(user_id.to_string(), tx);
    }

    /// Forget a client, announcing its departure from any channel.
    pub async fn unregister(&self, user_id: &str) {
        let deliveries = {
            let mut state = self.state.write().await;
            state.clients.remove(user_id);
            let mut out = Vec::new();
            if let Some((channel_id, member)) = state.remove_member(user_id) {
                tracing::info!(user_id, channel_id = %channel_id, "Member dropped on disconnect");
                state.left_broadcast(&channel_id, &member, &mut out);
            }
            out
        };
        self.deliver(deliveries).await;
    }

    /// Apply one envelope sent by `user_id`.
    pub async fn dispatch(&self, user_id: &str, envelope: Envelope) {
        let deliveries = {
            let mut state = self.state.write().await;
            let mut out = Vec::new();
            match envelope {
                Envelope::JoinVoice {
                    channel_id,
                    user_name,
                    ..
                } => {
                    if let Some((old, member)) = state.remove_member(user_id) {
                        state.left_broadcast(&old, &member, &mut out);
                    }
                    let existing: Vec<VoiceMember> = state
                        .channels
                        .get(&channel_id)
                        .map(|m| m.values().cloned().collect())
                        .unwrap_or_default();
                    let name = user_name.unwrap_or_default();
                    state
                        .channels
                        .entry(channel_id.clone())
                        .or_default()
                        .insert(user_id.to_string(), VoiceMember::new(user_id, &name, &channel_id));
                    state.joined.insert(user_id.to_string(), channel_id.clone());
                    tracing::info!(user_id, channel_id = %channel_id, members = existing.len() + 1, "Member joined");

                    let joined = Envelope::VoicePeerJoined {
                        channel_id: channel_id.clone(),
                        user_id: user_id.to_string(),
                        user_name: Some(name),
                    };
                    for id in state.others(&channel_id, user_id) {
                        out.push((id, joined.clone()));
                    }
                    out.push((
                        user_id.to_string(),
                        Envelope::VoiceMembers {
                            channel_id,
                            members: existing,
                        },
                    ));
                }
                Envelope::LeaveVoice { channel_id, .. } => {
                    if state.joined.get(user_id) == Some(&channel_id) {
                        if let Some((channel_id, member)) = state.remove_member(user_id) {
                            tracing::info!(user_id, channel_id = %channel_id, "Member left");
                            state.left_broadcast(&channel_id, &member, &mut out);
                        }
                    }
                }
                mut env @ (Envelope::VoiceOffer { .. }
                | Envelope::VoiceAnswer { .. }
                | Envelope::IceCandidate { .. }) => {
                    env.set_from_user_id(user_id);
                    if let Some(target) = env.target_user_id().map(str::to_string) {
                        if state.clients.contains_key(&target) {
                            out.push((target, env));
                        } else {
                            tracing::debug!(user_id, target_user_id = %target, "Peer-directed envelope for unknown client dropped");
                        }
                    }
                }
                Envelope::VoiceTalking {
                    channel_id,
                    talking,
                    ..
                } => {
                    if state.joined.get(user_id) == Some(&channel_id) {
                        let env = Envelope::VoiceTalking {
                            channel_id: channel_id.clone(),
                            user_id: user_id.to_string(),
                            talking,
                        };
                        for id in state.others(&channel_id, user_id) {
                            out.push((id, env.clone()));
                        }
                    }
                }
                Envelope::VoiceStatusUpdate {
                    channel_id,
                    is_muted,
                    is_deafened,
                    ..
                } => {
                    if state.joined.get(user_id) == Some(&channel_id) {
                        if let Some(member) = state
                            .channels
                            .get_mut(&channel_id)
                            .and_then(|m| m.get_mut(user_id))
                        {
                            member.is_muted = is_muted;
                            member.is_deafened = is_deafened;
                        }
                        let env = Envelope::VoiceStatusUpdate {
                            channel_id: channel_id.clone(),
                            user_id: user_id.to_string(),
                            is_muted,
                            is_deafened,
                        };
                        for id in state.others(&channel_id, user_id) {
                            out.push((id, env.clone()));
                        }
                    }
                }
                other => {
                    tracing::debug!(user_id, kind = other.kind(), "Relay-only envelope from client ignored");
                }
            }
            out
        };
        self.deliver(deliveries).await;
    }

    /// Members of a channel, sorted by user id.
    pub async fn members(&self, channel_id: &str) -> Vec<VoiceMember> {
        self.state
            .read()
            .await
            .channels
            .get(channel_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of connected clients.
    pub async fn count(&self) -> usize {
        self.state.read().await.clients.len()
    }

    async fn deliver(&self, deliveries: Vec<(String, Envelope)>) {
        if deliveries.is_empty() {
            return;
        }
        let targets: Vec<(mpsc::Sender<String>, Envelope)> = {
            let state = self.state.read().await;
            deliveries
                .into_iter()
                .filter_map(|(id, env)| state.clients.get(&id).cloned().map(|tx| (tx, env)))
                .collect()
        };
        for (tx, env) in targets {
            match serde_json::to_string(&env) {
                Ok(json) => {
                    if tx.send(json).await.is_err() {
                        tracing::debug!(kind = env.kind(), "Client channel closed");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Failed to encode envelope"),
            }
        }
    }
}
