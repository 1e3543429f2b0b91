//! Channel membership as announced by the relay.

use std::collections::{BTreeMap, HashMap};

use crate::protocol::VoiceMember;

/// Members per channel, at most one entry per `(user_id, channel_id)`.
#[derive(Debug, Default, Clone)]
pub struct Roster {
    channels: HashMap<String, BTreeMap<String, VoiceMember>>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member. Returns `false` if the pair is already present.
    pub fn insert(&mut self, member: VoiceMember) -> bool {
        let channel = self.channels.entry(member.channel_id.clone()).or_default();
        if channel.contains_key(&member.user_id) {
            return false;
        }
        channel.insert(member.user_id.clone(), member);
        true
    }

    /// Remove a member. Missing pairs are a no-op.
    pub fn remove(&mut self, channel_id: &str, user_id: &str) -> Option<VoiceMember> {
        let channel = self.channels.get_mut(channel_id)?;
        let removed = channel.remove(user_id);
        if channel.is_empty() {
            self.channels.remove(channel_id);
        }
        removed
    }

    /// Replace a channel's members with a snapshot. Later duplicates of a
    /// user id overwrite earlier ones; members are re-homed to `channel_id`.
    pub fn replace_channel(&mut self, channel_id: &str, members: Vec<VoiceMember>) {
        let entries: BTreeMap<String, VoiceMember> = members
            .into_iter()
            .map(|mut m| {
                m.channel_id = channel_id.to_string();
                (m.user_id.clone(), m)
            })
            .collect();
        if entries.is_empty() {
            self.channels.remove(channel_id);
        } else {
            self.channels.insert(channel_id.to_string(), entries);
        }
    }

    /// Apply a status update; returns the updated entry.
    pub fn update_status(
        &mut self,
        channel_id: &str,
        user_id: &str,
        is_muted: bool,
        is_deafened: bool,
    ) -> Option<VoiceMember> {
        let member = self.channels.get_mut(channel_id)?.get_mut(user_id)?;
        member.is_muted = is_muted;
        member.is_deafened = is_deafened;
        Some(member.clone())
    }

    /// Members of a channel, ordered by user id.
    pub fn members(&self, channel_id: &str) -> Vec<VoiceMember> {
        self.channels
            .get(channel_id)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, channel_id: &str, user_id: &str) -> bool {
        self.channels
            .get(channel_id)
            .is_some_and(|c| c.contains_key(user_id))
    }

    pub fn clear_channel(&mut self, channel_id: &str) {
        self.channels.remove(channel_id);
    }
}
