//! Per-peer voice send table for a voice-chat session.
//!
//! The table is the local bookkeeping half of a session manager: who is in the room and
//! whether our voice should be sent to them. Joining, leaving, and transport belong to the
//! networking layer, which reports membership changes through the `on_*` methods.

use std::collections::BTreeMap;

use serde::Serialize;

/// Whether voice is sent to a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SendPolicy {
    Enabled,
    Disabled,
}

/// Voice send table keyed by peer id.
///
/// Peers are kept ordered so recipient lists are deterministic.
#[derive(Debug, Clone)]
pub struct VoiceRoster<P: Ord + Clone> {
    local: Option<P>,
    peers: BTreeMap<P, SendPolicy>,
}

impl<P: Ord + Clone> Default for VoiceRoster<P> {
    fn default() -> Self {
        Self {
            local: None,
            peers: BTreeMap::new(),
        }
    }
}

impl<P: Ord + Clone> VoiceRoster<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the table after joining a room.
    ///
    /// The local peer is listed but disabled (we never send to ourselves); everyone already in
    /// the room is enabled.
    pub fn on_joined(&mut self, local: P, others: impl IntoIterator<Item = P>) {
        self.peers.clear();
        self.peers.insert(local.clone(), SendPolicy::Disabled);
        for peer in others {
            self.peers.entry(peer).or_insert(SendPolicy::Enabled);
        }
        self.local = Some(local);
    }

    /// A peer joined after us. Existing entries keep their policy.
    pub fn on_peer_connected(&mut self, peer: P) {
        self.peers.entry(peer).or_insert(SendPolicy::Enabled);
    }

    pub fn on_peer_disconnected(&mut self, peer: &P) {
        self.peers.remove(peer);
    }

    /// Forget everyone (e.g. after leaving the room).
    pub fn clear(&mut self) {
        self.peers.clear();
        self.local = None;
    }

    pub fn local(&self) -> Option<&P> {
        self.local.as_ref()
    }

    pub fn policy(&self, peer: &P) -> Option<SendPolicy> {
        self.peers.get(peer).copied()
    }

    /// Change a known peer's policy. Returns `false` for peers not in the table.
    pub fn set_policy(&mut self, peer: &P, policy: SendPolicy) -> bool {
        match self.peers.get_mut(peer) {
            Some(slot) => {
                *slot = policy;
                true
            }
            None => false,
        }
    }

    /// Peers that should receive our voice, in id order.
    pub fn recipients(&self) -> Vec<P> {
        self.peers
            .iter()
            .filter(|(_, policy)| **policy == SendPolicy::Enabled)
            .map(|(peer, _)| peer.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_disables_self_and_enables_others() {
        let mut roster = VoiceRoster::new();
        roster.on_joined("me", ["bob", "alice"]);

        assert_eq!(roster.policy(&"me"), Some(SendPolicy::Disabled));
        assert_eq!(roster.policy(&"bob"), Some(SendPolicy::Enabled));
        assert_eq!(roster.recipients(), vec!["alice", "bob"]);
        assert_eq!(roster.local(), Some(&"me"));
    }

    #[test]
    fn rejoining_resets_the_table() {
        let mut roster = VoiceRoster::new();
        roster.on_joined(1, [2, 3]);
        roster.on_joined(1, [4]);

        assert_eq!(roster.len(), 2);
        assert_eq!(roster.policy(&2), None);
    }

    #[test]
    fn late_joiners_are_enabled_but_existing_policy_is_kept() {
        let mut roster = VoiceRoster::new();
        roster.on_joined(1, [2]);
        assert!(roster.set_policy(&2, SendPolicy::Disabled));

        roster.on_peer_connected(2);
        roster.on_peer_connected(3);

        assert_eq!(roster.policy(&2), Some(SendPolicy::Disabled));
        assert_eq!(roster.recipients(), vec![3]);
    }

    #[test]
    fn departures_are_removed() {
        let mut roster = VoiceRoster::new();
        roster.on_joined(1, [2, 3]);
        roster.on_peer_disconnected(&2);
        roster.on_peer_disconnected(&9);

        assert_eq!(roster.recipients(), vec![3]);
        assert!(!roster.set_policy(&2, SendPolicy::Enabled));
    }

    #[test]
    fn clear_forgets_local_peer() {
        let mut roster = VoiceRoster::new();
        roster.on_joined(1, [2]);
        roster.clear();
        assert!(roster.is_empty());
        assert_eq!(roster.local(), None);
    }
}
