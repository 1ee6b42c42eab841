//! Turns detector events into outbound "speaking" messages for a voice-chat session.
//!
//! `SessionRelay` is an [`EventSink`]: plug it into the detector and it queues one
//! [`RelayMessage`] per transition, addressed to every peer the roster currently enables.
//! A transport collaborator drains the queue and does the actual sending.

use std::collections::VecDeque;

use serde::Serialize;
use tracing::{error, warn};

use crate::error::Error;
use crate::events::EventSink;
use crate::roster::VoiceRoster;

/// A speaking-state change to broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayMessage<P> {
    pub speaking: bool,
    pub recipients: Vec<P>,
}

#[derive(Debug, Clone)]
pub struct SessionRelay<P: Ord + Clone> {
    roster: VoiceRoster<P>,
    outbox: VecDeque<RelayMessage<P>>,
    speaking: bool,
}

impl<P: Ord + Clone> Default for SessionRelay<P> {
    fn default() -> Self {
        Self::new(VoiceRoster::new())
    }
}

impl<P: Ord + Clone> SessionRelay<P> {
    pub fn new(roster: VoiceRoster<P>) -> Self {
        Self {
            roster,
            outbox: VecDeque::new(),
            speaking: false,
        }
    }

    pub fn roster(&self) -> &VoiceRoster<P> {
        &self.roster
    }

    pub fn roster_mut(&mut self) -> &mut VoiceRoster<P> {
        &mut self.roster
    }

    /// Whether the last relayed state was "speaking".
    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    /// Messages waiting to be sent.
    pub fn pending(&self) -> usize {
        self.outbox.len()
    }

    /// Hand every queued message to the transport, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = RelayMessage<P>> + '_ {
        self.outbox.drain(..)
    }

    fn enqueue(&mut self, speaking: bool) {
        self.speaking = speaking;

        let recipients = self.roster.recipients();
        // Nobody to talk to; the state still changes locally.
        if recipients.is_empty() {
            return;
        }
        self.outbox.push_back(RelayMessage {
            speaking,
            recipients,
        });
    }
}

impl<P: Ord + Clone> EventSink for SessionRelay<P> {
    fn on_speech_start(&mut self) {
        self.enqueue(true);
    }

    fn on_speech_stop(&mut self) {
        self.enqueue(false);
    }

    fn on_device_error(&mut self, err: &Error) -> bool {
        error!(error = %err, "microphone error");
        if self.speaking {
            self.enqueue(false);
        }
        true
    }

    fn on_device_restart(&mut self) {
        warn!("microphone restarted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay() -> SessionRelay<&'static str> {
        let mut roster = VoiceRoster::new();
        roster.on_joined("me", ["alice", "bob"]);
        SessionRelay::new(roster)
    }

    #[test]
    fn transitions_are_queued_for_enabled_peers() {
        let mut relay = relay();
        relay.on_speech_start();
        relay.roster_mut().on_peer_disconnected(&"bob");
        relay.on_speech_stop();

        let sent: Vec<_> = relay.drain().collect();
        assert_eq!(
            sent,
            vec![
                RelayMessage {
                    speaking: true,
                    recipients: vec!["alice", "bob"],
                },
                RelayMessage {
                    speaking: false,
                    recipients: vec!["alice"],
                },
            ]
        );
        assert_eq!(relay.pending(), 0);
    }

    #[test]
    fn empty_room_queues_nothing() {
        let mut relay = SessionRelay::<u32>::default();
        relay.on_speech_start();
        assert!(relay.is_speaking());
        assert_eq!(relay.pending(), 0);
    }

    #[test]
    fn device_error_while_speaking_announces_stop() {
        let mut relay = relay();
        relay.on_speech_start();
        assert!(relay.on_device_error(&Error::DeviceUnavailable("gone".into())));

        let last = relay.drain().last();
        assert_eq!(last.map(|m| m.speaking), Some(false));
        assert!(!relay.is_speaking());
    }
}
