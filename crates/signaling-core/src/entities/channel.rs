//! N-party channel entity.

use crate::actors::messages::{ChannelNotice, ChannelPeer, ChannelSignalKind};
use crate::errors::SignalError;
use signaling_protocol::envelope::{AddressedSignal, ChannelOutbound};
use std::collections::HashMap;
use tracing::{error, warn};

/// A named room joined by any number of endpoints.
///
/// Every channel is seeded at creation with the resident members
/// configured on the registry. Residents never leave on their own, so a
/// channel counts as empty when only residents remain; at that point it is
/// destroyed and the residents are told to stand down.
#[derive(Debug)]
pub struct Channel {
    id: String,
    /// Nicks seeded at creation. Always a subset of `participants`.
    resident_nicks: Vec<String>,
    participants: HashMap<String, ChannelPeer>,
}

impl Channel {
    /// Create a channel seeded with the given resident members.
    #[must_use]
    pub fn new(id: impl Into<String>, residents: Vec<ChannelPeer>) -> Self {
        let resident_nicks = residents.iter().map(|p| p.nick.clone()).collect();
        let participants = residents.into_iter().map(|p| (p.nick.clone(), p)).collect();
        Self {
            id: id.into(),
            resident_nicks,
            participants,
        }
    }

    /// The channel id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current occupant count, residents included.
    #[must_use]
    pub fn occupant_count(&self) -> usize {
        self.participants.len()
    }

    /// Whether the given endpoint is currently in the channel.
    #[must_use]
    pub fn contains(&self, nick: &str) -> bool {
        self.participants.contains_key(nick)
    }

    /// Whether only residents remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.len() == self.resident_nicks.len()
    }

    /// Nicks of everyone currently in the channel, sorted for
    /// deterministic output.
    #[must_use]
    pub fn online(&self) -> Vec<String> {
        let mut nicks: Vec<String> = self.participants.keys().cloned().collect();
        nicks.sort();
        nicks
    }

    /// Admit an endpoint: existing occupants learn of the join first, then
    /// the newcomer is inserted. Returns the online list including the
    /// newcomer, which the caller reports back as ACCEPTED.
    ///
    /// A nick already in the channel (a second connection under the same
    /// identity, or a resident's nick) is rejected; the occupant set keeps
    /// exactly one entry per identity.
    pub fn admit(&mut self, peer: ChannelPeer) -> Result<Vec<String>, SignalError> {
        if self.participants.contains_key(&peer.nick) {
            return Err(SignalError::DuplicateIdentity(peer.nick.clone()));
        }
        self.broadcast(ChannelNotice::Deliver(ChannelOutbound::Joined {
            who: peer.nick.clone(),
        }));
        self.participants.insert(peer.nick.clone(), peer);
        Ok(self.online())
    }

    /// Remove an endpoint, telling the remaining occupants. Returns false
    /// if the endpoint was not in the channel.
    pub fn remove(&mut self, nick: &str) -> bool {
        if self.participants.remove(nick).is_none() {
            return false;
        }
        self.broadcast(ChannelNotice::Deliver(ChannelOutbound::Left {
            who: nick.to_owned(),
        }));
        true
    }

    /// Deliver an addressed signal to the single named recipient. The
    /// `toUser` marker is stripped and `fromUser` stamped with the sender
    /// identity before delivery. Returns true on delivery; an absent
    /// recipient or full mailbox drops the signal.
    pub fn route(&self, sender: &str, kind: ChannelSignalKind, signal: AddressedSignal) -> bool {
        let recipient = signal.to_user.clone();
        let Some(peer) = self.participants.get(&recipient) else {
            error!(
                target: "sb.registry.channel",
                channel_id = %self.id,
                sender = %sender,
                recipient = %recipient,
                message_type = kind.as_str(),
                "Dropping signal for recipient not in channel"
            );
            return false;
        };

        let delivered = signal.deliver_from(sender);
        let outbound = match kind {
            ChannelSignalKind::Offer => ChannelOutbound::Offer(delivered),
            ChannelSignalKind::Answer => ChannelOutbound::Answer(delivered),
            ChannelSignalKind::Ice => ChannelOutbound::Ice(delivered),
        };
        let queued = peer.notify(ChannelNotice::Deliver(outbound));
        if !queued {
            warn!(
                target: "sb.registry.channel",
                channel_id = %self.id,
                recipient = %recipient,
                "Dropping signal, recipient mailbox unavailable"
            );
        }
        queued
    }

    /// Tell the resident members the channel is going away. Called by the
    /// registry just before dropping the entity.
    pub fn close(&self) {
        for nick in &self.resident_nicks {
            if let Some(peer) = self.participants.get(nick) {
                if !peer.notify(ChannelNotice::Closed {
                    channel_id: self.id.clone(),
                }) {
                    warn!(
                        target: "sb.registry.channel",
                        channel_id = %self.id,
                        resident = %nick,
                        "Resident missed channel teardown notice"
                    );
                }
            }
        }
    }

    fn broadcast(&self, notice: ChannelNotice) {
        for peer in self.participants.values() {
            if !peer.notify(notice.clone()) {
                warn!(
                    target: "sb.registry.channel",
                    channel_id = %self.id,
                    recipient = %peer.nick,
                    "Dropping channel notice, recipient mailbox unavailable"
                );
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::{Map, Value};
    use tokio::sync::mpsc;

    fn peer(nick: &str) -> (ChannelPeer, mpsc::Receiver<ChannelNotice>) {
        let (tx, rx) = mpsc::channel(8);
        (ChannelPeer::new(nick, tx), rx)
    }

    fn addressed(to: &str) -> AddressedSignal {
        let mut body = Map::new();
        body.insert("sdp".to_owned(), Value::String("v=0".to_owned()));
        AddressedSignal {
            to_user: to.to_owned(),
            body,
        }
    }

    #[test]
    fn seeded_channel_is_empty_until_someone_joins() {
        let (bot, _rx) = peer("recorder");
        let channel = Channel::new("standup", vec![bot]);

        assert!(channel.is_empty());
        assert!(channel.contains("recorder"));
        assert_eq!(channel.online(), vec!["recorder"]);
    }

    #[tokio::test]
    async fn admit_tells_existing_occupants_first() {
        let (bot, mut bot_rx) = peer("recorder");
        let (alice, _alice_rx) = peer("alice");

        let mut channel = Channel::new("standup", vec![bot]);
        let online = channel.admit(alice).unwrap();

        assert_eq!(online, vec!["alice", "recorder"]);
        assert!(!channel.is_empty());

        let notice = bot_rx.recv().await.unwrap();
        assert!(matches!(
            notice,
            ChannelNotice::Deliver(ChannelOutbound::Joined { who }) if who == "alice"
        ));
    }

    #[tokio::test]
    async fn admit_rejects_a_nick_already_in_the_channel() {
        let (bot, mut bot_rx) = peer("recorder");
        let (alice, mut alice_rx) = peer("alice");
        let (second_alice, _second_rx) = peer("alice");

        let mut channel = Channel::new("standup", vec![bot]);
        channel.admit(alice).unwrap();
        bot_rx.recv().await.unwrap();

        let err = channel.admit(second_alice).unwrap_err();
        assert!(matches!(err, SignalError::DuplicateIdentity(nick) if nick == "alice"));

        // The first endpoint is untouched: still a member, no spurious
        // JOINED for its own nick, and signals still reach it.
        assert!(channel.contains("alice"));
        assert!(alice_rx.try_recv().is_err());
        assert!(bot_rx.try_recv().is_err());
        assert!(channel.route("recorder", ChannelSignalKind::Offer, addressed("alice")));
        assert!(alice_rx.recv().await.is_some());

        // A resident nick is a duplicate too.
        let (impostor_bot, _rx) = peer("recorder");
        assert!(channel.admit(impostor_bot).is_err());
    }

    #[tokio::test]
    async fn remove_notifies_the_remaining_occupants() {
        let (bot, mut bot_rx) = peer("recorder");
        let (alice, mut alice_rx) = peer("alice");
        let (carol, _carol_rx) = peer("carol");

        let mut channel = Channel::new("standup", vec![bot]);
        channel.admit(alice).unwrap();
        channel.admit(carol).unwrap();
        // Drain the join notices.
        bot_rx.recv().await.unwrap();
        bot_rx.recv().await.unwrap();
        alice_rx.recv().await.unwrap();

        assert!(channel.remove("carol"));
        assert!(!channel.remove("carol"));

        let notice = alice_rx.recv().await.unwrap();
        assert!(matches!(
            notice,
            ChannelNotice::Deliver(ChannelOutbound::Left { who }) if who == "carol"
        ));
    }

    #[tokio::test]
    async fn route_stamps_sender_and_reaches_only_the_recipient() {
        let (bot, mut bot_rx) = peer("recorder");
        let (alice, mut alice_rx) = peer("alice");
        let (carol, mut carol_rx) = peer("carol");

        let mut channel = Channel::new("standup", vec![bot]);
        channel.admit(alice).unwrap();
        channel.admit(carol).unwrap();
        bot_rx.recv().await.unwrap();
        bot_rx.recv().await.unwrap();
        alice_rx.recv().await.unwrap();

        assert!(channel.route("alice", ChannelSignalKind::Offer, addressed("carol")));

        let notice = carol_rx.recv().await.unwrap();
        match notice {
            ChannelNotice::Deliver(ChannelOutbound::Offer(delivered)) => {
                assert_eq!(delivered.from_user, "alice");
                assert_eq!(delivered.body.get("sdp").unwrap(), "v=0");
            }
            other => panic!("unexpected notice: {other:?}"),
        }
        assert!(alice_rx.try_recv().is_err());
        assert!(bot_rx.try_recv().is_err());
    }

    #[test]
    fn route_to_absent_recipient_is_dropped() {
        let (bot, _rx) = peer("recorder");
        let channel = Channel::new("standup", vec![bot]);

        assert!(!channel.route("alice", ChannelSignalKind::Ice, addressed("nobody")));
    }

    #[tokio::test]
    async fn close_notifies_residents() {
        let (bot, mut bot_rx) = peer("recorder");
        let channel = Channel::new("standup", vec![bot]);

        channel.close();
        let notice = bot_rx.recv().await.unwrap();
        assert!(matches!(
            notice,
            ChannelNotice::Closed { channel_id } if channel_id == "standup"
        ));
    }
}
