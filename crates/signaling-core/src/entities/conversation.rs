//! 1:1 call rendezvous entity.

use crate::actors::messages::{CallNotice, CallPeer};
use crate::errors::SignalError;
use chrono::{DateTime, Utc};
use signaling_protocol::envelope::CallId;
use tracing::warn;

/// Maximum occupancy of a conversation.
pub const MAX_MEMBERS: usize = 2;

/// Rendezvous point for one call attempt between exactly two endpoints.
///
/// Created when a caller sends CALL, with the caller as its first member,
/// and destroyed when the call is refused, cancelled, or both members have
/// hung up. A conversation never outlives its last member.
#[derive(Debug)]
pub struct Conversation {
    id: CallId,
    /// Nick of the endpoint that initiated the call.
    caller: String,
    members: Vec<CallPeer>,
    created_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a conversation for a new call attempt. The caller joins
    /// immediately so the entity is never empty while registered.
    #[must_use]
    pub fn new(id: CallId, caller: CallPeer) -> Self {
        let caller_nick = caller.nick.clone();
        Self {
            id,
            caller: caller_nick,
            members: vec![caller],
            created_at: Utc::now(),
        }
    }

    /// The call id this conversation was created for.
    #[must_use]
    pub fn id(&self) -> &CallId {
        &self.id
    }

    /// Nick of the initiating endpoint.
    #[must_use]
    pub fn caller(&self) -> &str {
        &self.caller
    }

    /// When the call attempt started.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Current member count.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Whether the given endpoint is a member.
    #[must_use]
    pub fn is_member(&self, nick: &str) -> bool {
        self.members.iter().any(|m| m.nick == nick)
    }

    /// Admit the callee. Fails once two members are present.
    pub fn join(&mut self, peer: CallPeer) -> Result<(), SignalError> {
        if self.members.len() >= MAX_MEMBERS {
            return Err(SignalError::ConversationFull(self.id.clone()));
        }
        self.members.push(peer);
        Ok(())
    }

    /// Remove a member, returning true if it was present.
    pub fn remove(&mut self, nick: &str) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m.nick != nick);
        self.members.len() != before
    }

    /// Whether no members remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The member other than `nick`, if any.
    #[must_use]
    pub fn other_member(&self, nick: &str) -> Option<&CallPeer> {
        self.members.iter().find(|m| m.nick != nick)
    }

    /// Deliver a notice to the member other than `sender`. Returns true
    /// if a peer existed and its mailbox accepted the notice. A full
    /// mailbox is the recipient's local fault; the notice is dropped with
    /// a warning rather than blocking the registry.
    pub fn relay(&self, sender: &str, notice: CallNotice) -> bool {
        let Some(peer) = self.other_member(sender) else {
            return false;
        };
        let delivered = peer.notify(notice);
        if !delivered {
            warn!(
                target: "sb.registry.conversation",
                call_id = %self.id,
                recipient = %peer.nick,
                "Dropping call notice, recipient mailbox unavailable"
            );
        }
        delivered
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn peer(nick: &str) -> (CallPeer, mpsc::Receiver<CallNotice>) {
        let (tx, rx) = mpsc::channel(8);
        (CallPeer::new(nick, tx), rx)
    }

    #[test]
    fn caller_is_member_from_creation() {
        let (alice, _rx) = peer("alice");
        let convo = Conversation::new(CallId("c1".to_owned()), alice);
        assert!(convo.is_member("alice"));
        assert_eq!(convo.member_count(), 1);
        assert!(!convo.is_empty());
        assert_eq!(convo.caller(), "alice");
    }

    #[test]
    fn third_member_is_rejected() {
        let (alice, _arx) = peer("alice");
        let (bob, _brx) = peer("bob");
        let (eve, _erx) = peer("eve");

        let mut convo = Conversation::new(CallId("c1".to_owned()), alice);
        convo.join(bob).unwrap();
        let err = convo.join(eve).unwrap_err();
        assert!(matches!(err, SignalError::ConversationFull(_)));
        assert_eq!(convo.member_count(), 2);
    }

    #[test]
    fn remove_reports_membership() {
        let (alice, _arx) = peer("alice");
        let (bob, _brx) = peer("bob");

        let mut convo = Conversation::new(CallId("c1".to_owned()), alice);
        convo.join(bob).unwrap();

        assert!(convo.remove("alice"));
        assert!(!convo.remove("alice"));
        assert!(!convo.is_empty());
        assert!(convo.remove("bob"));
        assert!(convo.is_empty());
    }

    #[tokio::test]
    async fn relay_reaches_the_other_member_only() {
        let (alice, mut alice_rx) = peer("alice");
        let (bob, _bob_rx) = peer("bob");

        let mut convo = Conversation::new(CallId("c1".to_owned()), alice);
        convo.join(bob).unwrap();

        assert!(convo.relay(
            "bob",
            CallNotice::Accepted {
                from: "bob".to_owned()
            }
        ));
        let notice = alice_rx.recv().await.unwrap();
        assert!(matches!(notice, CallNotice::Accepted { from } if from == "bob"));
    }

    #[test]
    fn relay_without_a_peer_reports_failure() {
        let (alice, _rx) = peer("alice");
        let convo = Conversation::new(CallId("c1".to_owned()), alice);
        assert!(!convo.relay(
            "alice",
            CallNotice::Refused {
                from: "bob".to_owned()
            }
        ));
    }
}
