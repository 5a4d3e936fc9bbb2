//! End-to-end channel flows, including resident members and teardown.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use signaling_core::actors::messages::{ChannelNotice, ChannelPeer};
use signaling_core::actors::metrics::RegistryMetrics;
use signaling_core::actors::registry::RegistryHandle;
use signaling_core::collaborators::Directory;
use signaling_core::config::Config;
use signaling_protocol::envelope::ChannelOutbound;
use signaling_test_utils::clients::{ResidentBot, TestChannelClient};
use signaling_test_utils::fakes::FakeDirectory;

use serde_json::json;
use std::sync::Arc;

struct Harness {
    registry: RegistryHandle,
    directory: Arc<FakeDirectory>,
    directory_dyn: Arc<dyn Directory>,
}

impl Harness {
    fn new(residents: Vec<ChannelPeer>) -> Self {
        signaling_test_utils::init_tracing();
        let directory = Arc::new(FakeDirectory::new());
        Self {
            registry: RegistryHandle::spawn(&Config::default(), residents, RegistryMetrics::new()),
            directory_dyn: Arc::clone(&directory) as Arc<dyn Directory>,
            directory,
        }
    }

    fn client(&self, nick: &str) -> TestChannelClient {
        TestChannelClient::connect(nick, &self.registry, &self.directory_dyn)
    }

    async fn joined(&self, nick: &str, channel_id: &str) -> TestChannelClient {
        let mut client = self.client(nick);
        client.join(channel_id).await;
        let accepted = client.recv().await;
        assert_eq!(accepted["type"], "ACCEPTED");
        client
    }
}

#[tokio::test]
async fn join_returns_the_online_list_and_notifies_occupants() {
    let h = Harness::new(Vec::new());
    let mut alice = h.client("alice");

    alice.join("standup").await;
    let accepted = alice.recv().await;
    assert_eq!(accepted["type"], "ACCEPTED");
    assert_eq!(accepted["payload"]["online"], json!(["alice"]));

    let mut bob = h.client("bob");
    bob.join("standup").await;
    let accepted = bob.recv().await;
    assert_eq!(accepted["payload"]["online"], json!(["alice", "bob"]));

    let joined = alice.recv().await;
    assert_eq!(joined["type"], "JOINED");
    assert_eq!(joined["payload"]["who"], "bob");
}

#[tokio::test]
async fn unauthorized_member_is_refused() {
    let h = Harness::new(Vec::new());
    h.directory.deny("mallory", "standup");
    let mut mallory = h.client("mallory");

    mallory.join("standup").await;
    let reply = mallory.recv().await;
    assert_eq!(reply["type"], "REFUSED");

    let status = h.registry.get_status().await.unwrap();
    assert_eq!(status.channels, 0);
}

#[tokio::test]
async fn second_join_under_an_occupied_nick_is_refused() {
    let h = Harness::new(Vec::new());
    let mut alice = h.joined("alice", "standup").await;

    let mut impostor = h.client("alice");
    impostor.join("standup").await;
    let reply = impostor.recv().await;
    assert_eq!(reply["type"], "REFUSED");

    // The original member never hears its own nick join, stays in the
    // channel, and the channel is not torn down under it.
    alice.expect_silence().await;

    let mut bob = h.joined("bob", "standup").await;
    alice.recv().await; // JOINED bob

    alice.offer_to("bob", json!({"sdp": "v=0"})).await;
    let offer = bob.recv().await;
    assert_eq!(offer["type"], "OFFER");
    assert_eq!(offer["payload"]["fromUser"], "alice");

    let status = h.registry.get_status().await.unwrap();
    assert_eq!(status.channels, 1);
}

#[tokio::test]
async fn addressed_signals_reach_only_the_named_member() {
    let h = Harness::new(Vec::new());
    let mut alice = h.joined("alice", "standup").await;
    let mut bob = h.joined("bob", "standup").await;
    let mut carol = h.joined("carol", "standup").await;
    alice.recv().await; // JOINED bob
    alice.recv().await; // JOINED carol
    bob.recv().await; // JOINED carol

    alice.offer_to("bob", json!({"sdp": "v=0"})).await;

    let offer = bob.recv().await;
    assert_eq!(offer["type"], "OFFER");
    assert_eq!(offer["payload"]["fromUser"], "alice");
    assert_eq!(offer["payload"]["sdp"], "v=0");
    assert!(offer["payload"].get("toUser").is_none());

    carol.expect_silence().await;
}

#[tokio::test]
async fn signal_to_an_absent_member_is_dropped() {
    let h = Harness::new(Vec::new());
    let mut alice = h.joined("alice", "standup").await;

    alice.ice_to("nobody", json!({"candidate": "candidate:1"})).await;
    alice.expect_silence().await;
}

#[tokio::test]
async fn leave_notifies_the_remaining_occupants() {
    let h = Harness::new(Vec::new());
    let mut alice = h.joined("alice", "standup").await;
    let bob = h.joined("bob", "standup").await;
    alice.recv().await; // JOINED bob

    bob.leave().await;
    let left = alice.recv().await;
    assert_eq!(left["type"], "LEFT");
    assert_eq!(left["payload"]["who"], "bob");

    let status = h.registry.get_status().await.unwrap();
    assert_eq!(status.channels, 1);
}

#[tokio::test]
async fn residents_are_present_from_creation_and_outlast_everyone() {
    let bot = ResidentBot::spawn("recorder");
    let h = Harness::new(vec![bot.peer()]);

    let mut alice = h.client("alice");
    alice.join("standup").await;
    let accepted = alice.recv().await;
    assert_eq!(accepted["payload"]["online"], json!(["alice", "recorder"]));

    // The bot saw the join.
    let notices = bot.wait_for_notices(1).await;
    assert!(matches!(
        notices.first().unwrap(),
        ChannelNotice::Deliver(ChannelOutbound::Joined { who }) if who == "alice"
    ));

    // Bot-only occupancy counts as empty: the channel is destroyed and
    // the bot told to stand down.
    alice.leave().await;
    let notices = bot.wait_for_notices(3).await;
    assert!(matches!(
        notices.get(1).unwrap(),
        ChannelNotice::Deliver(ChannelOutbound::Left { who }) if who == "alice"
    ));
    assert!(matches!(
        notices.get(2).unwrap(),
        ChannelNotice::Closed { channel_id } if channel_id == "standup"
    ));

    let status = h.registry.get_status().await.unwrap();
    assert_eq!(status.channels, 0);
}

#[tokio::test]
async fn channel_is_recreated_fresh_after_teardown() {
    let bot = ResidentBot::spawn("recorder");
    let h = Harness::new(vec![bot.peer()]);

    let alice = h.joined("alice", "standup").await;
    alice.leave().await;
    bot.wait_for_notices(3).await; // JOINED, LEFT, Closed

    let mut bob = h.client("bob");
    bob.join("standup").await;
    let accepted = bob.recv().await;
    assert_eq!(accepted["payload"]["online"], json!(["bob", "recorder"]));

    let status = h.registry.get_status().await.unwrap();
    assert_eq!(status.channels, 1);
}

#[tokio::test]
async fn disconnect_behaves_like_leave() {
    let h = Harness::new(Vec::new());
    let mut alice = h.joined("alice", "standup").await;
    let bob = h.joined("bob", "standup").await;
    alice.recv().await; // JOINED bob

    bob.disconnect().await;

    let left = alice.recv().await;
    assert_eq!(left["type"], "LEFT");
    assert_eq!(left["payload"]["who"], "bob");
}

#[tokio::test]
async fn misplaced_frames_are_dropped_without_closing() {
    let h = Harness::new(Vec::new());
    let mut alice = h.client("alice");

    // Signaling before JOIN is a protocol violation.
    alice.offer_to("bob", json!({"sdp": "v=0"})).await;
    alice.send(&json!({"type": "NO_SUCH_TYPE", "payload": {}})).await;
    alice.expect_silence().await;

    // Still functional afterwards.
    alice.join("standup").await;
    let accepted = alice.recv().await;
    assert_eq!(accepted["type"], "ACCEPTED");
}
