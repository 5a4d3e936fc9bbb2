//! Channel endpoint state machine.
//!
//! Much simpler than the call variant: `Init --JOIN--> Online`, back to
//! `Init` on LEAVE. Identity comes from the transport's authentication,
//! not from a protocol message, so the endpoint is constructed with its
//! nick already known.

use crate::actors::messages::{ChannelNotice, ChannelPeer, ChannelSignalKind};
use crate::actors::metrics::MailboxMonitor;
use crate::actors::registry::RegistryHandle;
use crate::collaborators::Directory;
use crate::endpoint::sink::{ChannelSink, SinkClosed};
use crate::errors::SignalError;

use signaling_protocol::codec;
use signaling_protocol::envelope::{
    AddressedSignal, ChannelInbound, ChannelInboundKind, ChannelOutbound,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Channel endpoint protocol state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Connected, not in a channel.
    Init,
    /// Joined a channel.
    Online,
}

impl ChannelState {
    /// State name for log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ChannelState::Init => "INIT",
            ChannelState::Online => "ONLINE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelAction {
    Join,
    Leave,
    Route,
}

/// The complete transition table; absent pairs are protocol violations.
const DISPATCH: &[(ChannelState, ChannelInboundKind, ChannelAction)] = &[
    (ChannelState::Init, ChannelInboundKind::Join, ChannelAction::Join),
    (ChannelState::Online, ChannelInboundKind::Leave, ChannelAction::Leave),
    (ChannelState::Online, ChannelInboundKind::Offer, ChannelAction::Route),
    (ChannelState::Online, ChannelInboundKind::Answer, ChannelAction::Route),
    (ChannelState::Online, ChannelInboundKind::Ice, ChannelAction::Route),
];

fn action_for(state: ChannelState, kind: ChannelInboundKind) -> Option<ChannelAction> {
    DISPATCH
        .iter()
        .find(|(s, k, _)| *s == state && *k == kind)
        .map(|(_, _, action)| *action)
}

/// One channel endpoint, owned by its connection task.
pub struct ChannelEndpoint {
    registry: RegistryHandle,
    directory: Arc<dyn Directory>,
    sink: ChannelSink,
    notice_tx: mpsc::Sender<ChannelNotice>,
    notices: Option<mpsc::Receiver<ChannelNotice>>,
    monitor: Option<Arc<MailboxMonitor>>,
    nick: String,
    state: ChannelState,
    channel_id: Option<String>,
}

impl ChannelEndpoint {
    /// Create an endpoint for an authenticated connection.
    #[must_use]
    pub fn new(
        nick: impl Into<String>,
        registry: RegistryHandle,
        directory: Arc<dyn Directory>,
        sink: ChannelSink,
        notice_buffer: usize,
    ) -> Self {
        let (notice_tx, notice_rx) = mpsc::channel(notice_buffer);
        Self {
            registry,
            directory,
            sink,
            notice_tx,
            notices: Some(notice_rx),
            monitor: None,
            nick: nick.into(),
            state: ChannelState::Init,
            channel_id: None,
        }
    }

    /// Current protocol state.
    #[must_use]
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Id of the channel currently joined.
    #[must_use]
    pub fn channel_id(&self) -> Option<&str> {
        self.channel_id.as_deref()
    }

    /// Drive the endpoint until the transport closes.
    pub async fn run(mut self, mut frames: mpsc::Receiver<String>) {
        let Some(mut notices) = self.notices.take() else {
            error!(target: "sb.endpoint.channel", "Endpoint started twice");
            return;
        };

        loop {
            tokio::select! {
                maybe_frame = frames.recv() => {
                    match maybe_frame {
                        Some(raw) => {
                            if self.handle_frame(&raw).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                maybe_notice = notices.recv() => {
                    if let Some(notice) = maybe_notice {
                        if let Some(monitor) = &self.monitor {
                            monitor.record_dequeue();
                        }
                        if self.handle_notice(notice).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        self.shutdown().await;
    }

    /// Decode and dispatch one frame from the client.
    ///
    /// # Errors
    ///
    /// Returns [`SinkClosed`] when the client connection is gone.
    pub async fn handle_frame(&mut self, raw: &str) -> Result<(), SinkClosed> {
        let message = match codec::decode_channel_inbound(raw) {
            Ok(message) => message,
            Err(err) => {
                warn!(
                    target: "sb.endpoint.channel",
                    nick = %self.nick,
                    error = %err,
                    "Dropping malformed frame"
                );
                return Ok(());
            }
        };

        let kind = message.kind();
        let Some(action) = action_for(self.state, kind) else {
            let violation = SignalError::ProtocolViolation {
                state: self.state.as_str(),
                message_type: kind.as_str(),
            };
            warn!(
                target: "sb.endpoint.channel",
                nick = %self.nick,
                error = %violation,
                "Dropping message"
            );
            return Ok(());
        };

        match (action, message) {
            (ChannelAction::Join, ChannelInbound::Join { channel_id }) => {
                self.join(channel_id).await
            }
            (ChannelAction::Leave, ChannelInbound::Leave {}) => self.leave().await,
            (ChannelAction::Route, ChannelInbound::Offer(signal)) => {
                self.route(ChannelSignalKind::Offer, signal).await
            }
            (ChannelAction::Route, ChannelInbound::Answer(signal)) => {
                self.route(ChannelSignalKind::Answer, signal).await
            }
            (ChannelAction::Route, ChannelInbound::Ice(signal)) => {
                self.route(ChannelSignalKind::Ice, signal).await
            }
            (_, message) => {
                error!(
                    target: "sb.endpoint.channel",
                    message_type = message.kind().as_str(),
                    "Dispatch table returned mismatched action"
                );
                Ok(())
            }
        }
    }

    /// Apply one notice from the registry.
    ///
    /// # Errors
    ///
    /// Returns [`SinkClosed`] when the client connection is gone.
    pub async fn handle_notice(&mut self, notice: ChannelNotice) -> Result<(), SinkClosed> {
        match notice {
            ChannelNotice::Deliver(frame) if self.state == ChannelState::Online => {
                self.sink.send(&frame).await
            }
            ChannelNotice::Closed { channel_id }
                if self.channel_id.as_deref() == Some(channel_id.as_str()) =>
            {
                debug!(
                    target: "sb.endpoint.channel",
                    nick = %self.nick,
                    channel_id = %channel_id,
                    "Channel closed"
                );
                self.channel_id = None;
                self.state = ChannelState::Init;
                Ok(())
            }
            other => {
                debug!(
                    target: "sb.endpoint.channel",
                    nick = %self.nick,
                    state = self.state.as_str(),
                    notice = ?other,
                    "Dropping notice not applicable in current state"
                );
                Ok(())
            }
        }
    }

    async fn join(&mut self, channel_id: String) -> Result<(), SinkClosed> {
        match self
            .directory
            .is_authorized_member(&self.nick, &channel_id)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                let err = SignalError::Unauthorized {
                    identity: self.nick.clone(),
                    channel_id,
                };
                warn!(
                    target: "sb.endpoint.channel",
                    error = %err,
                    "Join refused"
                );
                return self.sink.send(&ChannelOutbound::Refused {}).await;
            }
            Err(err) => {
                // Fail closed: an unreachable directory refuses the join.
                error!(
                    target: "sb.endpoint.channel",
                    nick = %self.nick,
                    channel_id = %channel_id,
                    error = %err,
                    "Authorization check failed, join refused"
                );
                return self.sink.send(&ChannelOutbound::Refused {}).await;
            }
        }

        let peer = ChannelPeer::new(self.nick.clone(), self.notice_tx.clone());
        let monitor = peer.monitor();
        match self.registry.join_channel(channel_id.clone(), peer).await {
            Ok(online) => {
                info!(
                    target: "sb.endpoint.channel",
                    nick = %self.nick,
                    channel_id = %channel_id,
                    occupants = online.len(),
                    "Joined channel"
                );
                self.monitor = Some(monitor);
                self.channel_id = Some(channel_id);
                self.state = ChannelState::Online;
                self.sink.send(&ChannelOutbound::Accepted { online }).await
            }
            Err(err @ SignalError::DuplicateIdentity(_)) => {
                warn!(
                    target: "sb.endpoint.channel",
                    nick = %self.nick,
                    channel_id = %channel_id,
                    error = %err,
                    "Join refused, identity already in channel"
                );
                self.sink.send(&ChannelOutbound::Refused {}).await
            }
            Err(err) => {
                error!(
                    target: "sb.endpoint.channel",
                    nick = %self.nick,
                    channel_id = %channel_id,
                    error = %err,
                    "Join failed"
                );
                self.sink.send(&ChannelOutbound::Refused {}).await
            }
        }
    }

    async fn leave(&mut self) -> Result<(), SinkClosed> {
        if let Some(channel_id) = self.channel_id.take() {
            if let Err(err) = self
                .registry
                .leave_channel(self.nick.clone(), channel_id)
                .await
            {
                debug!(
                    target: "sb.endpoint.channel",
                    error = %err,
                    "Could not leave channel"
                );
            }
        }
        self.state = ChannelState::Init;
        Ok(())
    }

    async fn route(
        &mut self,
        kind: ChannelSignalKind,
        signal: AddressedSignal,
    ) -> Result<(), SinkClosed> {
        let Some(channel_id) = self.channel_id.clone() else {
            return Ok(());
        };
        if let Err(err) = self
            .registry
            .channel_signal(channel_id, self.nick.clone(), kind, signal)
            .await
        {
            debug!(
                target: "sb.endpoint.channel",
                error = %err,
                "Could not route signal"
            );
        }
        Ok(())
    }

    async fn shutdown(&mut self) {
        if let Some(channel_id) = self.channel_id.take() {
            info!(
                target: "sb.endpoint.channel",
                nick = %self.nick,
                channel_id = %channel_id,
                "Endpoint disconnected"
            );
            if let Err(err) = self
                .registry
                .leave_channel(self.nick.clone(), channel_id)
                .await
            {
                debug!(
                    target: "sb.endpoint.channel",
                    error = %err,
                    "Disconnect cleanup not delivered"
                );
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::actors::metrics::RegistryMetrics;
    use crate::config::Config;
    use crate::test_fakes::FakeDirectory;

    struct Fixture {
        registry: RegistryHandle,
        directory: Arc<FakeDirectory>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                registry: RegistryHandle::spawn(
                    &Config::default(),
                    Vec::new(),
                    RegistryMetrics::new(),
                ),
                directory: Arc::new(FakeDirectory::new()),
            }
        }

        fn endpoint(&self, nick: &str) -> (ChannelEndpoint, tokio::sync::mpsc::Receiver<String>) {
            let (sink, frames_out) = ChannelSink::new(16);
            let endpoint = ChannelEndpoint::new(
                nick,
                self.registry.clone(),
                Arc::clone(&self.directory) as Arc<dyn Directory>,
                sink,
                16,
            );
            (endpoint, frames_out)
        }
    }

    #[tokio::test]
    async fn join_accepted_with_online_list() {
        let fx = Fixture::new();
        let (mut alice, mut alice_out) = fx.endpoint("alice");

        alice
            .handle_frame(r#"{"type": "JOIN", "payload": {"channelId": "standup"}}"#)
            .await
            .unwrap();

        assert_eq!(alice.state(), ChannelState::Online);
        assert_eq!(alice.channel_id(), Some("standup"));

        let raw = alice_out.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["type"], "ACCEPTED");
        assert_eq!(value["payload"]["online"], serde_json::json!(["alice"]));
    }

    #[tokio::test]
    async fn unauthorized_join_is_refused_without_state_change() {
        let fx = Fixture::new();
        fx.directory.deny("alice", "standup");
        let (mut alice, mut alice_out) = fx.endpoint("alice");

        alice
            .handle_frame(r#"{"type": "JOIN", "payload": {"channelId": "standup"}}"#)
            .await
            .unwrap();

        assert_eq!(alice.state(), ChannelState::Init);
        assert_eq!(alice.channel_id(), None);

        let raw = alice_out.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["type"], "REFUSED");
    }

    #[tokio::test]
    async fn second_join_under_the_same_nick_is_refused() {
        let fx = Fixture::new();
        let (mut alice, _alice_out) = fx.endpoint("alice");
        let (mut impostor, mut impostor_out) = fx.endpoint("alice");

        alice
            .handle_frame(r#"{"type": "JOIN", "payload": {"channelId": "standup"}}"#)
            .await
            .unwrap();
        impostor
            .handle_frame(r#"{"type": "JOIN", "payload": {"channelId": "standup"}}"#)
            .await
            .unwrap();

        assert_eq!(impostor.state(), ChannelState::Init);
        assert_eq!(impostor.channel_id(), None);
        let raw = impostor_out.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["type"], "REFUSED");

        // The original membership is untouched.
        assert_eq!(alice.state(), ChannelState::Online);
        let status = fx.registry.get_status().await.unwrap();
        assert_eq!(status.channels, 1);
    }

    #[tokio::test]
    async fn directory_failure_refuses_the_join() {
        let fx = Fixture::new();
        fx.directory.fail_lookups(true);
        let (mut alice, mut alice_out) = fx.endpoint("alice");

        alice
            .handle_frame(r#"{"type": "JOIN", "payload": {"channelId": "standup"}}"#)
            .await
            .unwrap();

        assert_eq!(alice.state(), ChannelState::Init);
        let raw = alice_out.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["type"], "REFUSED");
    }

    #[tokio::test]
    async fn leave_returns_to_init() {
        let fx = Fixture::new();
        let (mut alice, _out) = fx.endpoint("alice");

        alice
            .handle_frame(r#"{"type": "JOIN", "payload": {"channelId": "standup"}}"#)
            .await
            .unwrap();
        alice
            .handle_frame(r#"{"type": "LEAVE", "payload": {}}"#)
            .await
            .unwrap();

        assert_eq!(alice.state(), ChannelState::Init);
        assert_eq!(alice.channel_id(), None);

        let status = fx.registry.get_status().await.unwrap();
        assert_eq!(status.channels, 0);
    }

    #[tokio::test]
    async fn addressed_signal_reaches_only_the_named_member() {
        let fx = Fixture::new();
        let (mut alice, _alice_out) = fx.endpoint("alice");
        let (mut bob, mut bob_out) = fx.endpoint("bob");

        alice
            .handle_frame(r#"{"type": "JOIN", "payload": {"channelId": "standup"}}"#)
            .await
            .unwrap();
        bob.handle_frame(r#"{"type": "JOIN", "payload": {"channelId": "standup"}}"#)
            .await
            .unwrap();

        alice
            .handle_frame(
                r#"{"type": "OFFER", "payload": {"toUser": "bob", "sdp": "v=0"}}"#,
            )
            .await
            .unwrap();

        // Drive bob's mailbox by hand (no run loop in unit tests).
        let mut notices = bob.notices.take().unwrap();
        let notice = notices.recv().await.unwrap();
        bob.handle_notice(notice).await.unwrap();

        // First frame out is bob's own ACCEPTED reply.
        let _accepted = bob_out.recv().await.unwrap();
        let raw = bob_out.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["type"], "OFFER");
        assert_eq!(value["payload"]["fromUser"], "alice");
        assert_eq!(value["payload"]["sdp"], "v=0");
        assert!(value["payload"].get("toUser").is_none());
    }

    #[tokio::test]
    async fn signal_before_join_is_a_protocol_violation() {
        let fx = Fixture::new();
        let (mut alice, _out) = fx.endpoint("alice");

        alice
            .handle_frame(
                r#"{"type": "OFFER", "payload": {"toUser": "bob", "sdp": "v=0"}}"#,
            )
            .await
            .unwrap();
        assert_eq!(alice.state(), ChannelState::Init);
    }
}
