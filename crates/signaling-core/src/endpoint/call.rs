//! Call endpoint state machine.
//!
//! Protocol states:
//!
//! ```text
//! Init --LOGIN--> LoggedIn --CALL/ACCEPT--> Rendezvous/Signalling
//!                    ^                            |
//!                    +----REFUSE/CANCEL/HANGUP----+
//! ```
//!
//! Which messages are legal in which state is data, not control flow: the
//! `DISPATCH` table maps `(state, message kind)` to an action, and any pair
//! with no row is logged and dropped without touching the connection.

use crate::actors::messages::{CallNotice, CallPeer};
use crate::actors::metrics::MailboxMonitor;
use crate::actors::registry::RegistryHandle;
use crate::collaborators::{Directory, PushGateway, PushToken};
use crate::endpoint::sink::{CallSink, SinkClosed};
use crate::errors::SignalError;

use signaling_protocol::codec;
use signaling_protocol::envelope::{CallId, CallInbound, CallInboundKind, CallOutbound, IncomingCall};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Call endpoint protocol state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Connected, not yet logged in.
    Init,
    /// Registered in the online directory, no call in progress.
    LoggedIn,
    /// Outgoing call placed, waiting for the callee's answer.
    Rendezvous,
    /// In an established call, relaying session descriptions.
    Signalling,
}

impl CallState {
    /// State name for log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            CallState::Init => "INIT",
            CallState::LoggedIn => "LOGGED_IN",
            CallState::Rendezvous => "RENDEZVOUS",
            CallState::Signalling => "SIGNALLING",
        }
    }
}

/// What the connection task should do with the transport after a frame.
///
/// Most frames leave the connection open; a rejected login is the one
/// case where the endpoint asks the transport to close the stream, since
/// the client can never make progress on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Keep reading frames.
    Continue,
    /// The connection was rejected; the transport should close it.
    Close,
}

/// Action to run for an accepted `(state, kind)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallAction {
    Login,
    StartCall,
    Accept,
    Refuse,
    Cancel,
    Hangup,
    Relay,
}

/// The complete transition table. A `(state, kind)` pair absent from this
/// table is a protocol violation.
const DISPATCH: &[(CallState, CallInboundKind, CallAction)] = &[
    (CallState::Init, CallInboundKind::Login, CallAction::Login),
    (CallState::LoggedIn, CallInboundKind::Call, CallAction::StartCall),
    (CallState::LoggedIn, CallInboundKind::Accept, CallAction::Accept),
    (CallState::Rendezvous, CallInboundKind::Accept, CallAction::Accept),
    (CallState::LoggedIn, CallInboundKind::Refuse, CallAction::Refuse),
    (CallState::Rendezvous, CallInboundKind::Refuse, CallAction::Refuse),
    (CallState::Rendezvous, CallInboundKind::Cancel, CallAction::Cancel),
    (CallState::LoggedIn, CallInboundKind::Hangup, CallAction::Hangup),
    (CallState::Signalling, CallInboundKind::Hangup, CallAction::Hangup),
    (CallState::Signalling, CallInboundKind::Offer, CallAction::Relay),
    (CallState::Signalling, CallInboundKind::Answer, CallAction::Relay),
    (CallState::Signalling, CallInboundKind::Ice, CallAction::Relay),
];

fn action_for(state: CallState, kind: CallInboundKind) -> Option<CallAction> {
    DISPATCH
        .iter()
        .find(|(s, k, _)| *s == state && *k == kind)
        .map(|(_, _, action)| *action)
}

/// One call endpoint, owned by its connection task.
pub struct CallEndpoint {
    registry: RegistryHandle,
    directory: Arc<dyn Directory>,
    push: Arc<dyn PushGateway>,
    sink: CallSink,
    notice_tx: mpsc::Sender<CallNotice>,
    notices: Option<mpsc::Receiver<CallNotice>>,
    monitor: Option<Arc<MailboxMonitor>>,
    state: CallState,
    nick: Option<String>,
    call_id: Option<CallId>,
    peer_nick: Option<String>,
}

impl CallEndpoint {
    /// Create an endpoint for a fresh connection.
    #[must_use]
    pub fn new(
        registry: RegistryHandle,
        directory: Arc<dyn Directory>,
        push: Arc<dyn PushGateway>,
        sink: CallSink,
        notice_buffer: usize,
    ) -> Self {
        let (notice_tx, notice_rx) = mpsc::channel(notice_buffer);
        Self {
            registry,
            directory,
            push,
            sink,
            notice_tx,
            notices: Some(notice_rx),
            monitor: None,
            state: CallState::Init,
            nick: None,
            call_id: None,
            peer_nick: None,
        }
    }

    /// Current protocol state.
    #[must_use]
    pub fn state(&self) -> CallState {
        self.state
    }

    /// Login identity, once established.
    #[must_use]
    pub fn nick(&self) -> Option<&str> {
        self.nick.as_deref()
    }

    /// Id of the call currently placed or joined.
    #[must_use]
    pub fn call_id(&self) -> Option<&CallId> {
        self.call_id.as_ref()
    }

    /// Drive the endpoint until the transport closes.
    ///
    /// `frames` carries raw text frames read off the client socket.
    /// Registry cleanup runs unconditionally on exit, so an abrupt
    /// disconnect behaves like HANGUP plus logout.
    pub async fn run(mut self, mut frames: mpsc::Receiver<String>) {
        let Some(mut notices) = self.notices.take() else {
            error!(target: "sb.endpoint.call", "Endpoint started twice");
            return;
        };

        loop {
            tokio::select! {
                maybe_frame = frames.recv() => {
                    match maybe_frame {
                        Some(raw) => {
                            match self.handle_frame(&raw).await {
                                Ok(FrameOutcome::Continue) => {}
                                Ok(FrameOutcome::Close) | Err(_) => break,
                            }
                        }
                        None => break,
                    }
                }
                maybe_notice = notices.recv() => {
                    // Never None: we hold a sender ourselves.
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
    /// Returns [`FrameOutcome::Close`] when the transport should end the
    /// connection, which happens on a rejected login.
    ///
    /// # Errors
    ///
    /// Returns [`SinkClosed`] when the client connection is gone; every
    /// protocol-level problem is logged and swallowed.
    pub async fn handle_frame(&mut self, raw: &str) -> Result<FrameOutcome, SinkClosed> {
        let message = match codec::decode_call_inbound(raw) {
            Ok(message) => message,
            Err(err) => {
                warn!(
                    target: "sb.endpoint.call",
                    nick = self.nick.as_deref().unwrap_or("<anonymous>"),
                    error = %err,
                    "Dropping malformed frame"
                );
                return Ok(FrameOutcome::Continue);
            }
        };

        let kind = message.kind();
        let Some(action) = action_for(self.state, kind) else {
            let violation = SignalError::ProtocolViolation {
                state: self.state.as_str(),
                message_type: kind.as_str(),
            };
            warn!(
                target: "sb.endpoint.call",
                nick = self.nick.as_deref().unwrap_or("<anonymous>"),
                error = %violation,
                "Dropping message"
            );
            return Ok(FrameOutcome::Continue);
        };

        let result = match (action, message) {
            (CallAction::Login, CallInbound::Login { nick }) => return self.login(nick).await,
            (CallAction::StartCall, CallInbound::Call { to }) => self.start_call(to).await,
            (CallAction::Accept, CallInbound::Accept { to, call_id }) => {
                self.accept(to, call_id).await
            }
            (CallAction::Refuse, CallInbound::Refuse { to, call_id }) => {
                self.refuse(to, call_id).await
            }
            (CallAction::Cancel, CallInbound::Cancel {}) => self.cancel().await,
            (CallAction::Hangup, CallInbound::Hangup {}) => self.hangup().await,
            (CallAction::Relay, CallInbound::Offer(value)) => {
                self.relay(CallOutbound::Offer(value)).await
            }
            (CallAction::Relay, CallInbound::Answer(value)) => {
                self.relay(CallOutbound::Answer(value)).await
            }
            (CallAction::Relay, CallInbound::Ice(value)) => {
                self.relay(CallOutbound::Ice(value)).await
            }
            // The table only pairs each action with its own message kind.
            (_, message) => {
                error!(
                    target: "sb.endpoint.call",
                    message_type = message.kind().as_str(),
                    "Dispatch table returned mismatched action"
                );
                Ok(())
            }
        };
        result.map(|()| FrameOutcome::Continue)
    }

    /// Apply one notice from the registry.
    ///
    /// # Errors
    ///
    /// Returns [`SinkClosed`] when the client connection is gone.
    pub async fn handle_notice(&mut self, notice: CallNotice) -> Result<(), SinkClosed> {
        match notice {
            CallNotice::Accepted { from } if self.state == CallState::Rendezvous => {
                self.state = CallState::Signalling;
                self.sink.send(&CallOutbound::Accepted { from }).await
            }
            CallNotice::Refused { from } if self.state == CallState::Rendezvous => {
                self.clear_call();
                self.sink.send(&CallOutbound::Refused { from }).await
            }
            CallNotice::Forward(CallOutbound::Cancelled {}) => {
                // Our counterpart is gone; whatever call we referenced no
                // longer exists.
                self.clear_call();
                self.sink.send(&CallOutbound::Cancelled {}).await
            }
            CallNotice::Forward(frame) if self.state == CallState::Signalling => {
                self.sink.send(&frame).await
            }
            other => {
                debug!(
                    target: "sb.endpoint.call",
                    nick = self.nick.as_deref().unwrap_or("<anonymous>"),
                    state = self.state.as_str(),
                    notice = ?other,
                    "Dropping notice not applicable in current state"
                );
                Ok(())
            }
        }
    }

    async fn login(&mut self, nick: String) -> Result<FrameOutcome, SinkClosed> {
        // A missing push target is not a login failure; it only means this
        // user cannot be woken for incoming calls.
        match self.directory.resolve_push_target(&nick).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!(
                    target: "sb.endpoint.call",
                    nick = %nick,
                    "No push target registered for this identity"
                );
            }
            Err(err) => {
                warn!(
                    target: "sb.endpoint.call",
                    nick = %nick,
                    error = %err,
                    "Push target lookup failed during login"
                );
            }
        }

        let peer = CallPeer::new(nick.clone(), self.notice_tx.clone());
        let monitor = peer.monitor();
        match self.registry.register(peer).await {
            Ok(()) => {
                info!(
                    target: "sb.endpoint.call",
                    nick = %nick,
                    "Endpoint logged in"
                );
                self.monitor = Some(monitor);
                self.nick = Some(nick);
                self.state = CallState::LoggedIn;
            }
            Err(SignalError::DuplicateIdentity(nick)) => {
                // The original registration wins; this connection has no
                // usable identity, so hand the close decision back to the
                // transport.
                warn!(
                    target: "sb.endpoint.call",
                    nick = %nick,
                    "Login rejected, identity already online"
                );
                return Ok(FrameOutcome::Close);
            }
            Err(err) => {
                error!(
                    target: "sb.endpoint.call",
                    nick = %nick,
                    error = %err,
                    "Login failed"
                );
            }
        }
        Ok(FrameOutcome::Continue)
    }

    async fn start_call(&mut self, to: String) -> Result<(), SinkClosed> {
        let Some(nick) = self.nick.clone() else {
            return Ok(());
        };

        let token = match self.directory.resolve_push_target(&to).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                let err = SignalError::UnknownRecipient(to);
                warn!(
                    target: "sb.endpoint.call",
                    nick = %nick,
                    error = %err,
                    "Call not placed"
                );
                return Ok(());
            }
            Err(err) => {
                error!(
                    target: "sb.endpoint.call",
                    nick = %nick,
                    callee = %to,
                    error = %err,
                    "Push target lookup failed, call not placed"
                );
                return Ok(());
            }
        };

        let call_id = match self.registry.start_call(nick.clone(), to.clone()).await {
            Ok(call_id) => call_id,
            Err(err) => {
                error!(
                    target: "sb.endpoint.call",
                    nick = %nick,
                    callee = %to,
                    error = %err,
                    "Failed to create conversation"
                );
                return Ok(());
            }
        };

        if let Err(err) = self.push_incoming(&token, &nick, &to, &call_id).await {
            error!(
                target: "sb.endpoint.call",
                nick = %nick,
                callee = %to,
                call_id = %call_id,
                error = %err,
                "Push delivery failed, call attempt withdrawn"
            );
            if let Err(err) = self.registry.cancel_call(call_id, nick).await {
                debug!(
                    target: "sb.endpoint.call",
                    error = %err,
                    "Could not withdraw call attempt"
                );
            }
            return Ok(());
        }

        self.call_id = Some(call_id);
        self.peer_nick = Some(to);
        self.state = CallState::Rendezvous;
        Ok(())
    }

    async fn push_incoming(
        &self,
        token: &PushToken,
        caller: &str,
        callee: &str,
        call_id: &CallId,
    ) -> Result<(), SignalError> {
        let incoming = IncomingCall {
            caller: caller.to_owned(),
            call_id: call_id.clone(),
        };
        self.push.push_incoming_call(token, &incoming).await?;
        debug!(
            target: "sb.endpoint.call",
            caller = %caller,
            callee = %callee,
            call_id = %call_id,
            "Incoming-call push delivered"
        );
        Ok(())
    }

    async fn accept(&mut self, to: String, call_id: CallId) -> Result<(), SinkClosed> {
        let Some(nick) = self.nick.clone() else {
            return Ok(());
        };
        self.withdraw_own_call(&nick).await;

        match self
            .registry
            .accept_call(nick.clone(), to.clone(), call_id.clone())
            .await
        {
            Ok(()) => {
                self.call_id = Some(call_id);
                self.peer_nick = Some(to);
                self.state = CallState::Signalling;
                Ok(())
            }
            Err(SignalError::StaleCall(_) | SignalError::ConversationFull(_)) => {
                // Caller gave up (or someone else got there first) while
                // this accept was in flight.
                self.sink.send(&CallOutbound::Cancelled {}).await
            }
            Err(err) => {
                error!(
                    target: "sb.endpoint.call",
                    nick = %nick,
                    call_id = %call_id,
                    error = %err,
                    "Accept failed"
                );
                Ok(())
            }
        }
    }

    async fn refuse(&mut self, to: String, call_id: CallId) -> Result<(), SinkClosed> {
        let Some(nick) = self.nick.clone() else {
            return Ok(());
        };
        self.withdraw_own_call(&nick).await;

        match self
            .registry
            .refuse_call(nick.clone(), to, call_id.clone())
            .await
        {
            Ok(()) => Ok(()),
            Err(SignalError::StaleCall(_)) => self.sink.send(&CallOutbound::Cancelled {}).await,
            Err(err) => {
                error!(
                    target: "sb.endpoint.call",
                    nick = %nick,
                    call_id = %call_id,
                    error = %err,
                    "Refuse failed"
                );
                Ok(())
            }
        }
    }

    /// Answering somebody else's call while our own attempt is pending
    /// withdraws our attempt first, so we are never in two conversations.
    async fn withdraw_own_call(&mut self, nick: &str) {
        if self.state != CallState::Rendezvous {
            return;
        }
        if let Some(own) = self.call_id.take() {
            debug!(
                target: "sb.endpoint.call",
                nick = %nick,
                call_id = %own,
                "Withdrawing own pending call"
            );
            if let Err(err) = self.registry.cancel_call(own, nick.to_owned()).await {
                debug!(
                    target: "sb.endpoint.call",
                    error = %err,
                    "Could not withdraw call attempt"
                );
            }
        }
        self.peer_nick = None;
        self.state = CallState::LoggedIn;
    }

    async fn cancel(&mut self) -> Result<(), SinkClosed> {
        let Some(nick) = self.nick.clone() else {
            return Ok(());
        };
        if let Some(call_id) = self.call_id.take() {
            if let Err(err) = self.registry.cancel_call(call_id, nick).await {
                debug!(
                    target: "sb.endpoint.call",
                    error = %err,
                    "Could not cancel call"
                );
            }
        }
        self.peer_nick = None;
        self.state = CallState::LoggedIn;
        Ok(())
    }

    async fn hangup(&mut self) -> Result<(), SinkClosed> {
        let Some(nick) = self.nick.clone() else {
            return Ok(());
        };
        // HANGUP with no active call is a graceful no-op.
        if let Some(call_id) = self.call_id.take() {
            if let Err(err) = self.registry.hangup(nick, call_id).await {
                debug!(
                    target: "sb.endpoint.call",
                    error = %err,
                    "Could not hang up"
                );
            }
        }
        self.peer_nick = None;
        self.state = CallState::LoggedIn;
        Ok(())
    }

    async fn relay(&mut self, message: CallOutbound) -> Result<(), SinkClosed> {
        let (Some(nick), Some(call_id)) = (self.nick.clone(), self.call_id.clone()) else {
            return Ok(());
        };
        if let Err(err) = self.registry.call_signal(call_id, nick, message).await {
            debug!(
                target: "sb.endpoint.call",
                error = %err,
                "Could not relay signal"
            );
        }
        Ok(())
    }

    fn clear_call(&mut self) {
        self.call_id = None;
        self.peer_nick = None;
        if self.state == CallState::Rendezvous || self.state == CallState::Signalling {
            self.state = CallState::LoggedIn;
        }
    }

    async fn shutdown(&mut self) {
        if let Some(nick) = self.nick.take() {
            info!(
                target: "sb.endpoint.call",
                nick = %nick,
                "Endpoint disconnected"
            );
            if let Err(err) = self
                .registry
                .disconnect(nick, self.call_id.take(), None)
                .await
            {
                debug!(
                    target: "sb.endpoint.call",
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
    use crate::test_fakes::{FakeDirectory, FakePushGateway};

    struct Fixture {
        registry: RegistryHandle,
        directory: Arc<FakeDirectory>,
        push: Arc<FakePushGateway>,
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
                push: Arc::new(FakePushGateway::new()),
            }
        }

        fn endpoint(&self) -> (CallEndpoint, tokio::sync::mpsc::Receiver<String>) {
            let (sink, frames_out) = CallSink::new(16);
            let endpoint = CallEndpoint::new(
                self.registry.clone(),
                Arc::clone(&self.directory) as Arc<dyn Directory>,
                Arc::clone(&self.push) as Arc<dyn PushGateway>,
                sink,
                16,
            );
            (endpoint, frames_out)
        }
    }

    #[tokio::test]
    async fn login_registers_and_transitions() {
        let fx = Fixture::new();
        let (mut alice, _out) = fx.endpoint();

        alice
            .handle_frame(r#"{"type": "LOGIN", "payload": {"nick": "alice"}}"#)
            .await
            .unwrap();

        assert_eq!(alice.state(), CallState::LoggedIn);
        assert_eq!(alice.nick(), Some("alice"));
    }

    #[tokio::test]
    async fn duplicate_login_asks_the_transport_to_close() {
        let fx = Fixture::new();
        let (mut first, _out1) = fx.endpoint();
        let (mut second, _out2) = fx.endpoint();

        let outcome = first
            .handle_frame(r#"{"type": "LOGIN", "payload": {"nick": "alice"}}"#)
            .await
            .unwrap();
        assert_eq!(outcome, FrameOutcome::Continue);

        let outcome = second
            .handle_frame(r#"{"type": "LOGIN", "payload": {"nick": "alice"}}"#)
            .await
            .unwrap();
        assert_eq!(outcome, FrameOutcome::Close);
        assert_eq!(second.state(), CallState::Init);
        assert_eq!(second.nick(), None);
    }

    #[tokio::test]
    async fn message_in_wrong_state_is_dropped_not_fatal() {
        let fx = Fixture::new();
        let (mut alice, _out) = fx.endpoint();

        // OFFER before login: protocol violation, connection unaffected.
        alice
            .handle_frame(r#"{"type": "OFFER", "payload": {"sdp": "v=0"}}"#)
            .await
            .unwrap();
        assert_eq!(alice.state(), CallState::Init);

        // The endpoint still works afterwards.
        alice
            .handle_frame(r#"{"type": "LOGIN", "payload": {"nick": "alice"}}"#)
            .await
            .unwrap();
        assert_eq!(alice.state(), CallState::LoggedIn);
    }

    #[tokio::test]
    async fn malformed_frame_is_dropped() {
        let fx = Fixture::new();
        let (mut alice, _out) = fx.endpoint();

        alice.handle_frame("not json at all").await.unwrap();
        assert_eq!(alice.state(), CallState::Init);
    }

    #[tokio::test]
    async fn call_pushes_and_enters_rendezvous() {
        let fx = Fixture::new();
        let (mut alice, _out) = fx.endpoint();

        alice
            .handle_frame(r#"{"type": "LOGIN", "payload": {"nick": "alice"}}"#)
            .await
            .unwrap();
        alice
            .handle_frame(r#"{"type": "CALL", "payload": {"to": "bob"}}"#)
            .await
            .unwrap();

        assert_eq!(alice.state(), CallState::Rendezvous);
        let call_id = alice.call_id().cloned().unwrap();

        let pushes = fx.push.pushed();
        assert_eq!(pushes.len(), 1);
        let (_token, incoming) = pushes.first().unwrap();
        assert_eq!(incoming.caller, "alice");
        assert_eq!(incoming.call_id, call_id);
    }

    #[tokio::test]
    async fn call_to_unknown_recipient_stays_logged_in() {
        let fx = Fixture::new();
        fx.directory.drop_push_target("bob");
        let (mut alice, _out) = fx.endpoint();

        alice
            .handle_frame(r#"{"type": "LOGIN", "payload": {"nick": "alice"}}"#)
            .await
            .unwrap();
        alice
            .handle_frame(r#"{"type": "CALL", "payload": {"to": "bob"}}"#)
            .await
            .unwrap();

        assert_eq!(alice.state(), CallState::LoggedIn);
        assert!(alice.call_id().is_none());
        assert!(fx.push.pushed().is_empty());
    }

    #[tokio::test]
    async fn failed_push_withdraws_the_call_attempt() {
        let fx = Fixture::new();
        fx.push.set_fail(true);
        let (mut alice, _out) = fx.endpoint();

        alice
            .handle_frame(r#"{"type": "LOGIN", "payload": {"nick": "alice"}}"#)
            .await
            .unwrap();
        alice
            .handle_frame(r#"{"type": "CALL", "payload": {"to": "bob"}}"#)
            .await
            .unwrap();

        assert_eq!(alice.state(), CallState::LoggedIn);
        assert!(alice.call_id().is_none());

        let status = fx.registry.get_status().await.unwrap();
        assert_eq!(status.conversations, 0);
    }

    #[tokio::test]
    async fn accepted_notice_completes_the_rendezvous() {
        let fx = Fixture::new();
        let (mut alice, mut alice_out) = fx.endpoint();
        let (mut bob, _bob_out) = fx.endpoint();

        alice
            .handle_frame(r#"{"type": "LOGIN", "payload": {"nick": "alice"}}"#)
            .await
            .unwrap();
        bob.handle_frame(r#"{"type": "LOGIN", "payload": {"nick": "bob"}}"#)
            .await
            .unwrap();
        alice
            .handle_frame(r#"{"type": "CALL", "payload": {"to": "bob"}}"#)
            .await
            .unwrap();
        let call_id = alice.call_id().cloned().unwrap();

        let frame = format!(
            r#"{{"type": "ACCEPT", "payload": {{"to": "alice", "call_id": "{}"}}}}"#,
            call_id.as_str()
        );
        bob.handle_frame(&frame).await.unwrap();
        assert_eq!(bob.state(), CallState::Signalling);

        // Drive alice's mailbox by hand (no run loop in unit tests).
        let mut notices = alice.notices.take().unwrap();
        let notice = notices.recv().await.unwrap();
        alice.handle_notice(notice).await.unwrap();
        assert_eq!(alice.state(), CallState::Signalling);

        let raw = alice_out.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["type"], "ACCEPTED");
        assert_eq!(value["payload"]["from"], "bob");
    }

    #[tokio::test]
    async fn accept_of_a_stale_call_gets_cancelled_reply() {
        let fx = Fixture::new();
        let (mut bob, mut bob_out) = fx.endpoint();

        bob.handle_frame(r#"{"type": "LOGIN", "payload": {"nick": "bob"}}"#)
            .await
            .unwrap();
        bob.handle_frame(
            r#"{"type": "ACCEPT", "payload": {"to": "alice", "call_id": "long-gone"}}"#,
        )
        .await
        .unwrap();

        assert_eq!(bob.state(), CallState::LoggedIn);
        let raw = bob_out.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["type"], "CANCELLED");
    }

    #[tokio::test]
    async fn accepting_while_calling_withdraws_own_attempt() {
        let fx = Fixture::new();
        let (mut alice, _alice_out) = fx.endpoint();
        let (mut bob, _bob_out) = fx.endpoint();
        let (mut carol, _carol_out) = fx.endpoint();

        for (ep, nick) in [
            (&mut alice, "alice"),
            (&mut bob, "bob"),
            (&mut carol, "carol"),
        ] {
            let frame = format!(r#"{{"type": "LOGIN", "payload": {{"nick": "{nick}"}}}}"#);
            ep.handle_frame(&frame).await.unwrap();
        }

        // Carol calls bob; bob calls alice; bob then answers carol.
        carol
            .handle_frame(r#"{"type": "CALL", "payload": {"to": "bob"}}"#)
            .await
            .unwrap();
        let carols_call = carol.call_id().cloned().unwrap();
        bob.handle_frame(r#"{"type": "CALL", "payload": {"to": "alice"}}"#)
            .await
            .unwrap();
        let bobs_call = bob.call_id().cloned().unwrap();

        let frame = format!(
            r#"{{"type": "ACCEPT", "payload": {{"to": "carol", "call_id": "{}"}}}}"#,
            carols_call.as_str()
        );
        bob.handle_frame(&frame).await.unwrap();

        assert_eq!(bob.state(), CallState::Signalling);
        assert_eq!(bob.call_id(), Some(&carols_call));
        assert_ne!(bobs_call, carols_call);

        // Bob's own attempt is gone from the registry.
        let status = fx.registry.get_status().await.unwrap();
        assert_eq!(status.conversations, 1);
    }

    #[tokio::test]
    async fn hangup_without_a_call_is_graceful() {
        let fx = Fixture::new();
        let (mut alice, _out) = fx.endpoint();

        alice
            .handle_frame(r#"{"type": "LOGIN", "payload": {"nick": "alice"}}"#)
            .await
            .unwrap();
        alice
            .handle_frame(r#"{"type": "HANGUP", "payload": {}}"#)
            .await
            .unwrap();
        assert_eq!(alice.state(), CallState::LoggedIn);
    }
}
