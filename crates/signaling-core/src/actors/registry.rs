//! `RegistryActor` - sole owner of the shared signaling state.
//!
//! The registry owns three directories:
//!
//! - `online` - logged-in call endpoints by nick
//! - `conversations` - active 1:1 call attempts by call id
//! - `channels` - active channels by channel id
//!
//! Nothing outside the actor task ever touches the maps; endpoint tasks
//! interact through [`RegistryHandle`], and message ordering through the
//! mailbox serializes every mutation. Collaborator calls (directory
//! lookups, push) happen in the endpoint tasks so a slow collaborator can
//! never stall routing.

use crate::actors::messages::{
    CallNotice, CallPeer, ChannelPeer, ChannelSignalKind, RegistryMessage, RegistryStatus,
};
use crate::actors::metrics::{ActorType, MailboxMonitor, RegistryMetrics};
use crate::config::Config;
use crate::entities::{Channel, Conversation};
use crate::errors::SignalError;

use signaling_protocol::envelope::{AddressedSignal, CallId, CallOutbound};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Handle to the `RegistryActor`.
///
/// Cheap to clone; every endpoint task holds one. Request-reply methods
/// block on a oneshot until the actor has applied the mutation, which is
/// what gives endpoints their ordering guarantees.
#[derive(Clone)]
pub struct RegistryHandle {
    sender: mpsc::Sender<RegistryMessage>,
    cancel_token: CancellationToken,
    /// Shared with the actor: enqueues are recorded here at send time so
    /// the depth gauge reflects real backlog, dequeues in the actor loop.
    mailbox: Arc<MailboxMonitor>,
}

impl RegistryHandle {
    /// Spawn the registry actor and return a handle to it.
    ///
    /// `residents` are the permanent channel members; every channel the
    /// registry creates is seeded with clones of these peers.
    #[must_use]
    pub fn spawn(
        config: &Config,
        residents: Vec<ChannelPeer>,
        metrics: Arc<RegistryMetrics>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.registry_mailbox_buffer);
        let cancel_token = CancellationToken::new();
        let mailbox = Arc::new(MailboxMonitor::new(ActorType::Registry, &config.instance_id));

        let actor = RegistryActor::new(
            config.instance_id.clone(),
            receiver,
            cancel_token.clone(),
            residents,
            metrics,
            Arc::clone(&mailbox),
        );
        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
            mailbox,
        }
    }

    /// Register a call endpoint in the online directory.
    pub async fn register(&self, peer: CallPeer) -> Result<(), SignalError> {
        let (tx, rx) = oneshot::channel();
        self.request(
            RegistryMessage::Register {
                peer,
                respond_to: tx,
            },
            rx,
        )
        .await?
    }

    /// Remove a call endpoint from the online directory.
    pub async fn unregister(&self, nick: String) -> Result<(), SignalError> {
        self.send(RegistryMessage::Unregister { nick }).await
    }

    /// Create a conversation for a new call attempt.
    pub async fn start_call(&self, caller: String, callee: String) -> Result<CallId, SignalError> {
        let (tx, rx) = oneshot::channel();
        self.request(
            RegistryMessage::StartCall {
                caller,
                callee,
                respond_to: tx,
            },
            rx,
        )
        .await?
    }

    /// Join the callee into a conversation and notify the caller.
    pub async fn accept_call(
        &self,
        callee: String,
        caller: String,
        call_id: CallId,
    ) -> Result<(), SignalError> {
        let (tx, rx) = oneshot::channel();
        self.request(
            RegistryMessage::AcceptCall {
                callee,
                caller,
                call_id,
                respond_to: tx,
            },
            rx,
        )
        .await?
    }

    /// Notify the caller of refusal and destroy the conversation.
    pub async fn refuse_call(
        &self,
        callee: String,
        caller: String,
        call_id: CallId,
    ) -> Result<(), SignalError> {
        let (tx, rx) = oneshot::channel();
        self.request(
            RegistryMessage::RefuseCall {
                callee,
                caller,
                call_id,
                respond_to: tx,
            },
            rx,
        )
        .await?
    }

    /// Destroy a conversation before the callee answered.
    pub async fn cancel_call(&self, call_id: CallId, by: String) -> Result<(), SignalError> {
        self.send(RegistryMessage::CancelCall { call_id, by }).await
    }

    /// Leave a conversation, notifying the remaining member.
    pub async fn hangup(&self, nick: String, call_id: CallId) -> Result<(), SignalError> {
        self.send(RegistryMessage::Hangup { nick, call_id }).await
    }

    /// Forward opaque signaling traffic to the other conversation member.
    pub async fn call_signal(
        &self,
        call_id: CallId,
        sender: String,
        message: CallOutbound,
    ) -> Result<(), SignalError> {
        self.send(RegistryMessage::CallSignal {
            call_id,
            sender,
            message,
        })
        .await
    }

    /// Join a channel, creating it on first use. Returns the online list.
    pub async fn join_channel(
        &self,
        channel_id: String,
        peer: ChannelPeer,
    ) -> Result<Vec<String>, SignalError> {
        let (tx, rx) = oneshot::channel();
        self.request(
            RegistryMessage::JoinChannel {
                channel_id,
                peer,
                respond_to: tx,
            },
            rx,
        )
        .await?
    }

    /// Leave a channel.
    pub async fn leave_channel(&self, nick: String, channel_id: String) -> Result<(), SignalError> {
        self.send(RegistryMessage::LeaveChannel { nick, channel_id })
            .await
    }

    /// Deliver an addressed signal to one named channel member.
    pub async fn channel_signal(
        &self,
        channel_id: String,
        sender: String,
        kind: ChannelSignalKind,
        signal: AddressedSignal,
    ) -> Result<(), SignalError> {
        self.send(RegistryMessage::ChannelSignal {
            channel_id,
            sender,
            kind,
            signal,
        })
        .await
    }

    /// Connection-close hook: tear down everything the endpoint held.
    pub async fn disconnect(
        &self,
        nick: String,
        call_id: Option<CallId>,
        channel_id: Option<String>,
    ) -> Result<(), SignalError> {
        self.send(RegistryMessage::Disconnect {
            nick,
            call_id,
            channel_id,
        })
        .await
    }

    /// Get a snapshot of registry occupancy.
    pub async fn get_status(&self) -> Result<RegistryStatus, SignalError> {
        let (tx, rx) = oneshot::channel();
        self.request(RegistryMessage::GetStatus { respond_to: tx }, rx)
            .await
    }

    /// Cancel the registry actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the registry has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    async fn send(&self, message: RegistryMessage) -> Result<(), SignalError> {
        self.sender
            .send(message)
            .await
            .map_err(|e| SignalError::Registry(format!("mailbox send failed: {e}")))?;
        self.mailbox.record_enqueue();
        Ok(())
    }

    async fn request<T>(
        &self,
        message: RegistryMessage,
        rx: oneshot::Receiver<T>,
    ) -> Result<T, SignalError> {
        self.send(message).await?;
        rx.await
            .map_err(|e| SignalError::Registry(format!("response receive failed: {e}")))
    }
}

/// The `RegistryActor` implementation.
///
/// Owns the actor state and runs the message loop.
pub struct RegistryActor {
    /// Signaling instance id, for log correlation.
    instance_id: String,
    /// Message receiver.
    receiver: mpsc::Receiver<RegistryMessage>,
    /// Cancellation token.
    cancel_token: CancellationToken,
    /// Logged-in call endpoints by nick.
    online: HashMap<String, CallPeer>,
    /// Active 1:1 call attempts by call id.
    conversations: HashMap<CallId, Conversation>,
    /// Active channels by channel id.
    channels: HashMap<String, Channel>,
    /// Permanent channel members seeded into every channel.
    residents: Vec<ChannelPeer>,
    /// Shared occupancy counters.
    metrics: Arc<RegistryMetrics>,
    /// Mailbox monitor, shared with the handle side.
    mailbox: Arc<MailboxMonitor>,
    /// Unix timestamp the actor started at.
    started_at: i64,
}

impl RegistryActor {
    fn new(
        instance_id: String,
        receiver: mpsc::Receiver<RegistryMessage>,
        cancel_token: CancellationToken,
        residents: Vec<ChannelPeer>,
        metrics: Arc<RegistryMetrics>,
        mailbox: Arc<MailboxMonitor>,
    ) -> Self {
        Self {
            instance_id,
            receiver,
            cancel_token,
            online: HashMap::new(),
            conversations: HashMap::new(),
            channels: HashMap::new(),
            residents,
            metrics,
            mailbox,
            started_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "sb.registry", fields(instance_id = %self.instance_id))]
    async fn run(mut self) {
        info!(
            target: "sb.registry",
            instance_id = %self.instance_id,
            "RegistryActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "sb.registry",
                        instance_id = %self.instance_id,
                        "RegistryActor received cancellation signal"
                    );
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.handle_message(message);
                            self.mailbox.record_dequeue();
                        }
                        None => {
                            info!(
                                target: "sb.registry",
                                instance_id = %self.instance_id,
                                "RegistryActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "sb.registry",
            instance_id = %self.instance_id,
            endpoints_remaining = self.online.len(),
            messages_processed = self.mailbox.messages_processed(),
            "RegistryActor stopped"
        );
    }

    fn handle_message(&mut self, message: RegistryMessage) {
        match message {
            RegistryMessage::Register { peer, respond_to } => {
                let result = self.register(peer);
                let _ = respond_to.send(result);
            }

            RegistryMessage::Unregister { nick } => {
                self.unregister(&nick);
            }

            RegistryMessage::StartCall {
                caller,
                callee,
                respond_to,
            } => {
                let result = self.start_call(&caller, &callee);
                let _ = respond_to.send(result);
            }

            RegistryMessage::AcceptCall {
                callee,
                caller,
                call_id,
                respond_to,
            } => {
                let result = self.accept_call(&callee, &caller, &call_id);
                let _ = respond_to.send(result);
            }

            RegistryMessage::RefuseCall {
                callee,
                caller,
                call_id,
                respond_to,
            } => {
                let result = self.refuse_call(&callee, &caller, &call_id);
                let _ = respond_to.send(result);
            }

            RegistryMessage::CancelCall { call_id, by } => {
                self.cancel_call(&call_id, &by);
            }

            RegistryMessage::Hangup { nick, call_id } => {
                self.hangup(&nick, &call_id);
            }

            RegistryMessage::CallSignal {
                call_id,
                sender,
                message,
            } => {
                self.call_signal(&call_id, &sender, message);
            }

            RegistryMessage::JoinChannel {
                channel_id,
                peer,
                respond_to,
            } => {
                let result = self.join_channel(channel_id, peer);
                let _ = respond_to.send(result);
            }

            RegistryMessage::LeaveChannel { nick, channel_id } => {
                self.leave_channel(&nick, &channel_id);
            }

            RegistryMessage::ChannelSignal {
                channel_id,
                sender,
                kind,
                signal,
            } => {
                self.channel_signal(&channel_id, &sender, kind, signal);
            }

            RegistryMessage::Disconnect {
                nick,
                call_id,
                channel_id,
            } => {
                self.unregister(&nick);
                if let Some(call_id) = call_id {
                    self.hangup(&nick, &call_id);
                }
                if let Some(channel_id) = channel_id {
                    self.leave_channel(&nick, &channel_id);
                }
            }

            RegistryMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(self.status());
            }
        }
    }

    /// Register an endpoint; the original registration wins on collision.
    fn register(&mut self, peer: CallPeer) -> Result<(), SignalError> {
        if self.online.contains_key(&peer.nick) {
            return Err(SignalError::DuplicateIdentity(peer.nick));
        }

        debug!(
            target: "sb.registry",
            nick = %peer.nick,
            "Endpoint registered"
        );
        self.online.insert(peer.nick.clone(), peer);
        self.metrics.endpoint_registered();
        Ok(())
    }

    fn unregister(&mut self, nick: &str) {
        if self.online.remove(nick).is_some() {
            debug!(
                target: "sb.registry",
                nick = %nick,
                "Endpoint unregistered"
            );
            self.metrics.endpoint_unregistered();
        }
    }

    /// Create a conversation with the caller as its first member, so the
    /// entity is never registered without an occupant.
    fn start_call(&mut self, caller: &str, callee: &str) -> Result<CallId, SignalError> {
        let Some(peer) = self.online.get(caller).cloned() else {
            return Err(SignalError::Registry(format!(
                "caller {caller} is not registered"
            )));
        };

        let call_id = CallId(uuid::Uuid::new_v4().to_string());
        debug!(
            target: "sb.registry",
            caller = %caller,
            callee = %callee,
            call_id = %call_id,
            "Conversation created"
        );

        self.conversations
            .insert(call_id.clone(), Conversation::new(call_id.clone(), peer));
        self.metrics.conversation_created();
        Ok(call_id)
    }

    fn accept_call(
        &mut self,
        callee: &str,
        caller: &str,
        call_id: &CallId,
    ) -> Result<(), SignalError> {
        let Some(peer) = self.online.get(callee).cloned() else {
            return Err(SignalError::Registry(format!(
                "callee {callee} is not registered"
            )));
        };

        let Some(conversation) = self.conversations.get_mut(call_id) else {
            return Err(SignalError::StaleCall(call_id.clone()));
        };
        if conversation.caller() != caller {
            // The call id exists but belongs to a different caller; the
            // accepting client is acting on outdated knowledge.
            return Err(SignalError::StaleCall(call_id.clone()));
        }

        conversation.join(peer)?;
        conversation.relay(
            callee,
            CallNotice::Accepted {
                from: callee.to_owned(),
            },
        );

        debug!(
            target: "sb.registry",
            callee = %callee,
            caller = %caller,
            call_id = %call_id,
            "Call accepted"
        );
        Ok(())
    }

    /// Refusal ends the call attempt outright, so the conversation goes
    /// with it.
    fn refuse_call(
        &mut self,
        callee: &str,
        caller: &str,
        call_id: &CallId,
    ) -> Result<(), SignalError> {
        let Some(conversation) = self.conversations.get(call_id) else {
            return Err(SignalError::StaleCall(call_id.clone()));
        };
        if conversation.caller() != caller {
            return Err(SignalError::StaleCall(call_id.clone()));
        }

        conversation.relay(
            callee,
            CallNotice::Refused {
                from: callee.to_owned(),
            },
        );
        self.conversations.remove(call_id);
        self.metrics.conversation_destroyed();

        debug!(
            target: "sb.registry",
            callee = %callee,
            caller = %caller,
            call_id = %call_id,
            "Call refused, conversation destroyed"
        );
        Ok(())
    }

    fn cancel_call(&mut self, call_id: &CallId, by: &str) {
        let Some(conversation) = self.conversations.get(call_id) else {
            // The refusal or teardown already won the race.
            debug!(
                target: "sb.registry",
                call_id = %call_id,
                by = %by,
                "Cancel for unknown conversation ignored"
            );
            return;
        };
        if !conversation.is_member(by) {
            warn!(
                target: "sb.registry",
                call_id = %call_id,
                by = %by,
                "Cancel from non-member ignored"
            );
            return;
        }

        // If an accept raced ahead of the cancel the other member is
        // already in the call and gets a hang-up instead of silence.
        conversation.relay(
            by,
            CallNotice::Forward(CallOutbound::HungUp {
                from: by.to_owned(),
                call_id: call_id.clone(),
            }),
        );
        self.conversations.remove(call_id);
        self.metrics.conversation_destroyed();

        debug!(
            target: "sb.registry",
            call_id = %call_id,
            by = %by,
            "Call cancelled, conversation destroyed"
        );
    }

    fn hangup(&mut self, nick: &str, call_id: &CallId) {
        let Some(conversation) = self.conversations.get_mut(call_id) else {
            debug!(
                target: "sb.registry",
                call_id = %call_id,
                nick = %nick,
                "Hangup for unknown conversation ignored"
            );
            return;
        };

        conversation.relay(
            nick,
            CallNotice::Forward(CallOutbound::HungUp {
                from: nick.to_owned(),
                call_id: call_id.clone(),
            }),
        );
        conversation.remove(nick);

        if conversation.is_empty() {
            self.conversations.remove(call_id);
            self.metrics.conversation_destroyed();
            debug!(
                target: "sb.registry",
                call_id = %call_id,
                "Conversation emptied, destroyed"
            );
        }
    }

    fn call_signal(&mut self, call_id: &CallId, sender: &str, message: CallOutbound) {
        let Some(conversation) = self.conversations.get(call_id) else {
            // Stale reference: tell the sender the call is gone.
            self.metrics.record_signal_dropped();
            if let Some(peer) = self.online.get(sender) {
                peer.notify(CallNotice::Forward(CallOutbound::Cancelled {}));
            }
            debug!(
                target: "sb.registry",
                call_id = %call_id,
                sender = %sender,
                "Signal for unknown conversation, sender told CANCELLED"
            );
            return;
        };

        if conversation.relay(sender, CallNotice::Forward(message)) {
            self.metrics.record_signal_routed();
        } else {
            self.metrics.record_signal_dropped();
        }
    }

    /// Join a channel, creating it on first use. A nick already in the
    /// channel is rejected the same way `register` rejects a duplicate
    /// login; on a rejected first join the channel is never created.
    fn join_channel(
        &mut self,
        channel_id: String,
        peer: ChannelPeer,
    ) -> Result<Vec<String>, SignalError> {
        if let Some(channel) = self.channels.get_mut(&channel_id) {
            return channel.admit(peer);
        }

        let mut channel = Channel::new(channel_id.clone(), self.residents.clone());
        let online = channel.admit(peer)?;

        debug!(
            target: "sb.registry",
            channel_id = %channel_id,
            residents = self.residents.len(),
            "Channel created"
        );
        self.channels.insert(channel_id, channel);
        self.metrics.channel_created();
        Ok(online)
    }

    fn leave_channel(&mut self, nick: &str, channel_id: &str) {
        let Some(channel) = self.channels.get_mut(channel_id) else {
            debug!(
                target: "sb.registry",
                channel_id = %channel_id,
                nick = %nick,
                "Leave for unknown channel ignored"
            );
            return;
        };

        channel.remove(nick);

        if channel.is_empty() {
            channel.close();
            self.channels.remove(channel_id);
            self.metrics.channel_destroyed();
            debug!(
                target: "sb.registry",
                channel_id = %channel_id,
                "Channel emptied down to residents, destroyed"
            );
        }
    }

    fn channel_signal(
        &mut self,
        channel_id: &str,
        sender: &str,
        kind: ChannelSignalKind,
        signal: AddressedSignal,
    ) {
        let Some(channel) = self.channels.get(channel_id) else {
            self.metrics.record_signal_dropped();
            error!(
                target: "sb.registry",
                channel_id = %channel_id,
                sender = %sender,
                message_type = kind.as_str(),
                "Dropping signal for unknown channel"
            );
            return;
        };

        if channel.route(sender, kind, signal) {
            self.metrics.record_signal_routed();
        } else {
            self.metrics.record_signal_dropped();
        }
    }

    fn status(&self) -> RegistryStatus {
        RegistryStatus {
            online_endpoints: self.online.len(),
            conversations: self.conversations.len(),
            channels: self.channels.len(),
            mailbox_depth: self.mailbox.current_depth(),
            started_at: self.started_at,
        }
    }
}
