//! Message types for registry communication.
//!
//! All traffic between endpoint tasks and the registry actor is
//! strongly-typed message passing via `tokio::sync::mpsc`. Request-reply
//! operations carry a `tokio::sync::oneshot` response channel. Routed
//! signaling traffic is fire-and-forget: delivery failure is the
//! recipient's local fault, not the sender's error.

use crate::actors::metrics::{ActorType, MailboxMonitor};
use crate::errors::SignalError;
use signaling_protocol::envelope::{AddressedSignal, CallId, CallOutbound, ChannelOutbound};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Routing handle for one connected call endpoint.
///
/// The registry and conversations hold this to reach the endpoint; the
/// receiving half lives with the endpoint's connection task, which applies
/// notices strictly in arrival order.
#[derive(Debug, Clone)]
pub struct CallPeer {
    /// Endpoint identity (login nickname).
    pub nick: String,
    tx: mpsc::Sender<CallNotice>,
    monitor: Arc<MailboxMonitor>,
}

impl CallPeer {
    /// Create a peer handle around the endpoint's notice mailbox.
    #[must_use]
    pub fn new(nick: impl Into<String>, tx: mpsc::Sender<CallNotice>) -> Self {
        let nick = nick.into();
        let monitor = Arc::new(MailboxMonitor::new(ActorType::Endpoint, &nick));
        Self { nick, tx, monitor }
    }

    /// The mailbox monitor; the endpoint records dequeues against it.
    #[must_use]
    pub fn monitor(&self) -> Arc<MailboxMonitor> {
        Arc::clone(&self.monitor)
    }

    /// Queue a notice without blocking. A full or closed mailbox drops the
    /// notice; that is the recipient's local fault, never the sender's.
    pub fn notify(&self, notice: CallNotice) -> bool {
        match self.tx.try_send(notice) {
            Ok(()) => {
                self.monitor.record_enqueue();
                true
            }
            Err(_) => {
                self.monitor.record_drop();
                false
            }
        }
    }
}

/// Routing handle for one connected channel endpoint (or resident bot).
#[derive(Debug, Clone)]
pub struct ChannelPeer {
    /// Endpoint identity.
    pub nick: String,
    tx: mpsc::Sender<ChannelNotice>,
    monitor: Arc<MailboxMonitor>,
}

impl ChannelPeer {
    /// Create a peer handle around the endpoint's notice mailbox.
    #[must_use]
    pub fn new(nick: impl Into<String>, tx: mpsc::Sender<ChannelNotice>) -> Self {
        let nick = nick.into();
        let monitor = Arc::new(MailboxMonitor::new(ActorType::Endpoint, &nick));
        Self { nick, tx, monitor }
    }

    /// The mailbox monitor; the endpoint records dequeues against it.
    #[must_use]
    pub fn monitor(&self) -> Arc<MailboxMonitor> {
        Arc::clone(&self.monitor)
    }

    /// Queue a notice without blocking. A full or closed mailbox drops the
    /// notice; that is the recipient's local fault, never the sender's.
    pub fn notify(&self, notice: ChannelNotice) -> bool {
        match self.tx.try_send(notice) {
            Ok(()) => {
                self.monitor.record_enqueue();
                true
            }
            Err(_) => {
                self.monitor.record_drop();
                false
            }
        }
    }
}

/// Notices delivered to a call endpoint's mailbox.
#[derive(Debug)]
pub enum CallNotice {
    /// The callee accepted our outgoing call.
    Accepted { from: String },
    /// The callee refused our outgoing call.
    Refused { from: String },
    /// Routed traffic to forward to the client verbatim
    /// (OFFER/ANSWER/ICE_CANDIDATE/HUNG_UP).
    Forward(CallOutbound),
}

/// Notices delivered to a channel endpoint's mailbox.
#[derive(Debug, Clone)]
pub enum ChannelNotice {
    /// Routed traffic to forward to the client verbatim.
    Deliver(ChannelOutbound),
    /// The channel was torn down. Sent to resident members, which never
    /// leave on their own; interactive endpoints may also observe it when
    /// a disconnect races the teardown.
    Closed { channel_id: String },
}

/// Kind of an addressed in-channel signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSignalKind {
    Offer,
    Answer,
    Ice,
}

impl ChannelSignalKind {
    /// Wire-level type tag, for logging.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ChannelSignalKind::Offer => "OFFER",
            ChannelSignalKind::Answer => "ANSWER",
            ChannelSignalKind::Ice => "ICE_CANDIDATE",
        }
    }
}

/// Messages sent to the `RegistryActor`.
#[derive(Debug)]
pub enum RegistryMessage {
    /// Register a logged-in call endpoint in the online directory.
    /// Fails with `DuplicateIdentity` if the nick is already online.
    Register {
        peer: CallPeer,
        respond_to: oneshot::Sender<Result<(), SignalError>>,
    },

    /// Remove a call endpoint from the online directory.
    Unregister { nick: String },

    /// Create a Conversation for a new call attempt. The caller becomes
    /// its first member.
    StartCall {
        caller: String,
        callee: String,
        respond_to: oneshot::Sender<Result<CallId, SignalError>>,
    },

    /// Join the callee into an existing Conversation and notify the
    /// caller. Fails with `StaleCall` if the call id is already gone.
    AcceptCall {
        callee: String,
        caller: String,
        call_id: CallId,
        respond_to: oneshot::Sender<Result<(), SignalError>>,
    },

    /// Notify the caller of refusal and tear the Conversation down.
    /// Fails with `StaleCall` if the call id is already gone.
    RefuseCall {
        callee: String,
        caller: String,
        call_id: CallId,
        respond_to: oneshot::Sender<Result<(), SignalError>>,
    },

    /// Destroy a Conversation before the callee answered.
    CancelCall { call_id: CallId, by: String },

    /// Leave a Conversation; the remaining member (if any) is notified
    /// HUNG_UP, an emptied Conversation is destroyed.
    Hangup { nick: String, call_id: CallId },

    /// Forward opaque signaling traffic to the other Conversation member.
    CallSignal {
        call_id: CallId,
        sender: String,
        message: CallOutbound,
    },

    /// Bind an endpoint into a Channel, creating it (seeded with resident
    /// members) if the id is not present. Responds with the online list.
    JoinChannel {
        channel_id: String,
        peer: ChannelPeer,
        respond_to: oneshot::Sender<Result<Vec<String>, SignalError>>,
    },

    /// Remove an endpoint from a Channel; remaining occupants receive
    /// LEFT, a Channel emptied down to its residents is destroyed.
    LeaveChannel { nick: String, channel_id: String },

    /// Deliver an addressed signal to one named channel member.
    ChannelSignal {
        channel_id: String,
        sender: String,
        kind: ChannelSignalKind,
        signal: AddressedSignal,
    },

    /// Connection-close hook: unregister and tear down any membership the
    /// endpoint still holds. Distinct from HANGUP/LEAVE, which are client
    /// messages; an abrupt disconnect sends nothing.
    Disconnect {
        nick: String,
        call_id: Option<CallId>,
        channel_id: Option<String>,
    },

    /// Get a snapshot of registry occupancy (health/debugging).
    GetStatus {
        respond_to: oneshot::Sender<RegistryStatus>,
    },
}

/// Snapshot of registry occupancy.
#[derive(Debug, Clone)]
pub struct RegistryStatus {
    /// Endpoints currently in the online directory.
    pub online_endpoints: usize,
    /// Active 1:1 conversations.
    pub conversations: usize,
    /// Active channels.
    pub channels: usize,
    /// Current registry mailbox depth.
    pub mailbox_depth: usize,
    /// Unix timestamp the registry started at.
    pub started_at: i64,
}
