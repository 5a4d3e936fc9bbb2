//! Typed message sets for the call and channel protocols.
//!
//! Message type tags and payload field names match the wire format the
//! mobile clients already speak (`call_id`, `channelId`, `toUser`,
//! `fromUser`, ...). Inbound and outbound sets are separate enums so a
//! handler can never accidentally echo a server-only message back out.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque call identifier, generated per call attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(pub String);

impl CallId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ----------------------------------------------------------------------------
// Call protocol
// ----------------------------------------------------------------------------

/// Messages a call client sends to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum CallInbound {
    /// Log in under a nickname. First message on a call stream.
    #[serde(rename = "LOGIN")]
    Login { nick: String },

    /// Initiate a call to another user.
    #[serde(rename = "CALL")]
    Call { to: String },

    /// Accept an incoming call previously announced via push.
    #[serde(rename = "ACCEPT")]
    Accept { to: String, call_id: CallId },

    /// Refuse an incoming call.
    #[serde(rename = "REFUSE")]
    Refuse { to: String, call_id: CallId },

    /// Cancel an outgoing call before the callee answers.
    #[serde(rename = "CANCEL")]
    Cancel {},

    /// Hang up an established call.
    #[serde(rename = "HANGUP")]
    Hangup {},

    /// Opaque session description offer; forwarded verbatim.
    #[serde(rename = "OFFER")]
    Offer(Value),

    /// Opaque session description answer; forwarded verbatim.
    #[serde(rename = "ANSWER")]
    Answer(Value),

    /// Opaque ICE candidate; forwarded verbatim.
    #[serde(rename = "ICE_CANDIDATE")]
    Ice(Value),
}

/// Messages the server sends to a call client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum CallOutbound {
    /// The callee accepted; `from` is the accepting party.
    #[serde(rename = "ACCEPTED")]
    Accepted { from: String },

    /// The callee refused; `from` is the refusing party.
    #[serde(rename = "REFUSED")]
    Refused { from: String },

    /// The referenced call no longer exists (cancelled or superseded).
    #[serde(rename = "CANCELLED")]
    Cancelled {},

    /// The other party hung up.
    #[serde(rename = "HUNG_UP")]
    HungUp { from: String, call_id: CallId },

    /// Forwarded offer from the other call member.
    #[serde(rename = "OFFER")]
    Offer(Value),

    /// Forwarded answer from the other call member.
    #[serde(rename = "ANSWER")]
    Answer(Value),

    /// Forwarded ICE candidate from the other call member.
    #[serde(rename = "ICE_CANDIDATE")]
    Ice(Value),
}

/// Incoming-call announcement.
///
/// Delivered through the push gateway only, never on the signaling
/// stream - the callee has no live connection yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingCall {
    pub caller: String,
    pub call_id: CallId,
}

/// Discriminant of a [`CallInbound`] message, used as a dispatch-table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallInboundKind {
    Login,
    Call,
    Accept,
    Refuse,
    Cancel,
    Hangup,
    Offer,
    Answer,
    Ice,
}

impl CallInboundKind {
    /// Wire-level type tag, for logging.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            CallInboundKind::Login => "LOGIN",
            CallInboundKind::Call => "CALL",
            CallInboundKind::Accept => "ACCEPT",
            CallInboundKind::Refuse => "REFUSE",
            CallInboundKind::Cancel => "CANCEL",
            CallInboundKind::Hangup => "HANGUP",
            CallInboundKind::Offer => "OFFER",
            CallInboundKind::Answer => "ANSWER",
            CallInboundKind::Ice => "ICE_CANDIDATE",
        }
    }
}

impl CallInbound {
    /// Discriminant of this message.
    #[must_use]
    pub const fn kind(&self) -> CallInboundKind {
        match self {
            CallInbound::Login { .. } => CallInboundKind::Login,
            CallInbound::Call { .. } => CallInboundKind::Call,
            CallInbound::Accept { .. } => CallInboundKind::Accept,
            CallInbound::Refuse { .. } => CallInboundKind::Refuse,
            CallInbound::Cancel {} => CallInboundKind::Cancel,
            CallInbound::Hangup {} => CallInboundKind::Hangup,
            CallInbound::Offer(_) => CallInboundKind::Offer,
            CallInbound::Answer(_) => CallInboundKind::Answer,
            CallInbound::Ice(_) => CallInboundKind::Ice,
        }
    }
}

// ----------------------------------------------------------------------------
// Channel protocol
// ----------------------------------------------------------------------------

/// An addressed signal inside a channel, as sent by a client.
///
/// `toUser` names the single recipient; everything else is opaque and is
/// carried through unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressedSignal {
    #[serde(rename = "toUser")]
    pub to_user: String,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

/// An addressed signal as delivered to the recipient: the `toUser` marker
/// is stripped and `fromUser` is stamped with the sender's identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveredSignal {
    #[serde(rename = "fromUser")]
    pub from_user: String,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl AddressedSignal {
    /// Re-address this signal for delivery, stamping the sender identity.
    #[must_use]
    pub fn deliver_from(self, sender: &str) -> DeliveredSignal {
        DeliveredSignal {
            from_user: sender.to_string(),
            body: self.body,
        }
    }
}

/// Messages a channel client sends to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ChannelInbound {
    /// Join a channel. First message on a channel stream.
    #[serde(rename = "JOIN")]
    Join {
        #[serde(rename = "channelId")]
        channel_id: String,
    },

    /// Leave the channel.
    #[serde(rename = "LEAVE")]
    Leave {},

    /// Addressed offer for one named channel member.
    #[serde(rename = "OFFER")]
    Offer(AddressedSignal),

    /// Addressed answer for one named channel member.
    #[serde(rename = "ANSWER")]
    Answer(AddressedSignal),

    /// Addressed ICE candidate for one named channel member.
    #[serde(rename = "ICE_CANDIDATE")]
    Ice(AddressedSignal),
}

/// Messages the server sends to a channel client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ChannelOutbound {
    /// Join succeeded; lists everyone currently online in the channel.
    #[serde(rename = "ACCEPTED")]
    Accepted { online: Vec<String> },

    /// Join refused (not an authorized member).
    #[serde(rename = "REFUSED")]
    Refused {},

    /// Another member joined.
    #[serde(rename = "JOINED")]
    Joined { who: String },

    /// Another member left.
    #[serde(rename = "LEFT")]
    Left { who: String },

    /// Delivered offer from a named member.
    #[serde(rename = "OFFER")]
    Offer(DeliveredSignal),

    /// Delivered answer from a named member.
    #[serde(rename = "ANSWER")]
    Answer(DeliveredSignal),

    /// Delivered ICE candidate from a named member.
    #[serde(rename = "ICE_CANDIDATE")]
    Ice(DeliveredSignal),
}

/// Discriminant of a [`ChannelInbound`] message, used as a dispatch-table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelInboundKind {
    Join,
    Leave,
    Offer,
    Answer,
    Ice,
}

impl ChannelInboundKind {
    /// Wire-level type tag, for logging.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ChannelInboundKind::Join => "JOIN",
            ChannelInboundKind::Leave => "LEAVE",
            ChannelInboundKind::Offer => "OFFER",
            ChannelInboundKind::Answer => "ANSWER",
            ChannelInboundKind::Ice => "ICE_CANDIDATE",
        }
    }
}

impl ChannelInbound {
    /// Discriminant of this message.
    #[must_use]
    pub const fn kind(&self) -> ChannelInboundKind {
        match self {
            ChannelInbound::Join { .. } => ChannelInboundKind::Join,
            ChannelInbound::Leave {} => ChannelInboundKind::Leave,
            ChannelInbound::Offer(_) => ChannelInboundKind::Offer,
            ChannelInbound::Answer(_) => ChannelInboundKind::Answer,
            ChannelInbound::Ice(_) => ChannelInboundKind::Ice,
        }
    }
}
