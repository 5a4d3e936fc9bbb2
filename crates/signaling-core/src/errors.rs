//! Signaling core error types.
//!
//! Every variant is recovered at the endpoint/registry boundary; none of
//! them terminates a connection task. `DuplicateIdentity` is the one error
//! the transport layer is expected to act on (refuse or close the stream).

use crate::collaborators::CollaboratorError;
use signaling_protocol::envelope::CallId;
use thiserror::Error;

/// Signaling core error type.
#[derive(Debug, Error)]
pub enum SignalError {
    /// Message type not valid in the endpoint's current state.
    /// Logged and dropped; the connection stays open.
    #[error("Protocol violation: {message_type} not valid in state {state}")]
    ProtocolViolation {
        state: &'static str,
        message_type: &'static str,
    },

    /// Login with a nickname that is already online. The original
    /// registration is retained; rejecting the stream is the transport's
    /// decision.
    #[error("Duplicate identity: {0}")]
    DuplicateIdentity(String),

    /// Addressed recipient is not present. Logged and dropped; the sender
    /// receives no explicit error.
    #[error("Unknown recipient: {0}")]
    UnknownRecipient(String),

    /// ACCEPT/REFUSE against a call id that no longer exists. The actor is
    /// waiting, so this must produce an observable CANCELLED reply.
    #[error("Call {0} no longer exists")]
    StaleCall(CallId),

    /// A third party tried to join a 1:1 conversation. Fails closed.
    #[error("Conversation {0} is full")]
    ConversationFull(CallId),

    /// Identity is not an authorized member of the channel. Surfaced to the
    /// client as REFUSED.
    #[error("{identity} is not an authorized member of channel {channel_id}")]
    Unauthorized {
        identity: String,
        channel_id: String,
    },

    /// A collaborator call (directory lookup, push delivery) failed.
    /// Treated as a call/join refusal outcome, never a crash.
    #[error("Collaborator failure: {0}")]
    Collaborator(#[from] CollaboratorError),

    /// Registry mailbox send/receive failed (actor gone during shutdown).
    #[error("Registry unavailable: {0}")]
    Registry(String),
}

impl SignalError {
    /// Message safe to show a client. Identities, call ids and
    /// collaborator details stay in the logs.
    #[must_use]
    pub fn client_message(&self) -> &'static str {
        match self {
            SignalError::ProtocolViolation { .. } => "message not valid in current state",
            SignalError::DuplicateIdentity(_) => "identity already online",
            SignalError::UnknownRecipient(_) => "recipient unknown",
            SignalError::StaleCall(_) => "call no longer exists",
            SignalError::ConversationFull(_) => "call is full",
            SignalError::Unauthorized { .. } => "not a member of this channel",
            SignalError::Collaborator(_) => "temporary service failure",
            SignalError::Registry(_) => "service unavailable",
        }
    }
}
