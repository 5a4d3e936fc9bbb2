//! Collaborator interfaces consumed by the core.
//!
//! The core depends on exactly two external services: a directory that
//! answers authorization and push-reachability questions, and a push
//! gateway that announces incoming calls to clients without a live
//! connection. Storage schema, HTTP transport and credential handling all
//! live behind these traits.
//!
//! Collaborator calls are made from endpoint tasks only, never from inside
//! the registry actor, so a slow collaborator suspends one connection and
//! nothing else.

use async_trait::async_trait;
use signaling_protocol::envelope::IncomingCall;
use thiserror::Error;

/// Opaque push-delivery target for a user (e.g. an FCM token).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushToken(pub String);

/// A collaborator call failed. Always treated as a refusal outcome for the
/// operation in flight; never crashes the connection handler.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

/// Directory/authorization service.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Whether `identity` is a permitted member of `channel_id`.
    async fn is_authorized_member(
        &self,
        identity: &str,
        channel_id: &str,
    ) -> Result<bool, CollaboratorError>;

    /// Resolve the push target registered for `identity`, if any.
    async fn resolve_push_target(
        &self,
        identity: &str,
    ) -> Result<Option<PushToken>, CollaboratorError>;
}

/// Push delivery gateway. Best-effort: a failure means the callee is
/// unreachable, nothing more.
#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Announce an incoming call to the holder of `token`.
    async fn push_incoming_call(
        &self,
        token: &PushToken,
        incoming: &IncomingCall,
    ) -> Result<(), CollaboratorError>;
}
