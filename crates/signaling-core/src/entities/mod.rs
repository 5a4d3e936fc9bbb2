//! Routing entities owned by the registry actor.
//!
//! A [`Conversation`] is the ephemeral rendezvous point for one 1:1 call
//! attempt; a [`Channel`] is a long-lived N-party room seeded with resident
//! members. Both are plain structs living inside the registry actor's state,
//! mutated only from its mailbox loop. Endpoints never hold references to
//! them, only ids.

pub mod channel;
pub mod conversation;

pub use channel::Channel;
pub use conversation::Conversation;
