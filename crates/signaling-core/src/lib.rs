//! Switchboard Signaling Core
//!
//! This library implements the real-time signaling core for WebRTC-style
//! calling and multi-party channels: it tracks each connected client as a
//! per-connection state machine and routes call-setup/control and
//! session-description/ICE messages between the correct parties.
//!
//! # Architecture
//!
//! ```text
//! RegistryActor (singleton per process)
//! ├── owns the online-endpoint directory (nick -> peer handle)
//! ├── owns all Conversations (1:1 calls, ephemeral)
//! └── owns all Channels (N-party rooms, may hold resident bot members)
//!
//! CallEndpoint / ChannelEndpoint (one per connection, driven by the
//! connection task)
//! ├── dispatch inbound messages via a (state, message-kind) table
//! ├── talk to the registry through RegistryHandle (mpsc + oneshot)
//! └── receive routed traffic on a notice mailbox, in arrival order
//! ```
//!
//! # Key Design Decisions
//!
//! - **Single serialized owner**: all directory and membership mutation
//!   happens inside the registry actor task, so read-check-create for a
//!   channel id is atomic and a membership check can never race a destroy.
//! - **Handles, not references**: endpoints store only opaque ids for their
//!   current conversation/channel and resolve them through the registry;
//!   there are no entity-to-endpoint reference cycles to tear down.
//! - **Collaborators stay at the edge**: push-token lookup, channel
//!   authorization and push delivery run in the endpoint's own task, so a
//!   slow collaborator never stalls routing of established sessions.
//! - **Nothing is fatal**: unexpected messages are logged and dropped; the
//!   only thing that ends a connection task is the transport closing.
//!
//! # Modules
//!
//! - [`actors`] - registry actor, its message set and mailbox metrics
//! - [`collaborators`] - async traits the core consumes (directory, push)
//! - [`config`] - configuration from environment
//! - [`endpoint`] - per-connection state machines (call + channel variants)
//! - [`entities`] - routing entities (Conversation, Channel)
//! - [`errors`] - error taxonomy

pub mod actors;
pub mod collaborators;
pub mod config;
pub mod endpoint;
pub mod entities;
pub mod errors;

// The fakes in signaling-test-utils implement this crate's collaborator
// traits, but `cargo test --lib` compiles a second, `cfg(test)` instance of
// this crate whose traits are distinct from the ones the rlib linked by
// signaling-test-utils exposes; the casts in the endpoint unit tests would
// fail with E0277. Compile the same fakes source directly into the test
// build so they implement the test build's traits. The self-alias lets that
// shared source keep its `signaling_core::` imports.
#[cfg(test)]
extern crate self as signaling_core;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[path = "../../signaling-test-utils/src/fakes.rs"]
mod test_fakes;
