//! Wire protocol for Switchboard signaling.
//!
//! This crate defines the JSON message envelope exchanged with clients over
//! a persistent bidirectional stream. Every message is one logical event:
//!
//! ```text
//! { "type": "<MESSAGE TYPE>", "payload": { ... } }
//! ```
//!
//! There is no multiplexing or batching. Two independent message sets share
//! the envelope: the call protocol (1:1 calls) and the channel protocol
//! (multi-party rooms). Session descriptions and ICE candidates are opaque
//! payloads; this crate never inspects them.

pub mod codec;
pub mod envelope;
