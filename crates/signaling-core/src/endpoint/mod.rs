//! Per-connection endpoint state machines.
//!
//! One endpoint exists per client connection, owned by that connection's
//! task. An endpoint consumes raw frames from the transport and notices
//! from the registry, consults a declarative `(state, message kind)`
//! dispatch table, and emits outbound frames through its sink. Unexpected
//! input is logged and dropped; an endpoint task ends when the transport
//! closes or a frame comes back with [`FrameOutcome::Close`].

pub mod call;
pub mod channel;
pub mod sink;

pub use call::{CallEndpoint, CallState, FrameOutcome};
pub use channel::{ChannelEndpoint, ChannelState};
pub use sink::{CallSink, ChannelSink, SinkClosed};
