//! Outbound frame sinks.
//!
//! The transport layer drains the receiving half and writes each frame to
//! the socket; the endpoint only ever sees the typed sender side. A closed
//! sink means the client is gone and ends the endpoint task.

use signaling_protocol::codec::{self, CodecError};
use signaling_protocol::envelope::{CallOutbound, ChannelOutbound};
use thiserror::Error;
use tokio::sync::mpsc;

/// The client connection is gone.
#[derive(Debug, Error)]
#[error("client connection closed")]
pub struct SinkClosed;

/// Typed outbound frame sink for a call endpoint.
#[derive(Debug, Clone)]
pub struct CallSink {
    tx: mpsc::Sender<String>,
}

impl CallSink {
    /// Create a sink and the raw-frame receiver the transport drains.
    #[must_use]
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }

    /// Encode and queue a frame for the client.
    ///
    /// # Errors
    ///
    /// Returns [`SinkClosed`] if the transport dropped the receiver.
    pub async fn send(&self, frame: &CallOutbound) -> Result<(), SinkClosed> {
        match encode_or_skip(codec::encode_call_outbound(frame)) {
            Some(raw) => self.tx.send(raw).await.map_err(|_| SinkClosed),
            None => Ok(()),
        }
    }
}

/// Typed outbound frame sink for a channel endpoint.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<String>,
}

impl ChannelSink {
    /// Create a sink and the raw-frame receiver the transport drains.
    #[must_use]
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }

    /// Encode and queue a frame for the client.
    ///
    /// # Errors
    ///
    /// Returns [`SinkClosed`] if the transport dropped the receiver.
    pub async fn send(&self, frame: &ChannelOutbound) -> Result<(), SinkClosed> {
        match encode_or_skip(codec::encode_channel_outbound(frame)) {
            Some(raw) => self.tx.send(raw).await.map_err(|_| SinkClosed),
            None => Ok(()),
        }
    }
}

// Serializing our own outbound enums cannot fail in practice; if it ever
// does, drop the frame rather than tearing the connection down.
fn encode_or_skip(result: Result<String, CodecError>) -> Option<String> {
    match result {
        Ok(raw) => Some(raw),
        Err(err) => {
            tracing::error!(
                target: "sb.endpoint.sink",
                error = %err,
                "Failed to encode outbound frame"
            );
            None
        }
    }
}
