//! Encoding and decoding of signaling envelopes.
//!
//! One text frame on the stream is one JSON envelope. Decoding rejects
//! anything that is not a known `(type, payload)` combination; the caller
//! decides whether that is a protocol violation or a transport fault.

use crate::envelope::{CallInbound, CallOutbound, ChannelInbound, ChannelOutbound};

/// Error type for envelope codec operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The frame is not a well-formed envelope for this message set.
    #[error("Malformed envelope: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        CodecError::Malformed(err.to_string())
    }
}

/// Decode a call-protocol frame received from a client.
///
/// # Errors
///
/// Returns [`CodecError::Malformed`] if the frame is not a known call
/// message.
pub fn decode_call_inbound(frame: &str) -> Result<CallInbound, CodecError> {
    Ok(serde_json::from_str(frame)?)
}

/// Encode a call-protocol frame for delivery to a client.
///
/// # Errors
///
/// Returns [`CodecError::Malformed`] if the message cannot be serialized
/// (opaque payloads containing non-JSON values).
pub fn encode_call_outbound(message: &CallOutbound) -> Result<String, CodecError> {
    Ok(serde_json::to_string(message)?)
}

/// Decode a channel-protocol frame received from a client.
///
/// # Errors
///
/// Returns [`CodecError::Malformed`] if the frame is not a known channel
/// message.
pub fn decode_channel_inbound(frame: &str) -> Result<ChannelInbound, CodecError> {
    Ok(serde_json::from_str(frame)?)
}

/// Encode a channel-protocol frame for delivery to a client.
///
/// # Errors
///
/// Returns [`CodecError::Malformed`] if the message cannot be serialized.
pub fn encode_channel_outbound(message: &ChannelOutbound) -> Result<String, CodecError> {
    Ok(serde_json::to_string(message)?)
}
