//! Payload codec
//!
//! MQTT already preserves message boundaries, so a payload is exactly one
//! protobuf message with no framing.

use bytes::Bytes;
use prost::Message;
use thiserror::Error;

/// Maximum payload size (10 MB) to prevent memory exhaustion
pub const MAX_PAYLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Payload too large: {0} bytes (max: {MAX_PAYLOAD_SIZE})")]
    PayloadTooLarge(usize),

    #[error("Protobuf decode error: {0}")]
    DecodeError(#[from] prost::DecodeError),
}

/// Encode a message into a payload
pub fn encode<M: Message>(message: &M) -> Result<Bytes, CodecError> {
    let len = message.encoded_len();
    if len > MAX_PAYLOAD_SIZE {
        return Err(CodecError::PayloadTooLarge(len));
    }
    Ok(Bytes::from(message.encode_to_vec()))
}

/// Decode a payload into a message
pub fn decode<M: Message + Default>(payload: &[u8]) -> Result<M, CodecError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(CodecError::PayloadTooLarge(payload.len()));
    }
    Ok(M::decode(payload)?)
}
