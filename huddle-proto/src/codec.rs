//! JSON encoding of [`ChatMessage`] bodies.

use crate::message::ChatMessage;

/// Error type for body encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encodes a [`ChatMessage`] as a JSON string.
///
/// # Errors
///
/// Returns `CodecError::Json` if the message cannot be serialized.
pub fn encode(message: &ChatMessage) -> Result<String, CodecError> {
    Ok(serde_json::to_string(message)?)
}

/// Decodes a [`ChatMessage`] from a JSON string.
///
/// Unknown fields are ignored so brokers can add metadata freely.
///
/// # Errors
///
/// Returns `CodecError::Json` for malformed JSON, a missing required field or
/// an unknown `type`.
pub fn decode(body: &str) -> Result<ChatMessage, CodecError> {
    Ok(serde_json::from_str(body)?)
}
