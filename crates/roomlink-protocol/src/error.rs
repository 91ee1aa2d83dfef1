//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while shaping or decoding protocol messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Encoded message exceeds the maximum allowed size.
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Failed to convert a value to or from JSON.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Inbound data does not have the envelope shape.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// A payload that must be a JSON object was something else.
    #[error("payload must be a JSON object, found {found}")]
    PayloadNotObject { found: &'static str },

    /// Empty message received.
    #[error("empty message")]
    EmptyMessage,
}

impl ProtocolError {
    /// Creates a payload-shape error describing `value`.
    pub fn not_object(value: &serde_json::Value) -> Self {
        Self::PayloadNotObject {
            found: json_type_name(value),
        }
    }
}

/// Human-readable JSON type name, for error messages.
pub fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
