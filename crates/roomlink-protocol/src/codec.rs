//! JSON encoding of envelopes for transports that move bytes.
//!
//! In-process windows hand each other owned copies of the message data, the
//! way a structured clone would. [`clone_message`] does that by encoding to
//! bytes and decoding again, which also enforces [`MAX_MESSAGE_SIZE`].

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::MAX_MESSAGE_SIZE;
use crate::error::{ProtocolError, ProtocolResult};

/// Encodes a message as JSON bytes.
///
/// # Example
///
/// ```rust
/// use roomlink_protocol::{encode_message, Envelope};
/// use serde_json::json;
///
/// let envelope = Envelope::new("getParticipants", json!({}), "meeting-1");
/// let bytes = encode_message(&envelope).unwrap();
/// assert!(bytes.starts_with(b"{"));
/// ```
pub fn encode_message<T: Serialize>(message: &T) -> ProtocolResult<Vec<u8>> {
    let json = serde_json::to_vec(message)?;

    if json.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: json.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }

    Ok(json)
}

/// Decodes a message from JSON bytes.
///
/// # Example
///
/// ```rust
/// use roomlink_protocol::{decode_message, encode_message, Envelope};
/// use serde_json::json;
///
/// let envelope = Envelope::new("getParticipants", json!({}), "meeting-1");
/// let bytes = encode_message(&envelope).unwrap();
/// let decoded: Envelope = decode_message(&bytes).unwrap();
/// assert_eq!(decoded.correlation_id, "meeting-1");
/// ```
pub fn decode_message<T: DeserializeOwned>(data: &[u8]) -> ProtocolResult<T> {
    if data.is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }

    if data.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: data.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }

    Ok(serde_json::from_slice(data)?)
}

/// Produces an independent copy of message data by round-tripping it
/// through its encoded form.
pub fn clone_message(data: &Value) -> ProtocolResult<Value> {
    let bytes = encode_message(data)?;
    decode_message(&bytes)
}
