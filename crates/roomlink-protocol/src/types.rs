//! Envelope, reserved command names and payload helpers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ProtocolError, ProtocolResult};

/// Carrier command for domain events (child → host).
pub const EVENT_COMMAND: &str = "event";

/// Sent once by the host when the handshake starts.
pub const INITIALIZE_COMMAND: &str = "initialize";

/// Sent by the child to acknowledge `initialize`.
pub const APP_READY_COMMAND: &str = "app:ready";

/// Asks the child to leave the meeting.
pub const LEAVE_COMMAND: &str = "leave";

/// Prefix of every reply command.
pub const REPLY_PREFIX: &str = "re";

/// Field injected into request payloads to carry the request id.
pub const REQUEST_ID_FIELD: &str = "requestId";

/// Field of a reply payload that turns the reply into a rejection.
pub const ERROR_FIELD: &str = "error";

/// Unit of transport between the two contexts.
///
/// On the wire: `{ "command": ..., "payload": ..., "correlationId": ... }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Command name; handlers are looked up by it.
    pub command: String,
    /// Arbitrary JSON payload.
    #[serde(default)]
    pub payload: Value,
    /// Session identifier shared by both sides.
    pub correlation_id: String,
}

impl Envelope {
    /// Creates an envelope.
    pub fn new(
        command: impl Into<String>,
        payload: Value,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            command: command.into(),
            payload,
            correlation_id: correlation_id.into(),
        }
    }

    /// Decodes an envelope from raw message data.
    pub fn from_value(data: Value) -> ProtocolResult<Self> {
        if !data.is_object() {
            return Err(ProtocolError::MalformedEnvelope(format!(
                "expected an object, found {}",
                crate::error::json_type_name(&data)
            )));
        }
        serde_json::from_value(data).map_err(|e| ProtocolError::MalformedEnvelope(e.to_string()))
    }

    /// Encodes the envelope as message data.
    pub fn to_value(&self) -> ProtocolResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Returns true if the envelope belongs to the given session.
    pub fn is_for(&self, correlation_id: &str) -> bool {
        self.correlation_id == correlation_id
    }
}

/// Builds the reply command for a request: `re:<command>:<request_id>`.
pub fn reply_command(command: &str, request_id: &str) -> String {
    format!("{REPLY_PREFIX}:{command}:{request_id}")
}

/// Splits a reply command into `(command, request_id)`.
///
/// Command names may themselves contain `:` (`app:ready`), request ids may
/// not, so the id is everything after the last separator.
pub fn parse_reply_command(name: &str) -> Option<(&str, &str)> {
    let rest = name.strip_prefix(REPLY_PREFIX)?.strip_prefix(':')?;
    let (command, request_id) = rest.rsplit_once(':')?;
    if command.is_empty() || request_id.is_empty() {
        return None;
    }
    Some((command, request_id))
}

/// Returns the payload of a request with the request id merged in.
///
/// `null` is treated as an empty object. The id wins over a payload field of
/// the same name.
pub fn with_request_id(payload: Value, request_id: &str) -> ProtocolResult<Value> {
    let mut fields = match payload {
        Value::Null => Map::new(),
        Value::Object(fields) => fields,
        other => return Err(ProtocolError::not_object(&other)),
    };
    fields.insert(
        REQUEST_ID_FIELD.to_string(),
        Value::String(request_id.to_string()),
    );
    Ok(Value::Object(fields))
}

/// Extracts the request id from an inbound request payload.
pub fn request_id_of(payload: &Value) -> Option<&str> {
    payload.get(REQUEST_ID_FIELD).and_then(Value::as_str)
}

/// Returns the reply's `error` field when it is set to a truthy value.
pub fn reply_error(payload: &Value) -> Option<&Value> {
    payload.get(ERROR_FIELD).filter(|error| is_truthy(error))
}

/// JavaScript truthiness of a JSON value.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// A domain event published by the embedded app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    /// Event name, e.g. `participantJoined`.
    pub event_name: String,
    /// Event-specific data.
    #[serde(default)]
    pub payload: Value,
}

impl DomainEvent {
    /// Creates an event.
    pub fn new(event_name: impl Into<String>, payload: Value) -> Self {
        Self {
            event_name: event_name.into(),
            payload,
        }
    }

    /// Decodes the payload of an `event` command.
    pub fn from_value(value: Value) -> ProtocolResult<Self> {
        serde_json::from_value(value).map_err(|e| ProtocolError::MalformedEnvelope(e.to_string()))
    }

    /// The object delivered to listeners of the event's own name:
    /// `{ "type": <name>, ...payload }`.
    ///
    /// Payload fields are applied after `type`, so a payload `type` field
    /// wins. A non-object payload is carried under `payload`.
    pub fn named_payload(&self) -> Value {
        let mut fields = Map::new();
        fields.insert("type".to_string(), Value::String(self.event_name.clone()));
        match &self.payload {
            Value::Null => {}
            Value::Object(payload) => {
                for (key, value) in payload {
                    fields.insert(key.clone(), value.clone());
                }
            }
            other => {
                fields.insert("payload".to_string(), other.clone());
            }
        }
        Value::Object(fields)
    }

    /// The object delivered to wildcard listeners: `{ eventName, payload }`.
    pub fn wildcard_payload(&self) -> Value {
        let mut fields = Map::new();
        fields.insert(
            "eventName".to_string(),
            Value::String(self.event_name.clone()),
        );
        fields.insert("payload".to_string(), self.payload.clone());
        Value::Object(fields)
    }
}
