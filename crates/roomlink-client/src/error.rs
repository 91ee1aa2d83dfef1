//! Client error types.

use serde_json::Value;
use thiserror::Error;

use roomlink_core::MeetingUrlError;
use roomlink_protocol::ProtocolError;

use crate::room::RoomState;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for messenger operations.
pub type MessengerResult<T> = Result<T, MessengerError>;

/// Result type for room operations.
pub type RoomResult<T> = Result<T, RoomError>;

/// Result type returned by command handlers.
pub type HandlerResult = Result<(), HandlerError>;

/// Errors raised while posting a message.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The message could not be copied across the boundary.
    #[error("message could not be cloned: {0}")]
    Clone(#[from] ProtocolError),
}

/// Errors surfaced by the messenger.
#[derive(Debug, Error)]
pub enum MessengerError {
    /// Posting to the target failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The outbound message could not be shaped.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The remote side answered with an `error` field; carried verbatim.
    #[error("remote error: {0}")]
    Remote(Value),

    /// The messenger was stopped before the reply arrived.
    #[error("messenger stopped while waiting for {command}")]
    Disposed { command: String },

    /// No reply within the configured request timeout.
    #[error("request {command} timed out")]
    Timeout { command: String },
}

impl MessengerError {
    /// The remote error value, if this is a remote rejection.
    pub fn remote_error(&self) -> Option<&Value> {
        match self {
            Self::Remote(value) => Some(value),
            _ => None,
        }
    }
}

/// Error returned by a command handler. Logged, never propagated.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerError(String);

impl HandlerError {
    /// Creates a handler error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<ProtocolError> for HandlerError {
    fn from(err: ProtocolError) -> Self {
        Self(err.to_string())
    }
}

impl From<MessengerError> for HandlerError {
    fn from(err: MessengerError) -> Self {
        Self(err.to_string())
    }
}

/// The child frame failed to load.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to load {url}: {reason}")]
pub struct LoadError {
    /// URL the frame was navigated to.
    pub url: String,
    /// Platform-provided reason.
    pub reason: String,
}

impl LoadError {
    /// Creates a load error.
    pub fn new(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

/// The host environment refused to mount the child frame.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("host error: {0}")]
pub struct HostError(pub String);

/// Errors surfaced by [`Room`](crate::Room) operations.
#[derive(Debug, Error)]
pub enum RoomError {
    /// The app did not announce readiness in time.
    #[error("App initialization timeout")]
    InitializationTimeout,

    /// The child frame failed to load.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// The child frame could not be mounted.
    #[error(transparent)]
    Host(#[from] HostError),

    /// A messaging operation failed.
    #[error(transparent)]
    Messenger(#[from] MessengerError),

    /// The meeting URL is unusable.
    #[error("invalid meeting URL: {0}")]
    InvalidMeetingUrl(#[from] MeetingUrlError),

    /// The operation is not allowed in the current state.
    #[error("cannot {operation} while room is {state}")]
    InvalidState {
        operation: &'static str,
        state: RoomState,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl RoomError {
    /// The remote error value, if a command was rejected by the app.
    pub fn remote_error(&self) -> Option<&Value> {
        match self {
            Self::Messenger(err) => err.remote_error(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn timeout_message_is_exact() {
        assert_eq!(
            RoomError::InitializationTimeout.to_string(),
            "App initialization timeout"
        );
    }

    #[test]
    fn remote_error_is_reachable_through_room_error() {
        let err = RoomError::from(MessengerError::Remote(json!({"code": "forbidden"})));
        assert_eq!(err.remote_error(), Some(&json!({"code": "forbidden"})));
        assert!(RoomError::InitializationTimeout.remote_error().is_none());
    }

    #[test]
    fn invalid_state_names_the_state() {
        let err = RoomError::InvalidState {
            operation: "join",
            state: RoomState::Joined,
        };
        assert_eq!(err.to_string(), "cannot join while room is joined");
    }
}
