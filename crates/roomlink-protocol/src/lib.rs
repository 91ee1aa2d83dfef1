//! Wire protocol between a host page and an embedded meeting app.
//!
//! The two sides exchange [`Envelope`]s over a window-messaging channel:
//!
//! ```text
//! { "command": string, "payload": any, "correlationId": string }
//! ```
//!
//! The correlation id is the meeting alias. Both sides drop envelopes that
//! carry somebody else's id, which keeps two embedded rooms on one page from
//! seeing each other's traffic.
//!
//! # Requests and replies
//!
//! A request is an ordinary envelope whose payload carries a fresh
//! `requestId`. The answer comes back under the reply command
//! `re:<command>:<requestId>`; a truthy `error` field in the reply payload
//! marks a failure.
//!
//! ```rust
//! use roomlink_protocol::{reply_command, with_request_id, RoomCommand};
//!
//! let (command, payload) = RoomCommand::block_participant("abc").into_parts().unwrap();
//! let payload = with_request_id(payload, "r1").unwrap();
//! assert_eq!(payload["id"], "abc");
//! assert_eq!(reply_command(command, "r1"), "re:blockParticipant:r1");
//! ```

mod codec;
mod commands;
mod error;
mod types;

pub use codec::{clone_message, decode_message, encode_message};
pub use commands::{COMMANDS, CommandSpec, RoomCommand, command_spec};
pub use error::{ProtocolError, ProtocolResult, json_type_name};
pub use serde_json::Value;
pub use types::{
    APP_READY_COMMAND, DomainEvent, ERROR_FIELD, EVENT_COMMAND, Envelope, INITIALIZE_COMMAND,
    LEAVE_COMMAND, REPLY_PREFIX, REQUEST_ID_FIELD, is_truthy, parse_reply_command,
    reply_command, reply_error, request_id_of, with_request_id,
};

/// Maximum encoded message size (1 MB).
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;
