//! Host-side control of a meeting app embedded in a child frame.
//!
//! The pieces, leaf to root:
//!
//! - [`transport`]: window buses and postable targets.
//! - [`messenger`]: session-scoped commands, requests and replies.
//! - [`emitter`] and [`forwarder`]: domain events republished locally.
//! - [`host`]: the boundary to the page that mounts the frame.
//! - [`room`]: the lifecycle and the generated command methods.
//!
//! [`simulator`] provides an in-process host page and app for tests and the
//! `roomlink simulate` command.

pub mod cli;
pub mod commands;
pub mod config;
pub mod emitter;
pub mod error;
pub mod forwarder;
pub mod host;
pub mod messenger;
pub mod room;
pub mod simulator;
pub mod transport;

pub use cli::Cli;
pub use config::{FrameSettings, RoomConfig};
pub use emitter::{EventEmitter, ListenerId, WILDCARD_EVENT};
pub use error::{
    HandlerError, HandlerResult, HostError, LoadError, MessengerError, MessengerResult, RoomError,
    RoomResult, TransportError, TransportResult,
};
pub use forwarder::EventForwarder;
pub use host::{ChildFrame, FrameSpec, HostEnvironment};
pub use messenger::{BoxFuture, CommandHandler, Messenger, MessengerConfig};
pub use room::{Room, RoomDeps, RoomState};
pub use transport::{MessageBus, MessageEvent, MessageTarget, WindowTarget};
