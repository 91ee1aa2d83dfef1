//! The room controller.
//!
//! A [`Room`] owns one embedded meeting from mounting to disposal:
//!
//! ```text
//! Created -> Loading -> Handshaking -> Joined -> Leaving -> Left -> Disposed
//!               |            |
//!               +-> Failed <-+
//! ```
//!
//! `join` mounts the child frame, waits for it to load, wires a
//! [`Messenger`] and an [`EventForwarder`] to it, sends `initialize` and
//! waits for `app:ready`. Every remote command is then available as an
//! async method generated from the command table.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Value, json};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use roomlink_core::{IdGenerator, MeetingUrl, UuidGenerator};
use roomlink_protocol::{APP_READY_COMMAND, INITIALIZE_COMMAND, LEAVE_COMMAND, RoomCommand};

use crate::config::RoomConfig;
use crate::emitter::{EventEmitter, ListenerId};
use crate::error::{MessengerError, RoomError, RoomResult};
use crate::forwarder::EventForwarder;
use crate::host::{ChildFrame, FrameSpec, HostEnvironment};
use crate::messenger::{CommandHandler, Messenger, MessengerConfig};
use crate::transport::MessageBus;

/// Lifecycle of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomState {
    /// Constructed, nothing mounted.
    Created,
    /// Frame mounted and navigating.
    Loading,
    /// Frame loaded, waiting for `app:ready`.
    Handshaking,
    /// Commands may be issued.
    Joined,
    /// `leave` sent, waiting for the reply.
    Leaving,
    /// Left the meeting; the frame is still mounted.
    Left,
    /// Load or handshake failed. Build a new room to retry.
    Failed,
    /// Frame removed, nothing left to do.
    Disposed,
}

impl RoomState {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Loading => "loading",
            Self::Handshaking => "handshaking",
            Self::Joined => "joined",
            Self::Leaving => "leaving",
            Self::Left => "left",
            Self::Failed => "failed",
            Self::Disposed => "disposed",
        }
    }
}

impl fmt::Display for RoomState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collaborators a room is built from.
#[derive(Clone)]
pub struct RoomDeps {
    /// Page the frame is mounted into.
    pub host: Arc<dyn HostEnvironment>,
    /// The host page's own window, where replies arrive.
    pub window: MessageBus,
    /// Request id source.
    pub ids: Arc<dyn IdGenerator>,
}

impl RoomDeps {
    /// Dependencies with random request ids.
    pub fn new(host: Arc<dyn HostEnvironment>, window: MessageBus) -> Self {
        Self {
            host,
            window,
            ids: Arc::new(UuidGenerator),
        }
    }

    /// Builder: set the request id source.
    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }
}

impl fmt::Debug for RoomDeps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomDeps")
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct Session {
    frame: Option<Arc<dyn ChildFrame>>,
    messenger: Option<Messenger>,
    forwarder: Option<EventForwarder>,
}

/// One embedded meeting.
pub struct Room {
    config: RoomConfig,
    meeting: MeetingUrl,
    frame_spec: FrameSpec,
    deps: RoomDeps,
    emitter: Arc<EventEmitter>,
    state: Mutex<RoomState>,
    session: Mutex<Session>,
}

impl Room {
    /// Creates a room. Fails if the meeting URL is unusable.
    pub fn new(config: RoomConfig, deps: RoomDeps) -> RoomResult<Self> {
        let meeting = config.meeting()?;
        let frame_spec = FrameSpec::for_meeting(meeting.meeting_id(), &config.frame);
        Ok(Self {
            config,
            meeting,
            frame_spec,
            deps,
            emitter: Arc::new(EventEmitter::new()),
            state: Mutex::new(RoomState::Created),
            session: Mutex::new(Session::default()),
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RoomState {
        *lock(&self.state)
    }

    /// The meeting this room joins.
    pub fn meeting(&self) -> &MeetingUrl {
        &self.meeting
    }

    /// The meeting alias, also the channel correlation id.
    pub fn meeting_id(&self) -> &str {
        self.meeting.meeting_id()
    }

    /// The frame the room mounts.
    pub fn frame_spec(&self) -> &FrameSpec {
        &self.frame_spec
    }

    /// The emitter forwarded events are published on.
    pub fn events(&self) -> &Arc<EventEmitter> {
        &self.emitter
    }

    /// The session messenger, once the frame has loaded.
    pub fn messenger(&self) -> Option<Messenger> {
        lock(&self.session).messenger.clone()
    }

    /// Subscribes to a forwarded event, or to `*` for all of them.
    pub fn on<F>(&self, event: &str, callback: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.emitter.on(event, callback)
    }

    /// Subscribes to the next occurrence of a forwarded event.
    pub fn once<F>(&self, event: &str, callback: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.emitter.once(event, callback)
    }

    /// Unsubscribes a listener.
    pub fn off(&self, id: ListenerId) -> bool {
        self.emitter.off(id)
    }

    /// Mounts the frame, loads it and performs the handshake.
    ///
    /// Resolves with the `app:ready` payload. A room can only join once.
    ///
    /// Dropping the future before it resolves fails the room and releases
    /// the `app:ready` handler, the same as a handshake timeout.
    pub async fn join(&self) -> RoomResult<Value> {
        self.transition("join", &[RoomState::Created], RoomState::Loading)?;
        let mut attempt = JoinAttempt {
            room: self,
            done: false,
        };
        let meeting_id = self.meeting_id().to_string();

        let frame = match self.deps.host.mount(&self.frame_spec) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(meeting_id = %meeting_id, error = %err, "failed to mount frame");
                return Err(err.into());
            }
        };
        lock(&self.session).frame = Some(Arc::clone(&frame));
        debug!(meeting_id = %meeting_id, frame_id = %frame.id(), "frame mounted");

        let url = self.meeting.session_url(
            &self.config.user,
            self.config.ui.as_deref(),
            self.deps.window.origin(),
        );
        if let Err(err) = frame.load_url(&url).await {
            warn!(meeting_id = %meeting_id, error = %err, "frame failed to load");
            return Err(err.into());
        }

        self.transition("join", &[RoomState::Loading], RoomState::Handshaking)?;
        let messenger = Messenger::new(
            MessengerConfig::new(&meeting_id, self.meeting.origin())
                .with_request_timeout(self.config.request_timeout()),
            frame.content_window(),
            self.deps.window.clone(),
            Arc::clone(&self.deps.ids),
        );
        let forwarder = EventForwarder::new(messenger.clone(), Arc::clone(&self.emitter));
        forwarder.initialize();
        messenger.start();
        {
            let mut session = lock(&self.session);
            session.messenger = Some(messenger.clone());
            session.forwarder = Some(forwarder);
        }

        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));
        messenger.add_handler_once(
            APP_READY_COMMAND,
            CommandHandler::sync(move |payload| {
                if let Some(tx) = lock(&slot).take() {
                    let _ = tx.send(payload);
                }
                Ok(())
            }),
        );

        messenger.send(INITIALIZE_COMMAND, json!({}))?;
        debug!(meeting_id = %meeting_id, timeout = ?self.config.init_timeout(), "handshake started");

        match tokio::time::timeout(self.config.init_timeout(), rx).await {
            Ok(Ok(ready)) => {
                self.transition("join", &[RoomState::Handshaking], RoomState::Joined)?;
                attempt.done = true;
                info!(meeting_id = %meeting_id, "joined room");
                Ok(ready)
            }
            Ok(Err(_)) => Err(MessengerError::Disposed {
                command: INITIALIZE_COMMAND.to_string(),
            }
            .into()),
            Err(_) => {
                warn!(meeting_id = %meeting_id, "app did not become ready in time");
                Err(RoomError::InitializationTimeout)
            }
        }
    }

    /// Asks the app to leave, then tears the channel down.
    ///
    /// The frame stays mounted. If the app rejects the request, or the
    /// future is dropped before the reply, the room stays joined.
    pub async fn leave(&self) -> RoomResult<Value> {
        self.transition("leave", &[RoomState::Joined], RoomState::Leaving)?;
        let mut attempt = LeaveAttempt {
            room: self,
            done: false,
        };
        let Some(messenger) = self.messenger() else {
            return Err(RoomError::InvalidState {
                operation: "leave",
                state: RoomState::Joined,
            });
        };

        match messenger.request(LEAVE_COMMAND, json!({})).await {
            Ok(reply) => {
                attempt.done = true;
                self.teardown();
                self.transition("leave", &[RoomState::Leaving], RoomState::Left)?;
                info!(meeting_id = %self.meeting_id(), "left room");
                Ok(reply)
            }
            Err(err) => {
                warn!(meeting_id = %self.meeting_id(), error = %err, "leave failed");
                Err(err.into())
            }
        }
    }

    /// Leaves if joined, then removes the frame.
    ///
    /// A failed `leave` is logged and does not stop the disposal.
    pub async fn dispose(&self) -> RoomResult<()> {
        match self.state() {
            RoomState::Disposed => return Ok(()),
            RoomState::Leaving => {
                return Err(RoomError::InvalidState {
                    operation: "dispose",
                    state: RoomState::Leaving,
                });
            }
            RoomState::Joined => {
                if let Err(err) = self.leave().await {
                    warn!(meeting_id = %self.meeting_id(), error = %err, "leaving during dispose failed");
                }
            }
            _ => {}
        }

        self.teardown();
        let frame = lock(&self.session).frame.take();
        if let Some(frame) = frame {
            frame.remove();
            debug!(frame_id = %frame.id(), "frame removed");
        }
        self.set_state(RoomState::Disposed);
        info!(meeting_id = %self.meeting_id(), "room disposed");
        Ok(())
    }

    /// Sends one table command and waits for its reply.
    pub async fn execute(&self, command: RoomCommand) -> RoomResult<Value> {
        let state = self.state();
        let messenger = match (state, self.messenger()) {
            (RoomState::Joined, Some(messenger)) => messenger,
            _ => {
                return Err(RoomError::InvalidState {
                    operation: command.method(),
                    state,
                });
            }
        };
        let (command, payload) = command.into_parts().map_err(MessengerError::from)?;
        Ok(messenger.request(command, payload).await?)
    }

    fn teardown(&self) {
        let (forwarder, messenger) = {
            let mut session = lock(&self.session);
            (session.forwarder.take(), session.messenger.take())
        };
        if let Some(forwarder) = forwarder {
            forwarder.dispose();
        }
        if let Some(messenger) = messenger {
            messenger.stop();
        }
    }

    fn transition(
        &self,
        operation: &'static str,
        from: &[RoomState],
        to: RoomState,
    ) -> RoomResult<()> {
        let mut state = lock(&self.state);
        if !from.contains(&state) {
            return Err(RoomError::InvalidState {
                operation,
                state: *state,
            });
        }
        debug!(
            meeting_id = %self.meeting.meeting_id(),
            from = state.as_str(),
            to = to.as_str(),
            "room state changed"
        );
        *state = to;
        Ok(())
    }

    fn set_state(&self, to: RoomState) {
        *lock(&self.state) = to;
    }

    /// Marks the room failed unless something else moved it on meanwhile.
    fn fail_if(&self, expected: &[RoomState]) {
        let _ = self.transition("fail", expected, RoomState::Failed);
    }

    fn restore_joined(&self) {
        let _ = self.transition("leave", &[RoomState::Leaving], RoomState::Joined);
    }
}

/// Unwinds a join that did not reach `Joined`, whether it returned an
/// error or its future was dropped.
struct JoinAttempt<'a> {
    room: &'a Room,
    done: bool,
}

impl Drop for JoinAttempt<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if let Some(messenger) = self.room.messenger() {
            messenger.clear_handlers(APP_READY_COMMAND);
        }
        self.room
            .fail_if(&[RoomState::Loading, RoomState::Handshaking]);
        debug!(
            meeting_id = %self.room.meeting_id(),
            state = self.room.state().as_str(),
            "join did not complete"
        );
    }
}

/// Puts a room whose `leave` did not finish back in `Joined`.
struct LeaveAttempt<'a> {
    room: &'a Room,
    done: bool,
}

impl Drop for LeaveAttempt<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.room.restore_joined();
        }
    }
}

impl fmt::Debug for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Room")
            .field("meeting_id", &self.meeting_id())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

macro_rules! room_methods {
    (
        $(
            $(#[$meta:meta])*
            $method:ident => $variant:ident $wire:literal (
                $( $arg:ident : $ty:ty => $field:tt ),* $(,)?
            );
        )*
    ) => {
        impl Room {
            $(
                $(#[$meta])*
                #[doc = concat!("\n\nSends `", $wire, "` and resolves with the reply.")]
                pub async fn $method(&self, $( $arg: impl Into<$ty> ),*) -> RoomResult<Value> {
                    self.execute(RoomCommand::$method($( $arg ),*)).await
                }
            )*
        }
    };
}

roomlink_protocol::for_each_room_command!(room_methods);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
