//! In-process window messaging.
//!
//! A [`MessageBus`] is one window's inbound message stream: everything
//! posted to the window is seen by every listener attached to it, which is
//! why envelopes carry a correlation id. A [`MessageTarget`] is the remote
//! side of a channel, the thing messages are posted *to*.
//!
//! [`WindowTarget`] connects the two: posting to it delivers into another
//! window's bus, stamped with the sender's origin, and silently discards
//! the message if the requested target origin does not match the receiving
//! window, the same way a browser's `postMessage` does.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::trace;

use roomlink_protocol::clone_message;

use crate::error::{TransportError, TransportResult};

/// Target origin that matches any receiving window.
pub const ANY_ORIGIN: &str = "*";

/// An inbound platform message.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    /// Origin of the sending window.
    pub origin: String,
    /// Message data, as posted.
    pub data: Value,
}

impl MessageEvent {
    /// Creates a message event.
    pub fn new(origin: impl Into<String>, data: Value) -> Self {
        Self {
            origin: origin.into(),
            data,
        }
    }
}

/// A window's inbound message stream.
///
/// Every listener gets its own unbounded queue, so nothing posted is lost
/// however far a listener falls behind. Listeners whose receiver is gone
/// are pruned on the next post.
#[derive(Clone)]
pub struct MessageBus {
    origin: String,
    listeners: Arc<Mutex<Vec<mpsc::UnboundedSender<MessageEvent>>>>,
}

impl MessageBus {
    /// Creates the bus of a window living at `origin`.
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Origin of the window this bus belongs to.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Attaches a new listener. It sees messages posted from now on.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<MessageEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(tx);
        rx
    }

    /// Number of attached listeners.
    pub fn listener_count(&self) -> usize {
        let mut listeners = self.lock();
        listeners.retain(|tx| !tx.is_closed());
        listeners.len()
    }

    /// Delivers a message to every listener, in posting order.
    ///
    /// A window with no listeners swallows the message.
    pub fn post(&self, event: MessageEvent) {
        let mut listeners = self.lock();
        listeners.retain(|tx| tx.send(event.clone()).is_ok());
        if listeners.is_empty() {
            trace!(origin = %self.origin, "message posted to a window nobody listens on");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<mpsc::UnboundedSender<MessageEvent>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBus")
            .field("origin", &self.origin)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// The postable side of a channel.
pub trait MessageTarget: Send + Sync {
    /// Posts `data`, restricted to receivers at `target_origin`.
    ///
    /// Delivery is best effort; a mismatched origin is not an error.
    fn post_message(&self, data: Value, target_origin: &str) -> TransportResult<()>;
}

/// Posts into another window's [`MessageBus`].
#[derive(Debug, Clone)]
pub struct WindowTarget {
    window: MessageBus,
    source_origin: String,
}

impl WindowTarget {
    /// Creates a target delivering into `window` on behalf of a sender at
    /// `source_origin`.
    pub fn new(window: MessageBus, source_origin: impl Into<String>) -> Self {
        Self {
            window,
            source_origin: source_origin.into(),
        }
    }

    /// The receiving window.
    pub fn window(&self) -> &MessageBus {
        &self.window
    }
}

impl MessageTarget for WindowTarget {
    fn post_message(&self, data: Value, target_origin: &str) -> TransportResult<()> {
        if target_origin != ANY_ORIGIN && target_origin != self.window.origin() {
            trace!(
                target_origin,
                window_origin = %self.window.origin(),
                "dropping message for mismatched target origin"
            );
            return Ok(());
        }

        let data = clone_message(&data).map_err(TransportError::Clone)?;
        self.window
            .post(MessageEvent::new(self.source_origin.clone(), data));
        Ok(())
    }
}
