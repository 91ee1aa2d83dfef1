//! Republishes `event` commands on a local [`EventEmitter`].

use std::sync::Arc;

use tracing::debug;

use roomlink_protocol::{DomainEvent, EVENT_COMMAND};

use crate::emitter::{EventEmitter, WILDCARD_EVENT};
use crate::messenger::{CommandHandler, Messenger};

/// Bridges the messenger's `event` command to an emitter.
///
/// Each inbound event is emitted twice: under its own name as
/// `{ type, ...payload }`, and under [`WILDCARD_EVENT`] as
/// `{ eventName, payload }`.
#[derive(Debug)]
pub struct EventForwarder {
    messenger: Messenger,
    emitter: Arc<EventEmitter>,
    handler: CommandHandler,
}

impl EventForwarder {
    /// Creates a forwarder. Nothing is registered until
    /// [`initialize`](Self::initialize).
    pub fn new(messenger: Messenger, emitter: Arc<EventEmitter>) -> Self {
        let sink = Arc::clone(&emitter);
        let handler = CommandHandler::sync(move |payload| {
            let event = DomainEvent::from_value(payload)?;
            forward(&sink, &event);
            Ok(())
        });
        Self {
            messenger,
            emitter,
            handler,
        }
    }

    /// Starts forwarding. Returns false if already forwarding.
    pub fn initialize(&self) -> bool {
        self.messenger
            .add_handler(EVENT_COMMAND, self.handler.clone())
    }

    /// Stops forwarding. Returns false if not forwarding.
    pub fn dispose(&self) -> bool {
        self.messenger.remove_handler(EVENT_COMMAND, &self.handler)
    }

    /// The emitter events are published on.
    pub fn emitter(&self) -> &Arc<EventEmitter> {
        &self.emitter
    }
}

/// Emits one domain event under its name and under the wildcard.
///
/// Returns the number of listeners reached.
pub fn forward(emitter: &EventEmitter, event: &DomainEvent) -> usize {
    let named = emitter.emit(&event.event_name, &event.named_payload());
    let wildcard = emitter.emit(WILDCARD_EVENT, &event.wildcard_payload());
    debug!(
        event = %event.event_name,
        listeners = named + wildcard,
        "forwarded event"
    );
    named + wildcard
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messenger::MessengerConfig;
    use crate::transport::{MessageBus, MessageEvent, WindowTarget};
    use roomlink_core::SequentialIds;
    use serde_json::{Value, json};
    use tokio::sync::mpsc;

    const APP: &str = "https://app.test";

    fn messenger() -> Messenger {
        Messenger::new(
            MessengerConfig::new("m1", APP),
            Arc::new(WindowTarget::new(MessageBus::new(APP), "https://host.test")),
            MessageBus::new("https://host.test"),
            Arc::new(SequentialIds::new("req")),
        )
    }

    fn event(event_name: &str, payload: Value) -> MessageEvent {
        MessageEvent::new(
            APP,
            json!({
                "command": "event",
                "payload": {"eventName": event_name, "payload": payload},
                "correlationId": "m1",
            }),
        )
    }

    fn tap(emitter: &EventEmitter, name: &str) -> mpsc::UnboundedReceiver<(String, Value)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let label = name.to_string();
        emitter.on(name, move |payload| {
            let _ = tx.send((label.clone(), payload.clone()));
        });
        rx
    }

    #[test]
    fn forward_emits_named_and_wildcard() {
        let emitter = EventEmitter::new();
        let mut named = tap(&emitter, "X");
        let mut wildcard = tap(&emitter, WILDCARD_EVENT);

        let reached = forward(&emitter, &DomainEvent::new("X", json!({"a": 1})));
        assert_eq!(reached, 2);
        assert_eq!(named.try_recv().unwrap().1, json!({"type": "X", "a": 1}));
        assert_eq!(
            wildcard.try_recv().unwrap().1,
            json!({"eventName": "X", "payload": {"a": 1}})
        );
        assert!(named.try_recv().is_err());
        assert!(wildcard.try_recv().is_err());
    }

    #[test]
    fn wildcard_fires_even_if_a_named_listener_panics() {
        let emitter = EventEmitter::new();
        emitter.on("X", |_| panic!("listener panic"));
        let mut wildcard = tap(&emitter, WILDCARD_EVENT);

        assert_eq!(forward(&emitter, &DomainEvent::new("X", json!({"a": 1}))), 2);
        assert_eq!(
            wildcard.try_recv().unwrap().1,
            json!({"eventName": "X", "payload": {"a": 1}})
        );
    }

    #[tokio::test]
    async fn initialized_forwarder_republishes_inbound_events() {
        let messenger = messenger();
        let emitter = Arc::new(EventEmitter::new());
        let mut named = tap(&emitter, "participantJoined");
        let mut wildcard = tap(&emitter, WILDCARD_EVENT);
        let forwarder = EventForwarder::new(messenger.clone(), Arc::clone(&emitter));

        assert_eq!(messenger.dispatch(&event("participantJoined", json!({}))), 0);
        assert!(forwarder.initialize());
        assert!(!forwarder.initialize());
        assert_eq!(messenger.handler_count("event"), 1);

        assert_eq!(
            messenger.dispatch(&event("participantJoined", json!({"id": "p1"}))),
            1
        );
        let (_, payload) = named.recv().await.unwrap();
        assert_eq!(payload, json!({"type": "participantJoined", "id": "p1"}));
        let (_, payload) = wildcard.recv().await.unwrap();
        assert_eq!(
            payload,
            json!({"eventName": "participantJoined", "payload": {"id": "p1"}})
        );
    }

    #[tokio::test]
    async fn dispose_removes_the_same_handler() {
        let messenger = messenger();
        let forwarder = EventForwarder::new(messenger.clone(), Arc::new(EventEmitter::new()));

        forwarder.initialize();
        assert!(forwarder.dispose());
        assert!(!forwarder.dispose());
        assert_eq!(messenger.handler_count("event"), 0);
        assert_eq!(messenger.dispatch(&event("x", json!({}))), 0);
    }
}
