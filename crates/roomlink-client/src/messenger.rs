//! Session-scoped command messaging over a window channel.
//!
//! A [`Messenger`] binds one local [`MessageBus`] (inbound) to one remote
//! [`MessageTarget`] (outbound). Inbound messages are accepted only when
//! they come from the configured target origin and carry the messenger's
//! correlation id; anything else on the shared bus belongs to somebody else
//! and is dropped without a trace beyond a `trace!` line.
//!
//! Requests are ordinary envelopes with a fresh `requestId` merged into the
//! payload. Their answer arrives under `re:<command>:<requestId>`, for which
//! a fire-once handler is registered before the request leaves.
//!
//! Handlers run one at a time, in arrival order, on a queue owned by the
//! messenger. A handler that waits on this messenger's own inbound traffic
//! (a reply to a request it sends, say) must spawn that work instead of
//! awaiting it inline.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::FutureExt;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use roomlink_core::IdGenerator;
use roomlink_protocol::{Envelope, reply_command, reply_error, with_request_id};

use crate::error::{HandlerResult, MessengerError, MessengerResult};
use crate::transport::{MessageBus, MessageEvent, MessageTarget};

/// A boxed future, `Send` so it can be spawned.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The future a command handler returns.
pub type HandlerFuture = BoxFuture<'static, HandlerResult>;

type HandlerFn = dyn Fn(Value) -> HandlerFuture + Send + Sync;

/// A registered reaction to an inbound command.
///
/// Cloning is cheap and keeps identity: a clone can be used to remove the
/// handler it was cloned from.
#[derive(Clone)]
pub struct CommandHandler(Arc<HandlerFn>);

impl CommandHandler {
    /// Wraps an async closure.
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self(Arc::new(move |payload| -> HandlerFuture {
            Box::pin(handler(payload))
        }))
    }

    /// Wraps a synchronous closure.
    pub fn sync<F>(handler: F) -> Self
    where
        F: Fn(Value) -> HandlerResult + Send + Sync + 'static,
    {
        Self::new(move |payload| std::future::ready(handler(payload)))
    }

    /// Returns true if both values refer to the same handler.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }

    fn call(&self, payload: Value) -> HandlerFuture {
        (self.0)(payload)
    }
}

impl fmt::Debug for CommandHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CommandHandler")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

/// Channel settings of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessengerConfig {
    /// Session identifier stamped on, and required of, every envelope.
    pub correlation_id: String,
    /// Origin outbound messages are restricted to and inbound messages must
    /// come from.
    pub target_origin: String,
    /// Upper bound on the wait for a reply. `None` waits forever.
    pub request_timeout: Option<Duration>,
}

impl MessengerConfig {
    /// Creates a config without a request timeout.
    pub fn new(correlation_id: impl Into<String>, target_origin: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            target_origin: target_origin.into(),
            request_timeout: None,
        }
    }

    /// Sets the reply timeout applied to every request.
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }
}

struct Entry {
    handler: CommandHandler,
    once: bool,
}

/// One scheduled handler invocation.
struct Job {
    command: String,
    handler: CommandHandler,
    payload: Value,
}

impl Job {
    async fn run(self) {
        let Job {
            command,
            handler,
            payload,
        } = self;
        let call = async move { handler.call(payload).await };
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(command = %command, error = %err, "command handler failed"),
            Err(_) => warn!(command = %command, "command handler panicked"),
        }
    }
}

/// Drains the handler queue in order. Ends once every sender is gone.
async fn run_jobs(mut jobs: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = jobs.recv().await {
        job.run().await;
    }
}

struct Inner {
    config: MessengerConfig,
    target: Arc<dyn MessageTarget>,
    local: MessageBus,
    ids: Arc<dyn IdGenerator>,
    handlers: Mutex<HashMap<String, Vec<Entry>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    jobs: Mutex<Option<mpsc::UnboundedSender<Job>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.listener).take() {
            task.abort();
        }
    }
}

/// Command messenger for one session. Clones share the same registry.
#[derive(Clone)]
pub struct Messenger {
    inner: Arc<Inner>,
}

impl Messenger {
    /// Creates a messenger. It does not listen until [`start`](Self::start).
    pub fn new(
        config: MessengerConfig,
        target: Arc<dyn MessageTarget>,
        local: MessageBus,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                target,
                local,
                ids,
                handlers: Mutex::new(HashMap::new()),
                listener: Mutex::new(None),
                jobs: Mutex::new(None),
            }),
        }
    }

    /// The session identifier.
    pub fn correlation_id(&self) -> &str {
        &self.inner.config.correlation_id
    }

    /// The remote origin.
    pub fn target_origin(&self) -> &str {
        &self.inner.config.target_origin
    }

    /// Returns true while the inbound listener is attached.
    pub fn is_listening(&self) -> bool {
        lock(&self.inner.listener).is_some()
    }

    /// Attaches the inbound listener to the local bus.
    ///
    /// Messages posted after this call are dispatched. Calling it again while
    /// listening does nothing. Must be called within a tokio runtime.
    pub fn start(&self) {
        let mut listener = lock(&self.inner.listener);
        if listener.is_some() {
            trace!(correlation_id = %self.correlation_id(), "messenger already listening");
            return;
        }

        let mut rx = self.inner.local.subscribe();
        let weak = Arc::downgrade(&self.inner);
        *listener = Some(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                Messenger { inner }.dispatch(&event);
            }
        }));

        debug!(
            correlation_id = %self.correlation_id(),
            target_origin = %self.target_origin(),
            "messenger listening"
        );
    }

    /// Detaches the listener and clears every handler.
    ///
    /// Requests still waiting for a reply fail with
    /// [`MessengerError::Disposed`].
    pub fn stop(&self) {
        if let Some(task) = lock(&self.inner.listener).take() {
            task.abort();
        }
        let drained = std::mem::take(&mut *lock(&self.inner.handlers));
        let cleared: usize = drained.values().map(Vec::len).sum();
        drop(drained);
        debug!(correlation_id = %self.correlation_id(), cleared, "messenger stopped");
    }

    /// Registers a persistent handler.
    ///
    /// Returns false if this handler is already registered for `command`.
    pub fn add_handler(&self, command: &str, handler: CommandHandler) -> bool {
        self.register(command, handler, false)
    }

    /// Registers a handler that is removed after its first invocation.
    pub fn add_handler_once(&self, command: &str, handler: CommandHandler) -> bool {
        self.register(command, handler, true)
    }

    fn register(&self, command: &str, handler: CommandHandler, once: bool) -> bool {
        let mut handlers = lock(&self.inner.handlers);
        let entries = handlers.entry(command.to_string()).or_default();
        if entries.iter().any(|entry| entry.handler.ptr_eq(&handler)) {
            trace!(command, "handler already registered");
            return false;
        }
        entries.push(Entry { handler, once });
        true
    }

    /// Removes a handler. Returns false if it was not registered.
    pub fn remove_handler(&self, command: &str, handler: &CommandHandler) -> bool {
        let mut handlers = lock(&self.inner.handlers);
        let Some(entries) = handlers.get_mut(command) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| !entry.handler.ptr_eq(handler));
        let removed = entries.len() != before;
        if entries.is_empty() {
            handlers.remove(command);
        }
        removed
    }

    /// Removes every handler of `command`. Returns how many were removed.
    pub fn clear_handlers(&self, command: &str) -> usize {
        lock(&self.inner.handlers)
            .remove(command)
            .map_or(0, |entries| entries.len())
    }

    /// Number of handlers registered for `command`.
    pub fn handler_count(&self, command: &str) -> usize {
        lock(&self.inner.handlers).get(command).map_or(0, Vec::len)
    }

    /// Runs the inbound algorithm on one message.
    ///
    /// Returns the number of handlers scheduled; zero means the message was
    /// dropped (wrong origin, malformed, foreign session or no handler).
    pub fn dispatch(&self, event: &MessageEvent) -> usize {
        let config = &self.inner.config;
        if event.origin != config.target_origin {
            trace!(
                origin = %event.origin,
                expected = %config.target_origin,
                "dropping message from unexpected origin"
            );
            return 0;
        }

        let envelope = match Envelope::from_value(event.data.clone()) {
            Ok(envelope) => envelope,
            Err(err) => {
                trace!(error = %err, "dropping malformed message");
                return 0;
            }
        };

        if !envelope.is_for(&config.correlation_id) {
            trace!(
                command = %envelope.command,
                correlation_id = %envelope.correlation_id,
                "dropping message for another session"
            );
            return 0;
        }

        let handlers = self.take_handlers(&envelope.command);
        if handlers.is_empty() {
            trace!(command = %envelope.command, "no handler for command");
            return 0;
        }

        let count = handlers.len();
        for handler in handlers {
            self.enqueue(Job {
                command: envelope.command.clone(),
                handler,
                payload: envelope.payload.clone(),
            });
        }
        count
    }

    /// Queues a handler invocation behind every one queued before it.
    ///
    /// The queue task is started on first use.
    fn enqueue(&self, job: Job) {
        let mut jobs = lock(&self.inner.jobs);
        let job = match jobs.as_ref() {
            Some(tx) => match tx.send(job) {
                Ok(()) => return,
                Err(mpsc::error::SendError(job)) => job,
            },
            None => job,
        };
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_jobs(rx));
        if tx.send(job).is_err() {
            warn!(correlation_id = %self.correlation_id(), "handler queue closed");
        }
        *jobs = Some(tx);
    }

    /// Snapshot of the handlers for `command`, with fire-once entries
    /// removed from the registry.
    fn take_handlers(&self, command: &str) -> Vec<CommandHandler> {
        let mut handlers = lock(&self.inner.handlers);
        let Some(entries) = handlers.get_mut(command) else {
            return Vec::new();
        };
        let snapshot = entries.iter().map(|entry| entry.handler.clone()).collect();
        entries.retain(|entry| !entry.once);
        if entries.is_empty() {
            handlers.remove(command);
        }
        snapshot
    }

    /// Posts an envelope without waiting for anything.
    pub fn send(&self, command: &str, payload: Value) -> MessengerResult<()> {
        let envelope = Envelope::new(command, payload, self.correlation_id());
        let data = envelope.to_value()?;
        self.inner
            .target
            .post_message(data, self.target_origin())?;
        trace!(command, correlation_id = %self.correlation_id(), "message sent");
        Ok(())
    }

    /// Sends `command` and waits for its reply.
    ///
    /// `payload` must be an object or `null`; the request id is merged into
    /// it. The reply payload is returned as-is unless it carries a truthy
    /// `error` field, which becomes [`MessengerError::Remote`].
    pub async fn request(&self, command: &str, payload: Value) -> MessengerResult<Value> {
        let request_id = self.inner.ids.generate();
        let reply = reply_command(command, &request_id);
        let payload = with_request_id(payload, &request_id)?;

        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));
        self.add_handler_once(
            &reply,
            CommandHandler::sync(move |payload| {
                if let Some(tx) = lock(&slot).take() {
                    let _ = tx.send(payload);
                }
                Ok(())
            }),
        );
        let _pending = PendingReply {
            messenger: self,
            reply: &reply,
        };

        self.send(command, payload)?;
        debug!(command, request_id = %request_id, "request sent");

        let outcome = match self.inner.config.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(command, request_id = %request_id, "request timed out");
                    return Err(MessengerError::Timeout {
                        command: command.to_string(),
                    });
                }
            },
            None => rx.await,
        };

        let payload = outcome.map_err(|_| MessengerError::Disposed {
            command: command.to_string(),
        })?;

        match reply_error(&payload) {
            Some(error) => {
                debug!(command, request_id = %request_id, "request rejected by remote");
                Err(MessengerError::Remote(error.clone()))
            }
            None => Ok(payload),
        }
    }

    /// Answers a request received under `command` with id `request_id`.
    pub fn reply(&self, command: &str, request_id: &str, payload: Value) -> MessengerResult<()> {
        self.send(&reply_command(command, request_id), payload)
    }
}

impl fmt::Debug for Messenger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Messenger")
            .field("correlation_id", &self.correlation_id())
            .field("target_origin", &self.target_origin())
            .field("listening", &self.is_listening())
            .finish()
    }
}

/// Deregisters a request's reply handler when the request goes away,
/// whether it was answered, failed or was dropped mid-wait.
struct PendingReply<'a> {
    messenger: &'a Messenger,
    reply: &'a str,
}

impl Drop for PendingReply<'_> {
    fn drop(&mut self) {
        if self.messenger.clear_handlers(self.reply) > 0 {
            trace!(reply = self.reply, "reply handler released");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use crate::transport::WindowTarget;
    use roomlink_core::SequentialIds;
    use roomlink_protocol::request_id_of;
    use serde_json::json;
    use tokio::sync::mpsc;

    const HOST: &str = "https://host.test";
    const APP: &str = "https://app.test";

    struct Pair {
        host: Messenger,
        app: Messenger,
        host_bus: MessageBus,
    }

    fn pair(correlation_id: &str) -> Pair {
        let host_bus = MessageBus::new(HOST);
        let app_bus = MessageBus::new(APP);
        let host = Messenger::new(
            MessengerConfig::new(correlation_id, APP),
            Arc::new(WindowTarget::new(app_bus.clone(), HOST)),
            host_bus.clone(),
            Arc::new(SequentialIds::new("req")),
        );
        let app = Messenger::new(
            MessengerConfig::new(correlation_id, HOST),
            Arc::new(WindowTarget::new(host_bus.clone(), APP)),
            app_bus,
            Arc::new(SequentialIds::new("app")),
        );
        Pair {
            host,
            app,
            host_bus,
        }
    }

    fn envelope(command: &str, payload: Value, correlation_id: &str) -> MessageEvent {
        MessageEvent::new(
            APP,
            json!({"command": command, "payload": payload, "correlationId": correlation_id}),
        )
    }

    fn recorder() -> (CommandHandler, mpsc::UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler = CommandHandler::sync(move |payload| {
            let _ = tx.send(payload);
            Ok(())
        });
        (handler, rx)
    }

    fn echo_responder(app: &Messenger, command: &'static str, answer: Value) {
        let responder = app.clone();
        app.add_handler(
            command,
            CommandHandler::sync(move |payload| {
                let id = request_id_of(&payload)
                    .ok_or_else(|| HandlerError::new("missing request id"))?;
                responder.reply(command, id, answer.clone())?;
                Ok(())
            }),
        );
    }

    #[tokio::test]
    async fn request_resolves_with_reply_payload() {
        let Pair { host, app, .. } = pair("m1");
        echo_responder(&app, "getParticipants", json!({"participants": [{"id": "p1"}]}));
        app.start();
        host.start();

        let reply = host.request("getParticipants", Value::Null).await.unwrap();
        assert_eq!(reply, json!({"participants": [{"id": "p1"}]}));
        assert_eq!(host.handler_count("re:getParticipants:req-1"), 0);
    }

    #[tokio::test]
    async fn request_payload_carries_fresh_id() {
        let Pair { host, app, .. } = pair("m1");
        let (seen, mut rx) = recorder();
        app.add_handler("blockParticipant", seen);
        app.start();

        let pending = tokio::spawn({
            let host = host.clone();
            async move { host.request("blockParticipant", json!({"id": "abc"})).await }
        });

        let payload = rx.recv().await.unwrap();
        assert_eq!(payload, json!({"id": "abc", "requestId": "req-1"}));
        assert_eq!(host.handler_count("re:blockParticipant:req-1"), 1);
        pending.abort();
    }

    #[tokio::test]
    async fn error_field_rejects_with_value_verbatim() {
        let Pair { host, app, .. } = pair("m1");
        echo_responder(&app, "banParticipant", json!({"error": {"code": "forbidden"}}));
        app.start();
        host.start();

        let err = host
            .request("banParticipant", json!({"id": "p2"}))
            .await
            .unwrap_err();
        assert_eq!(err.remote_error(), Some(&json!({"code": "forbidden"})));
    }

    #[tokio::test]
    async fn falsy_error_field_resolves() {
        let Pair { host, app, .. } = pair("m1");
        echo_responder(&app, "getUserName", json!({"name": "Ada", "error": null}));
        app.start();
        host.start();

        let reply = host.request("getUserName", Value::Null).await.unwrap();
        assert_eq!(reply["name"], "Ada");
    }

    #[tokio::test]
    async fn foreign_session_is_never_dispatched() {
        let Pair { host, .. } = pair("m1");
        let (seen, mut rx) = recorder();
        host.add_handler("event", seen.clone());
        host.add_handler("re:x:1", seen);

        assert_eq!(host.dispatch(&envelope("event", json!({}), "m2")), 0);
        assert_eq!(host.dispatch(&envelope("re:x:1", json!({}), "")), 0);
        assert_eq!(host.dispatch(&envelope("event", json!({"n": 1}), "m1")), 1);

        assert_eq!(rx.recv().await.unwrap(), json!({"n": 1}));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn foreign_origin_is_never_dispatched() {
        let Pair { host, .. } = pair("m1");
        let (seen, _rx) = recorder();
        host.add_handler("event", seen);

        let mut event = envelope("event", json!({}), "m1");
        event.origin = "https://evil.test".to_string();
        assert_eq!(host.dispatch(&event), 0);
    }

    #[tokio::test]
    async fn malformed_and_unhandled_messages_are_dropped() {
        let Pair { host, .. } = pair("m1");
        assert_eq!(host.dispatch(&MessageEvent::new(APP, json!("hello"))), 0);
        assert_eq!(host.dispatch(&MessageEvent::new(APP, json!({"command": "x"}))), 0);
        assert_eq!(host.dispatch(&envelope("unknown", json!({}), "m1")), 0);
    }

    #[tokio::test]
    async fn same_handler_registers_once() {
        let Pair { host, .. } = pair("m1");
        let (seen, mut rx) = recorder();
        assert!(host.add_handler("event", seen.clone()));
        assert!(!host.add_handler("event", seen.clone()));
        assert_eq!(host.handler_count("event"), 1);

        assert_eq!(host.dispatch(&envelope("event", json!(1), "m1")), 1);
        assert_eq!(rx.recv().await.unwrap(), json!(1));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn once_handler_runs_once() {
        let Pair { host, .. } = pair("m1");
        let (seen, mut rx) = recorder();
        host.add_handler_once("app:ready", seen);

        assert_eq!(host.dispatch(&envelope("app:ready", json!({"v": 1}), "m1")), 1);
        assert_eq!(host.dispatch(&envelope("app:ready", json!({"v": 2}), "m1")), 0);
        assert_eq!(rx.recv().await.unwrap(), json!({"v": 1}));
        assert_eq!(host.handler_count("app:ready"), 0);
    }

    #[tokio::test]
    async fn removing_unknown_handler_is_harmless() {
        let Pair { host, .. } = pair("m1");
        let (seen, _rx) = recorder();
        let (other, _other_rx) = recorder();
        assert!(!host.remove_handler("event", &seen));

        host.add_handler("event", seen.clone());
        assert!(!host.remove_handler("event", &other));
        assert!(host.remove_handler("event", &seen));
        assert_eq!(host.handler_count("event"), 0);
    }

    #[tokio::test]
    async fn failing_handlers_do_not_affect_siblings() {
        let Pair { host, .. } = pair("m1");
        let (seen, mut rx) = recorder();
        host.add_handler(
            "event",
            CommandHandler::sync(|_| Err(HandlerError::new("boom"))),
        );
        host.add_handler("event", CommandHandler::sync(|_| panic!("handler panic")));
        host.add_handler(
            "event",
            CommandHandler::new(|_| async { Err(HandlerError::new("async boom")) }),
        );
        host.add_handler("event", seen);

        assert_eq!(host.dispatch(&envelope("event", json!("ok"), "m1")), 4);
        assert_eq!(rx.recv().await.unwrap(), json!("ok"));

        assert_eq!(host.dispatch(&envelope("event", json!("again"), "m1")), 4);
        assert_eq!(rx.recv().await.unwrap(), json!("again"));
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let Pair { host, host_bus, .. } = pair("m1");
        assert!(!host.is_listening());
        host.start();
        host.start();
        assert!(host.is_listening());
        assert_eq!(host_bus.listener_count(), 1);
    }

    #[tokio::test]
    async fn stop_fails_pending_requests() {
        let Pair { host, .. } = pair("m1");
        host.start();

        let pending = tokio::spawn({
            let host = host.clone();
            async move { host.request("getMeetingState", Value::Null).await }
        });
        while host.handler_count("re:getMeetingState:req-1") == 0 {
            tokio::task::yield_now().await;
        }

        host.stop();
        assert!(!host.is_listening());
        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, MessengerError::Disposed { command } if command == "getMeetingState"));
    }

    #[tokio::test(start_paused = true)]
    async fn request_timeout_deregisters_reply_handler() {
        let host_bus = MessageBus::new(HOST);
        let app_bus = MessageBus::new(APP);
        let host = Messenger::new(
            MessengerConfig::new("m1", APP).with_request_timeout(Some(Duration::from_secs(5))),
            Arc::new(WindowTarget::new(app_bus, HOST)),
            host_bus,
            Arc::new(SequentialIds::new("req")),
        );
        host.start();

        let err = host.request("getRecordingState", Value::Null).await.unwrap_err();
        assert!(matches!(err, MessengerError::Timeout { .. }));
        assert_eq!(host.handler_count("re:getRecordingState:req-1"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_request_releases_its_reply_handler() {
        let Pair { host, .. } = pair("m1");
        host.start();

        for _ in 0..5 {
            let waited = tokio::time::timeout(
                Duration::from_millis(10),
                host.request("getParticipants", Value::Null),
            )
            .await;
            assert!(waited.is_err());
        }

        for n in 1..=5 {
            assert_eq!(host.handler_count(&format!("re:getParticipants:req-{n}")), 0);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn handlers_run_one_at_a_time_in_arrival_order() {
        let Pair { host, app, .. } = pair("m1");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let slow = tx.clone();
        host.add_handler(
            "tick",
            CommandHandler::new(move |payload| {
                let slow = slow.clone();
                async move {
                    tokio::task::yield_now().await;
                    let _ = slow.send(("slow", payload));
                    Ok(())
                }
            }),
        );
        host.add_handler(
            "tick",
            CommandHandler::sync(move |payload| {
                let _ = tx.send(("fast", payload));
                Ok(())
            }),
        );
        host.start();

        for n in 0..200 {
            app.send("tick", json!(n)).unwrap();
        }

        for n in 0..200 {
            assert_eq!(rx.recv().await.unwrap(), ("slow", json!(n)));
            assert_eq!(rx.recv().await.unwrap(), ("fast", json!(n)));
        }
    }

    #[tokio::test]
    async fn scalar_request_payload_is_rejected_before_sending() {
        let Pair { host, app, .. } = pair("m1");
        let (seen, mut rx) = recorder();
        app.add_handler("sendChatMessage", seen);
        app.start();

        let err = host.request("sendChatMessage", json!("hi")).await.unwrap_err();
        assert!(matches!(err, MessengerError::Protocol(_)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_is_restricted_to_target_origin() {
        let host_bus = MessageBus::new(HOST);
        let app_bus = MessageBus::new("https://other.test");
        let mut rx = app_bus.subscribe();
        let host = Messenger::new(
            MessengerConfig::new("m1", APP),
            Arc::new(WindowTarget::new(app_bus, HOST)),
            host_bus,
            Arc::new(SequentialIds::new("req")),
        );

        host.send("initialize", json!({})).unwrap();
        assert!(rx.try_recv().is_err());
    }
}
