//! In-process stand-in for the host page and the embedded app.
//!
//! [`SimulatedHost`] mounts frames into a list instead of a document. When a
//! frame is navigated it launches a [`SimulatedApp`]: a messenger living in
//! its own window that answers the handshake and every table command, so a
//! [`Room`](crate::Room) can be driven end to end without a browser.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Value, json};
use tracing::{debug, trace};
use url::Url;

use roomlink_core::{UuidGenerator, meeting_id_from_url};
use roomlink_protocol::{
    APP_READY_COMMAND, COMMANDS, DomainEvent, EVENT_COMMAND, INITIALIZE_COMMAND, LEAVE_COMMAND,
    request_id_of,
};

use crate::error::{HandlerError, HostError, LoadError, MessengerError, MessengerResult, TransportResult};
use crate::host::{ChildFrame, FrameSpec, HostEnvironment};
use crate::messenger::{BoxFuture, CommandHandler, Messenger, MessengerConfig};
use crate::transport::{MessageBus, MessageTarget, WindowTarget};

/// How the simulated app behaves.
#[derive(Debug, Clone)]
pub struct AppBehavior {
    ready: bool,
    ready_payload: Option<Value>,
    load_error: Option<String>,
    replies: HashMap<String, Value>,
    unanswered: HashSet<String>,
}

impl Default for AppBehavior {
    fn default() -> Self {
        Self {
            ready: true,
            ready_payload: None,
            load_error: None,
            replies: HashMap::new(),
            unanswered: HashSet::new(),
        }
    }
}

impl AppBehavior {
    /// Never answers `initialize`.
    pub fn silent(mut self) -> Self {
        self.ready = false;
        self
    }

    /// Frame navigation fails with `reason`.
    pub fn failing_load(mut self, reason: impl Into<String>) -> Self {
        self.load_error = Some(reason.into());
        self
    }

    /// Payload of `app:ready`. Defaults to `{ "meetingId": <alias> }`.
    pub fn with_ready_payload(mut self, payload: Value) -> Self {
        self.ready_payload = Some(payload);
        self
    }

    /// Scripted reply payload for `command`.
    pub fn with_reply(mut self, command: impl Into<String>, payload: Value) -> Self {
        self.replies.insert(command.into(), payload);
        self
    }

    /// `command` is recorded but never answered.
    pub fn unanswered(mut self, command: impl Into<String>) -> Self {
        self.unanswered.insert(command.into());
        self
    }
}

/// A running simulated app.
#[derive(Debug, Clone)]
pub struct SimulatedApp {
    messenger: Messenger,
    received: Arc<Mutex<Vec<(String, Value)>>>,
}

impl SimulatedApp {
    /// Starts an app for the session URL `url`, replying into `host_window`.
    ///
    /// Returns the app and the window it listens on.
    pub fn launch(
        url: &Url,
        host_window: &MessageBus,
        behavior: &AppBehavior,
    ) -> Result<(Self, MessageBus), LoadError> {
        let meeting_id = meeting_id_from_url(url.as_str())
            .ok_or_else(|| LoadError::new(url.as_str(), "no meeting at this address"))?;
        let origin = url.origin().ascii_serialization();
        let window = MessageBus::new(&origin);

        let messenger = Messenger::new(
            MessengerConfig::new(&meeting_id, host_window.origin()),
            Arc::new(WindowTarget::new(host_window.clone(), &origin)),
            window.clone(),
            Arc::new(UuidGenerator),
        );
        let app = Self {
            messenger,
            received: Arc::new(Mutex::new(Vec::new())),
        };

        let ready_payload = behavior
            .ready_payload
            .clone()
            .unwrap_or_else(|| json!({ "meetingId": meeting_id }));
        app.handle_initialize(behavior.ready.then_some(ready_payload));

        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
        let commands = COMMANDS
            .iter()
            .map(|spec| spec.command)
            .chain([LEAVE_COMMAND]);
        for command in commands {
            let reply = if behavior.unanswered.contains(command) {
                None
            } else {
                Some(
                    behavior
                        .replies
                        .get(command)
                        .cloned()
                        .unwrap_or_else(|| default_reply(command, &params)),
                )
            };
            app.handle_request(command, reply);
        }

        app.messenger.start();
        debug!(meeting_id = %meeting_id, origin = %origin, "simulated app launched");
        Ok((app, window))
    }

    fn record(&self, command: &str, payload: &Value) {
        lock(&self.received).push((command.to_string(), payload.clone()));
    }

    fn handle_initialize(&self, ready: Option<Value>) {
        let app = self.clone();
        self.messenger.add_handler(
            INITIALIZE_COMMAND,
            CommandHandler::sync(move |payload| {
                app.record(INITIALIZE_COMMAND, &payload);
                if let Some(ready) = &ready {
                    app.messenger.send(APP_READY_COMMAND, ready.clone())?;
                }
                Ok(())
            }),
        );
    }

    fn handle_request(&self, command: &'static str, reply: Option<Value>) {
        let app = self.clone();
        self.messenger.add_handler(
            command,
            CommandHandler::sync(move |payload| {
                app.record(command, &payload);
                let Some(reply) = &reply else {
                    trace!(command, "leaving request unanswered");
                    return Ok(());
                };
                let request_id = request_id_of(&payload)
                    .ok_or_else(|| HandlerError::new(format!("{command} without request id")))?;
                app.messenger.reply(command, request_id, reply.clone())?;
                Ok(())
            }),
        );
    }

    /// Publishes a domain event to the host.
    pub fn emit_event(&self, event_name: &str, payload: Value) -> MessengerResult<()> {
        let event = DomainEvent::new(event_name, payload);
        let payload = serde_json::to_value(&event).map_err(|e| MessengerError::Protocol(e.into()))?;
        self.messenger.send(EVENT_COMMAND, payload)
    }

    /// Every command received so far, in order.
    pub fn received(&self) -> Vec<(String, Value)> {
        lock(&self.received).clone()
    }

    /// Payloads received for `command`.
    pub fn requests_for(&self, command: &str) -> Vec<Value> {
        lock(&self.received)
            .iter()
            .filter(|(name, _)| name == command)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// The app-side messenger.
    pub fn messenger(&self) -> &Messenger {
        &self.messenger
    }

    fn shutdown(&self) {
        self.messenger.stop();
    }
}

fn default_reply(command: &str, params: &HashMap<String, String>) -> Value {
    match command {
        "getUserName" => json!({ "name": params.get("un").map_or("Guest", String::as_str) }),
        "getUserLocale" => json!({ "locale": params.get("locale").map_or("en", String::as_str) }),
        "getMeetingState" => json!({ "state": "joined" }),
        "getParticipants" => json!({ "participants": [] }),
        "getDeviceList" => json!({ "devices": [] }),
        _ => json!({}),
    }
}

/// The window of a frame, empty until the frame has loaded.
#[derive(Default)]
struct FrameWindow {
    target: Mutex<Option<WindowTarget>>,
}

impl MessageTarget for FrameWindow {
    fn post_message(&self, data: Value, target_origin: &str) -> TransportResult<()> {
        match lock(&self.target).as_ref() {
            Some(target) => target.post_message(data, target_origin),
            None => {
                trace!("posting into a frame with no document");
                Ok(())
            }
        }
    }
}

#[derive(Default)]
struct Page {
    mounted: Vec<FrameSpec>,
    apps: Vec<(String, SimulatedApp)>,
}

/// A host page that keeps mounted frames in memory.
pub struct SimulatedHost {
    window: MessageBus,
    behavior: AppBehavior,
    page: Arc<Mutex<Page>>,
}

impl SimulatedHost {
    /// Creates a page whose own window is `window`.
    pub fn new(window: MessageBus, behavior: AppBehavior) -> Self {
        Self {
            window,
            behavior,
            page: Arc::new(Mutex::new(Page::default())),
        }
    }

    /// Ids of the mounted frames, in mount order.
    pub fn mounted_ids(&self) -> Vec<String> {
        lock(&self.page)
            .mounted
            .iter()
            .map(|spec| spec.id.clone())
            .collect()
    }

    /// Description of a mounted frame.
    pub fn frame(&self, id: &str) -> Option<FrameSpec> {
        lock(&self.page)
            .mounted
            .iter()
            .find(|spec| spec.id == id)
            .cloned()
    }

    /// The most recently launched app still running.
    pub fn app(&self) -> Option<SimulatedApp> {
        lock(&self.page).apps.last().map(|(_, app)| app.clone())
    }

    /// The app running in frame `id`.
    pub fn app_in(&self, id: &str) -> Option<SimulatedApp> {
        lock(&self.page)
            .apps
            .iter()
            .find(|(frame, _)| frame == id)
            .map(|(_, app)| app.clone())
    }
}

impl HostEnvironment for SimulatedHost {
    fn mount(&self, spec: &FrameSpec) -> Result<Arc<dyn ChildFrame>, HostError> {
        let mut page = lock(&self.page);
        if page.mounted.iter().any(|mounted| mounted.id == spec.id) {
            return Err(HostError(format!("element #{} already exists", spec.id)));
        }
        page.mounted.push(spec.clone());
        Ok(Arc::new(SimulatedFrame {
            id: spec.id.clone(),
            host_window: self.window.clone(),
            behavior: self.behavior.clone(),
            window: Arc::new(FrameWindow::default()),
            page: Arc::clone(&self.page),
        }))
    }
}

struct SimulatedFrame {
    id: String,
    host_window: MessageBus,
    behavior: AppBehavior,
    window: Arc<FrameWindow>,
    page: Arc<Mutex<Page>>,
}

impl ChildFrame for SimulatedFrame {
    fn id(&self) -> &str {
        &self.id
    }

    fn load_url<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<(), LoadError>> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            if let Some(reason) = &self.behavior.load_error {
                return Err(LoadError::new(url.as_str(), reason.clone()));
            }

            let (app, app_window) = SimulatedApp::launch(url, &self.host_window, &self.behavior)?;
            *lock(&self.window.target) = Some(WindowTarget::new(
                app_window,
                self.host_window.origin(),
            ));
            lock(&self.page).apps.push((self.id.clone(), app));
            Ok(())
        })
    }

    fn content_window(&self) -> Arc<dyn MessageTarget> {
        self.window.clone()
    }

    fn remove(&self) {
        *lock(&self.window.target) = None;
        let app = {
            let mut page = lock(&self.page);
            page.mounted.retain(|spec| spec.id != self.id);
            page.apps
                .iter()
                .position(|(frame, _)| *frame == self.id)
                .map(|index| page.apps.remove(index).1)
        };
        if let Some(app) = app {
            app.shutdown();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(behavior: AppBehavior) -> SimulatedHost {
        SimulatedHost::new(MessageBus::new("https://host.test"), behavior)
    }

    fn spec(id: &str) -> FrameSpec {
        FrameSpec::for_meeting(id, &Default::default())
    }

    #[test]
    fn duplicate_frame_ids_are_refused() {
        let host = host(AppBehavior::default());
        host.mount(&spec("a")).unwrap();
        assert!(host.mount(&spec("a")).is_err());
        assert_eq!(host.mounted_ids(), vec!["RoomLink-a".to_string()]);
    }

    #[tokio::test]
    async fn load_launches_app_and_remove_stops_it() {
        let host = host(AppBehavior::default());
        let frame = host.mount(&spec("demo")).unwrap();
        let url = Url::parse("https://app.test/j/demo?embedded=1").unwrap();

        frame.load_url(&url).await.unwrap();
        let app = host.app_in("RoomLink-demo").unwrap();
        assert!(app.messenger().is_listening());
        assert_eq!(app.messenger().correlation_id(), "demo");

        frame.remove();
        assert!(host.mounted_ids().is_empty());
        assert!(host.app().is_none());
        assert!(!app.messenger().is_listening());
    }

    #[tokio::test]
    async fn failing_load_reports_reason() {
        let host = host(AppBehavior::default().failing_load("offline"));
        let frame = host.mount(&spec("demo")).unwrap();
        let url = Url::parse("https://app.test/j/demo").unwrap();

        let err = frame.load_url(&url).await.unwrap_err();
        assert_eq!(err.reason, "offline");
        assert!(host.app().is_none());
    }

    #[test]
    fn default_replies_reflect_session_url() {
        let params: HashMap<String, String> =
            [("un".to_string(), "Ada".to_string())].into_iter().collect();
        assert_eq!(default_reply("getUserName", &params), json!({"name": "Ada"}));
        assert_eq!(default_reply("getUserLocale", &params), json!({"locale": "en"}));
        assert_eq!(default_reply("blockParticipant", &params), json!({}));
    }

    #[test]
    fn frame_window_without_document_drops_messages() {
        let window = FrameWindow::default();
        assert!(window.post_message(json!({}), "*").is_ok());
    }
}
