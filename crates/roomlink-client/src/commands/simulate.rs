//! `roomlink simulate`: a full session against the in-process app.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::info;

use roomlink_core::UserInfo;

use crate::cli::SimulateArgs;
use crate::config::RoomConfig;
use crate::emitter::WILDCARD_EVENT;
use crate::error::{RoomError, RoomResult};
use crate::room::{Room, RoomDeps};
use crate::simulator::{AppBehavior, SimulatedHost};
use crate::transport::MessageBus;

/// Meeting joined when neither the configuration nor the flags name one.
pub const DEMO_MEETING_URL: &str = "https://app.localhost/j/demo";

/// Origin of the simulated host page.
pub const DEMO_HOST_ORIGIN: &str = "https://host.localhost";

/// How long to wait for the demo event to come back.
const EVENT_WAIT: Duration = Duration::from_secs(2);

/// Applies the command-line overrides to the loaded configuration.
pub fn effective_config(config: &RoomConfig, args: &SimulateArgs) -> RoomConfig {
    let mut config = config.clone();
    if let Some(url) = &args.meeting_url {
        config.meeting_url = url.clone();
    } else if config.meeting_url.is_empty() {
        config.meeting_url = DEMO_MEETING_URL.to_string();
    }
    if let Some(name) = &args.name {
        config.user = UserInfo {
            token: None,
            ..config.user
        }
        .with_name(name);
    }
    config
}

/// Joins, runs a few commands, relays one event and disposes the room.
pub async fn run(config: &RoomConfig, args: &SimulateArgs) -> RoomResult<()> {
    let config = effective_config(config, args);
    config.validate().map_err(RoomError::Config)?;

    let behavior = if args.silent {
        AppBehavior::default().silent()
    } else {
        AppBehavior::default()
    };
    let window = MessageBus::new(DEMO_HOST_ORIGIN);
    let host = Arc::new(SimulatedHost::new(window.clone(), behavior));
    let room = Room::new(config, RoomDeps::new(host.clone(), window))?;

    let (tx, mut events) = mpsc::unbounded_channel();
    room.on(WILDCARD_EVENT, move |event| {
        let _ = tx.send(event.clone());
    });

    let ready = match room.join().await {
        Ok(ready) => ready,
        Err(err) => {
            room.dispose().await?;
            return Err(err);
        }
    };
    print_line("ready", ready);
    info!(meeting_id = %room.meeting_id(), "simulated room joined");

    print_line("userName", room.get_user_name().await?);
    print_line("participants", room.get_participants().await?);
    if let Some(id) = &args.block {
        print_line("blockParticipant", room.block_participant(id.as_str()).await?);
    }
    if let Some(message) = &args.chat {
        print_line("sendChatMessage", room.send_chat_message(message.as_str()).await?);
    }

    if let Some(app) = host.app() {
        app.emit_event(
            "participantJoined",
            json!({ "id": "sim-1", "name": "Simulated guest" }),
        )?;
        match tokio::time::timeout(EVENT_WAIT, events.recv()).await {
            Ok(Some(event)) => print_line("event", event),
            _ => print_line("event", Value::Null),
        }
    }

    room.dispose().await?;
    print_line("state", Value::String(room.state().to_string()));
    Ok(())
}

fn print_line(kind: &str, value: Value) {
    println!("{}", json!({ "kind": kind, "value": value }));
}
