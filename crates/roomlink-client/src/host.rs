//! Boundary to the page hosting the child frame.
//!
//! The room never builds elements itself: it describes the frame it wants
//! with a [`FrameSpec`] and asks a [`HostEnvironment`] to mount it. The
//! mounted [`ChildFrame`] is then navigated and exposes the postable window
//! of the embedded app.

use std::sync::Arc;

use serde::Serialize;
use url::Url;

use crate::config::FrameSettings;
use crate::error::{HostError, LoadError};
use crate::messenger::BoxFuture;
use crate::transport::MessageTarget;

/// Prefix of every frame id; the meeting alias follows.
pub const FRAME_ID_PREFIX: &str = "RoomLink-";

/// Permissions delegated to the child frame.
pub const FRAME_ALLOW: &str = "camera; microphone; display-capture; autoplay; clipboard-write; clipboard-read; fullscreen";

/// Description of the child frame element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameSpec {
    pub id: String,
    pub allow: String,
    pub border: String,
    pub width: String,
    pub height: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

impl FrameSpec {
    /// Frame for the meeting `meeting_id` with the given geometry.
    pub fn for_meeting(meeting_id: &str, settings: &FrameSettings) -> Self {
        Self {
            id: format!("{FRAME_ID_PREFIX}{meeting_id}"),
            allow: FRAME_ALLOW.to_string(),
            border: "0".to_string(),
            width: settings.width.clone(),
            height: settings.height.clone(),
            style: settings.style.clone(),
        }
    }
}

/// A mounted child frame.
pub trait ChildFrame: Send + Sync {
    /// Element id.
    fn id(&self) -> &str;

    /// Navigates the frame and resolves once it has loaded.
    fn load_url<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<(), LoadError>>;

    /// The frame's window, to post messages into.
    fn content_window(&self) -> Arc<dyn MessageTarget>;

    /// Detaches the frame from the page.
    fn remove(&self);
}

/// The page the room is embedded into.
pub trait HostEnvironment: Send + Sync {
    /// Creates the element described by `spec` and attaches it.
    fn mount(&self, spec: &FrameSpec) -> Result<Arc<dyn ChildFrame>, HostError>;
}
