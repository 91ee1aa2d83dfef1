//! Room configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/roomlink/config.toml` by default:
//!
//! ```toml
//! meeting_url = "https://app.example.com/j/standup"
//! init_timeout_secs = 60
//!
//! [user]
//! name = "Ada"
//! locale = "en"
//!
//! [frame]
//! width = "100%"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use roomlink_core::{MeetingUrl, MeetingUrlError, UserInfo};

/// Default handshake timeout, in seconds.
pub const DEFAULT_INIT_TIMEOUT_SECS: u64 = 20;

/// Handshake timeout used by the embedded-room preset, in seconds.
pub const EMBEDDED_INIT_TIMEOUT_SECS: u64 = 60;

/// Configuration of one embedded room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Meeting URL, `https://<host>/j/<alias>`.
    pub meeting_url: String,

    /// Pre-encoded UI configuration, passed through as the `ui` query
    /// parameter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ui: Option<String>,

    /// Seconds to wait for `app:ready` after `initialize`.
    pub init_timeout_secs: u64,

    /// Seconds to wait for any command reply. Unset waits forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,

    /// Who joins.
    pub user: UserInfo,

    /// Child frame geometry.
    pub frame: FrameSettings,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            meeting_url: String::new(),
            ui: None,
            init_timeout_secs: DEFAULT_INIT_TIMEOUT_SECS,
            request_timeout_secs: None,
            user: UserInfo::default(),
            frame: FrameSettings::default(),
        }
    }
}

/// Size and style of the child frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameSettings {
    /// CSS width.
    pub width: String,
    /// CSS height.
    pub height: String,
    /// Extra inline style.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            width: "640px".to_string(),
            height: "450px".to_string(),
            style: None,
        }
    }
}

impl RoomConfig {
    /// Creates a config for `meeting_url` with default settings.
    pub fn new(meeting_url: impl Into<String>) -> Self {
        Self {
            meeting_url: meeting_url.into(),
            ..Self::default()
        }
    }

    /// Preset for a full embedded room: 60 second handshake.
    pub fn embedded(meeting_url: impl Into<String>) -> Self {
        Self::new(meeting_url).with_init_timeout_secs(EMBEDDED_INIT_TIMEOUT_SECS)
    }

    /// Builder: set the user.
    pub fn with_user(mut self, user: UserInfo) -> Self {
        self.user = user;
        self
    }

    /// Builder: set the frame geometry.
    pub fn with_frame(mut self, frame: FrameSettings) -> Self {
        self.frame = frame;
        self
    }

    /// Builder: set the encoded UI configuration.
    pub fn with_ui(mut self, ui: impl Into<String>) -> Self {
        self.ui = Some(ui.into());
        self
    }

    /// Builder: set the handshake timeout.
    pub fn with_init_timeout_secs(mut self, secs: u64) -> Self {
        self.init_timeout_secs = secs;
        self
    }

    /// Builder: set the reply timeout.
    pub fn with_request_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// Handshake timeout.
    pub fn init_timeout(&self) -> Duration {
        Duration::from_secs(self.init_timeout_secs)
    }

    /// Reply timeout, if any.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Parses the meeting URL.
    pub fn meeting(&self) -> Result<MeetingUrl, MeetingUrlError> {
        MeetingUrl::parse(&self.meeting_url)
    }

    /// Checks that the configuration can be used to join.
    pub fn validate(&self) -> Result<(), String> {
        self.meeting().map_err(|e| e.to_string())?;
        if self.init_timeout_secs == 0 {
            return Err("init_timeout_secs must be greater than zero".to_string());
        }
        if self.request_timeout_secs == Some(0) {
            return Err("request_timeout_secs must be greater than zero".to_string());
        }
        Ok(())
    }

    /// Parses a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| format!("failed to parse config: {}", e))
    }

    /// Loads configuration from the default path, or defaults if missing.
    pub fn load() -> Result<Self, String> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config {}: {}", path.display(), e))?;
        Self::from_toml_str(&content)
    }

    /// Serializes to TOML.
    pub fn to_toml_string(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("failed to serialize config: {}", e))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("roomlink")
    }
}
