//! Log output for roomlink.
//!
//! The library crates only emit `tracing` events. Whoever embeds them picks
//! a sink by calling [`init_tracing`] once. The filter it installs keeps
//! third-party crates at `warn` and raises the roomlink crates to the
//! configured level; narrower targets such as the messenger can be raised
//! further on their own, since per-envelope traffic is logged at `trace`.
//!
//! The JSON format flattens event fields to the top level, so the
//! `command`, `correlation_id` and `request_id` fields the messenger
//! attaches can be filtered on directly by a log pipeline.

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

/// Targets raised to the configured level.
pub const ROOMLINK_TARGETS: &[&str] = &[
    "roomlink",
    "roomlink_core",
    "roomlink_protocol",
    "roomlink_client",
];

/// Target of the per-envelope messenger logs.
pub const MESSENGER_TARGET: &str = "roomlink_client::messenger";

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("a global log subscriber is already installed: {0}")]
    Install(#[from] tracing_subscriber::util::TryInitError),
}

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingOutputFormat {
    /// Multi-line, for reading in a terminal.
    #[default]
    Pretty,
    /// One line per event, without timestamps.
    Compact,
    /// One JSON object per event, fields flattened.
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    level: Level,
    format: TracingOutputFormat,
    locations: bool,
    targets: Vec<(String, Level)>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: TracingOutputFormat::Pretty,
            locations: false,
            targets: Vec::new(),
        }
    }
}

impl TracingConfig {
    /// Debug level, compact lines with source locations.
    #[must_use]
    pub fn cli_debug() -> Self {
        Self {
            level: Level::DEBUG,
            format: TracingOutputFormat::Compact,
            locations: true,
            targets: Vec::new(),
        }
    }

    /// JSON lines for hosts that ship logs to a collector.
    #[must_use]
    pub fn structured() -> Self {
        Self {
            format: TracingOutputFormat::Json,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingOutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets a level for one target, overriding the crate-wide one.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>, level: Level) -> Self {
        let target = target.into();
        self.targets.retain(|(existing, _)| *existing != target);
        self.targets.push((target, level));
        self
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn format(&self) -> TracingOutputFormat {
        self.format
    }

    /// The filter directive used when `RUST_LOG` is unset.
    pub fn directive(&self) -> String {
        let mut parts = vec!["warn".to_string()];
        parts.extend(
            ROOMLINK_TARGETS
                .iter()
                .map(|target| format!("{target}={}", directive_level(self.level))),
        );
        parts.extend(
            self.targets
                .iter()
                .map(|(target, level)| format!("{target}={}", directive_level(*level))),
        );
        parts.join(",")
    }

    fn env_filter(&self) -> Result<EnvFilter, TracingError> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => Ok(EnvFilter::try_new(self.directive())?),
        }
    }
}

fn directive_level(level: Level) -> String {
    level.to_string().to_ascii_lowercase()
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over the
/// configured levels.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let filter = config.env_filter()?;

    let output = match config.format {
        TracingOutputFormat::Pretty => fmt::layer()
            .pretty()
            .with_file(config.locations)
            .with_line_number(config.locations)
            .boxed(),
        TracingOutputFormat::Compact => fmt::layer()
            .compact()
            .without_time()
            .with_file(config.locations)
            .with_line_number(config.locations)
            .boxed(),
        TracingOutputFormat::Json => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .with_file(config.locations)
            .with_line_number(config.locations)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets() {
        let default = TracingConfig::default();
        assert_eq!(default.level(), Level::INFO);
        assert_eq!(default.format(), TracingOutputFormat::Pretty);

        let debug = TracingConfig::cli_debug();
        assert_eq!(debug.level(), Level::DEBUG);
        assert_eq!(debug.format(), TracingOutputFormat::Compact);

        let structured = TracingConfig::structured().with_level(Level::DEBUG);
        assert_eq!(structured.format(), TracingOutputFormat::Json);
        assert_eq!(structured.level(), Level::DEBUG);
    }

    #[test]
    fn directive_raises_only_roomlink_crates() {
        let directive = TracingConfig::default().with_level(Level::DEBUG).directive();
        assert_eq!(
            directive,
            "warn,roomlink=debug,roomlink_core=debug,roomlink_protocol=debug,roomlink_client=debug"
        );
        assert!(EnvFilter::try_new(&directive).is_ok());
    }

    #[test]
    fn target_overrides_come_last_and_replace_each_other() {
        let directive = TracingConfig::default()
            .with_target(MESSENGER_TARGET, Level::DEBUG)
            .with_target(MESSENGER_TARGET, Level::TRACE)
            .directive();
        assert!(directive.ends_with(",roomlink_client=info,roomlink_client::messenger=trace"));
        assert_eq!(directive.matches(MESSENGER_TARGET).count(), 1);
    }
}
