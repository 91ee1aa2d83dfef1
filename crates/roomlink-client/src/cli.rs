//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// roomlink - drive an embedded meeting room from the host side
#[derive(Debug, Parser)]
#[command(name = "roomlink")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "ROOMLINK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Join a simulated room in-process and exercise the protocol
    Simulate(SimulateArgs),

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Options of `roomlink simulate`.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct SimulateArgs {
    /// Meeting URL to join (overrides the configuration)
    #[arg(long, env = "ROOMLINK_MEETING_URL")]
    pub meeting_url: Option<String>,

    /// Guest display name (overrides the configuration)
    #[arg(long)]
    pub name: Option<String>,

    /// Participant to block once joined
    #[arg(long)]
    pub block: Option<String>,

    /// Chat message to send once joined
    #[arg(long)]
    pub chat: Option<String>,

    /// Never answer the handshake, to observe the timeout
    #[arg(long)]
    pub silent: bool,
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}
