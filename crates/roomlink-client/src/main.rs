//! roomlink CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use tracing::Level;

use roomlink_client::cli::{Cli, Command, ConfigAction};
use roomlink_client::commands;
use roomlink_client::config::RoomConfig;
use roomlink_client::error::{RoomError, RoomResult};
use roomlink_core::{MESSENGER_TARGET, TracingConfig, TracingOutputFormat, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let tracing_config = match (cli.log_json, cli.debug) {
        (true, true) => TracingConfig::structured()
            .with_level(Level::DEBUG)
            .with_target(MESSENGER_TARGET, Level::TRACE),
        (true, false) => TracingConfig::structured(),
        (false, true) => TracingConfig::cli_debug().with_target(MESSENGER_TARGET, Level::TRACE),
        (false, false) => TracingConfig::default()
            .with_level(Level::WARN)
            .with_format(TracingOutputFormat::Compact),
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("warning: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> RoomResult<()> {
    let config = if let Some(ref path) = cli.config {
        RoomConfig::load_from(path).map_err(RoomError::Config)?
    } else {
        RoomConfig::load().map_err(RoomError::Config)?
    };

    match cli.command {
        Some(Command::Simulate(args)) => commands::simulate::run(&config, &args).await,
        Some(Command::Config { action }) => match action {
            ConfigAction::Dump => commands::config::dump(&config),
            ConfigAction::Validate => commands::config::validate(&config),
            ConfigAction::Path => commands::config::path(),
        },
        None => {
            println!("roomlink - host-side control of an embedded meeting room");
            println!();
            println!("Run 'roomlink --help' for usage information.");
            println!();
            println!("Quick start:");
            println!("  1. Try the protocol against a simulated app: roomlink simulate --block abc");
            println!("  2. Point it at your meeting: roomlink simulate --meeting-url https://<host>/j/<alias>");
            Ok(())
        }
    }
}
