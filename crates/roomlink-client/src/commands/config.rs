//! Configuration commands.

use crate::config::RoomConfig;
use crate::error::{RoomError, RoomResult};

/// Dump the current configuration to stdout.
pub fn dump(config: &RoomConfig) -> RoomResult<()> {
    let toml_str = config.to_toml_string().map_err(RoomError::Config)?;
    println!("# config.toml ({})", RoomConfig::default_path().display());
    println!("{}", toml_str);

    Ok(())
}

/// Validate the configuration.
pub fn validate(config: &RoomConfig) -> RoomResult<()> {
    config.validate().map_err(RoomError::Config)?;
    let meeting = config.meeting()?;
    println!(
        "Configuration is valid: meeting {} at {}.",
        meeting.meeting_id(),
        meeting.origin()
    );
    Ok(())
}

/// Show the configuration file path.
pub fn path() -> RoomResult<()> {
    let config_path = RoomConfig::default_path();
    println!("config: {}", config_path.display());
    Ok(())
}
