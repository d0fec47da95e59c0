use clap::Subcommand;
use focusclock_core::{Config, ConfigError};

use crate::common::CliResult;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a config value
    Get {
        /// Dotted key (e.g. "focus.default_minutes")
        key: String,
    },
    /// Set a config value
    Set {
        /// Dotted key
        key: String,
        /// New value ("none" clears an optional value)
        value: String,
    },
    /// Print the whole configuration
    Show,
}

pub fn run(action: ConfigAction) -> CliResult {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key).ok_or(ConfigError::UnknownKey(key))?;
            println!("{value}");
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            println!("ok");
        }
        ConfigAction::Show => {
            let config = Config::load()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }
    Ok(())
}
