//! On-disk storage: the SQLite database, the TOML config and the data
//! directory both live in.

mod config;
pub mod database;

pub use config::{Config, CountdownConfig, FocusConfig, RemoteConfig, TickerConfig};
pub use database::Database;

use std::path::PathBuf;

/// Returns the focusclock data directory, creating it if needed.
///
/// `FOCUSCLOCK_HOME` overrides the location outright. Otherwise it is
/// `~/.config/focusclock/`, or `~/.config/focusclock-dev/` when
/// `FOCUSCLOCK_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let dir = match std::env::var_os("FOCUSCLOCK_HOME") {
        Some(home) => PathBuf::from(home),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env =
                std::env::var("FOCUSCLOCK_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("focusclock-dev")
            } else {
                base_dir.join("focusclock")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
