mod config;
pub mod database;
pub mod migrations;
pub mod records;

pub use config::{
    BlockingConfig, Config, FocusConfig, GateConfig, NotificationsConfig, RatePolicyKind,
    SyncConfig,
};
pub use database::RecordStore;
pub use records::{
    normalize_identifier, ClearScope, DailySummary, DataSnapshot, InterventionRecord, Settings,
    MINUTES_SAVED_PER_INTERVENTION,
};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the data directory.
///
/// `FOCUSGUARD_HOME` wins when set. Otherwise `~/.config/focusguard[-dev]/`
/// based on FOCUSGUARD_ENV (set FOCUSGUARD_ENV=dev for the development
/// directory).
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("FOCUSGUARD_HOME") {
        Some(home) if !home.is_empty() => PathBuf::from(home),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env =
                std::env::var("FOCUSGUARD_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("focusguard-dev")
            } else {
                base_dir.join("focusguard")
            }
        }
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
