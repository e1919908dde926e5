//! AgentPay Settings
//!
//! Configuration file shared by the daemon and the CLI.
//!
//! ## Sections
//!
//! - `sync`: reconciliation pass interval and tuning
//! - `provider`: chain indexer endpoint and retry policy
//! - `router`: settlement layer selection
//! - `store`: snapshot file location
//!
//! ## Usage
//!
//! ```no_run
//! use agentpay_settings::Settings;
//!
//! let mut settings = Settings::load_or_default()?;
//! settings.router.channel_enabled = true;
//! settings.save()?;
//! # Ok::<(), agentpay_settings::SettingsError>(())
//! ```

mod config;

pub use config::{
    ProviderSettings, RetrySettings, RouterSettings, RouterModeSetting, Settings, StoreSettings,
    SyncSettings,
};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings: {0}")]
    ReadError(std::io::Error),

    #[error("Failed to write settings: {0}")]
    WriteError(std::io::Error),

    #[error("Failed to parse settings: {0}")]
    ParseError(serde_json::Error),

    #[error("Failed to create config directory: {0}")]
    CreateDirError(std::io::Error),
}

pub type Result<T> = std::result::Result<T, SettingsError>;

/// Per-user configuration directory (`$AGENTPAY_HOME`, else `~/.agentpay`)
pub fn default_config_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("AGENTPAY_HOME") {
        return PathBuf::from(dir);
    }
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join(".agentpay")
}

/// Get the default settings file path
pub fn default_settings_path() -> PathBuf {
    default_config_dir().join("settings.json")
}
