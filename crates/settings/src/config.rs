//! Configuration types

use std::path::PathBuf;
use std::time::Duration;

use agentpay_chain::{HttpProviderConfig, RetryPolicy};
use agentpay_settlement::{RouterConfig, SettlementMode};
use agentpay_sync::SyncConfig;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{default_config_dir, default_settings_path, Result, SettingsError};

/// Main settings structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub provider: ProviderSettings,

    #[serde(default)]
    pub router: RouterSettings,

    #[serde(default)]
    pub store: StoreSettings,

    /// Custom settings file path (not serialized)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

impl Settings {
    /// Load settings from the default path, or create defaults
    pub fn load_or_default() -> Result<Self> {
        Self::load_from(&default_settings_path())
    }

    /// Load settings from a specific path, or create defaults
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).map_err(SettingsError::ReadError)?;
            let mut settings: Settings =
                serde_json::from_str(&content).map_err(SettingsError::ParseError)?;
            settings.config_path = Some(path.clone());
            info!("Loaded settings from {:?}", path);
            Ok(settings)
        } else {
            let mut settings = Self::default();
            settings.config_path = Some(path.clone());
            Ok(settings)
        }
    }

    /// Save settings to the configured path
    pub fn save(&self) -> Result<()> {
        let path = self.config_path.clone().unwrap_or_else(default_settings_path);
        self.save_to(&path)
    }

    /// Save settings to a specific path (write to tmp, then rename)
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(SettingsError::CreateDirError)?;
            }
        }

        let content = serde_json::to_string_pretty(self).map_err(SettingsError::ParseError)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content).map_err(SettingsError::WriteError)?;
        std::fs::rename(&tmp, path).map_err(SettingsError::WriteError)?;
        info!("Saved settings to {:?}", path);
        Ok(())
    }

    pub fn sync_config(&self) -> SyncConfig {
        self.sync.to_config()
    }

    pub fn provider_config(&self) -> HttpProviderConfig {
        self.provider.to_config()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.provider.retry.to_policy()
    }

    pub fn router_config(&self) -> RouterConfig {
        self.router.to_config()
    }

    /// Snapshot file the store persists to
    pub fn snapshot_path(&self) -> PathBuf {
        self.store
            .snapshot_path
            .clone()
            .unwrap_or_else(|| default_config_dir().join("store.json"))
    }
}

/// Reconciliation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_parallel_lookups")]
    pub max_parallel_lookups: usize,

    #[serde(default = "default_confirmation_threshold")]
    pub confirmation_threshold: u64,

    /// Stale-lock takeover window
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,

    #[serde(default = "default_traceback_depth")]
    pub traceback_depth: usize,

    #[serde(default = "default_retained_checkpoints")]
    pub retained_checkpoints: usize,
}

fn default_interval_secs() -> u64 {
    20
}

fn default_parallel_lookups() -> usize {
    5
}

fn default_confirmation_threshold() -> u64 {
    1
}

fn default_lock_timeout_secs() -> u64 {
    900
}

fn default_traceback_depth() -> usize {
    5
}

fn default_retained_checkpoints() -> usize {
    20
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_parallel_lookups: default_parallel_lookups(),
            confirmation_threshold: default_confirmation_threshold(),
            lock_timeout_secs: default_lock_timeout_secs(),
            traceback_depth: default_traceback_depth(),
            retained_checkpoints: default_retained_checkpoints(),
        }
    }
}

impl SyncSettings {
    pub fn to_config(&self) -> SyncConfig {
        SyncConfig {
            interval: Duration::from_secs(self.interval_secs.max(1)),
            max_parallel_lookups: self.max_parallel_lookups.max(1),
            confirmation_threshold: self.confirmation_threshold,
            lock_timeout: Duration::from_secs(self.lock_timeout_secs),
            traceback_depth: self.traceback_depth,
            retained_checkpoints: self.retained_checkpoints,
        }
    }
}

/// Chain indexer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub project_id: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub retry: RetrySettings,
}

fn default_base_url() -> String {
    "https://cardano-preprod.blockfrost.io/api/v0".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            project_id: String::new(),
            request_timeout_secs: default_request_timeout(),
            retry: RetrySettings::default(),
        }
    }
}

impl ProviderSettings {
    pub fn to_config(&self) -> HttpProviderConfig {
        HttpProviderConfig {
            base_url: self.base_url.clone(),
            project_id: self.project_id.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

/// Backoff for transient provider failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetrySettings {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

/// Settlement router settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterSettings {
    #[serde(default)]
    pub channel_enabled: bool,

    #[serde(default)]
    pub mode: RouterModeSetting,

    /// Timeout for channel node requests
    #[serde(default = "default_channel_timeout")]
    pub channel_timeout_secs: u64,
}

fn default_channel_timeout() -> u64 {
    10
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            channel_enabled: false,
            mode: RouterModeSetting::default(),
            channel_timeout_secs: default_channel_timeout(),
        }
    }
}

impl RouterSettings {
    pub fn to_config(&self) -> RouterConfig {
        RouterConfig {
            channel_enabled: self.channel_enabled,
            mode: match self.mode {
                RouterModeSetting::Mock => SettlementMode::Mock,
                RouterModeSetting::Live => SettlementMode::Live,
            },
        }
    }

    pub fn channel_timeout(&self) -> Duration {
        Duration::from_secs(self.channel_timeout_secs)
    }
}

/// Router mode as written in the settings file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RouterModeSetting {
    /// Record submissions in memory
    #[default]
    Mock,
    Live,
}

/// Persistence settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSettings {
    /// JSON snapshot file; defaults to `store.json` in the config directory
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
}
