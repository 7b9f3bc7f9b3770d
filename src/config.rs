//! Configuration loaded from `config.toml`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    constants::FILE_NAMES,
    error::{PulseError, Result},
    storage,
};

pub const ENV_CLOUD_URL: &str = "PULSE_SUPABASE_URL";
pub const ENV_CLOUD_KEY: &str = "PULSE_SUPABASE_KEY";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    /// Overrides where habit and reminder data live.
    pub data_dir: Option<PathBuf>,
    /// Hosted backend used for sign-in and sync.
    pub cloud: CloudConfig,
    /// Remote push settings.
    pub sync: SyncConfig,
    /// Reminder polling and notification consent.
    pub reminders: RemindersConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Project base URL, e.g. `https://xyz.supabase.co`. Empty disables cloud features.
    pub url: String,
    /// Public anon key sent as `apikey`.
    pub anon_key: String,
    /// Table holding one row per user.
    pub table: String,
    /// Loopback port for the OAuth callback.
    pub callback_port: u16,
    /// OAuth provider name.
    pub provider: String,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            anon_key: String::new(),
            table: "pulse_user_data".to_string(),
            callback_port: 54321,
            provider: "google".to_string(),
        }
    }
}

impl CloudConfig {
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty() && !self.anon_key.trim().is_empty()
    }

    pub fn base_url(&self) -> &str {
        self.url.trim().trim_end_matches('/')
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Quiet period before a local change is pushed.
    pub debounce_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { debounce_ms: 600 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemindersConfig {
    pub poll_secs: u64,
    pub notifications: NotificationPolicy,
}

impl Default for RemindersConfig {
    fn default() -> Self {
        Self {
            poll_secs: 30,
            notifications: NotificationPolicy::Ask,
        }
    }
}

/// Whether reminder notifications may be shown without asking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPolicy {
    #[default]
    Ask,
    Granted,
    Denied,
}

impl PulseConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| PulseError::Config(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| PulseError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    /// Reads the explicit path if given, else the default location when present.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        debug!(cloud = config.cloud.is_configured(), "configuration loaded");
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_CLOUD_URL).filter(|v| !v.trim().is_empty()) {
            self.cloud.url = url;
        }
        if let Some(key) = lookup(ENV_CLOUD_KEY).filter(|v| !v.trim().is_empty()) {
            self.cloud.anon_key = key;
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    storage::get_config_dir().map(|dir| dir.join(FILE_NAMES.config))
}
