use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

pub const CONFIG_FILE: &str = "config.json";

fn default_table() -> String {
    "tasks".into()
}

fn default_bucket() -> String {
    "task-files".into()
}

fn default_coach_model() -> String {
    crate::sync::coach::DEFAULT_MODEL.into()
}

fn default_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct FocusConfig {
    /// Base URL of the hosted backend (REST and storage).
    #[serde(default)]
    pub store_url: String,
    /// Public (anon) API key for the backend.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_table")]
    pub tasks_table: String,
    #[serde(default = "default_bucket")]
    pub attachments_bucket: String,
    /// Identifier of the signed-in user, resolved by the auth provider.
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub coach_api_key: Option<String>,
    #[serde(default = "default_coach_model")]
    pub coach_model: String,
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub reject_stale_writes: bool,
    #[serde(default)]
    pub debug_logging: bool,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            store_url: String::new(),
            api_key: String::new(),
            tasks_table: default_table(),
            attachments_bucket: default_bucket(),
            user_id: None,
            coach_api_key: None,
            coach_model: default_coach_model(),
            request_timeout_secs: default_timeout(),
            reject_stale_writes: true,
            debug_logging: false,
        }
    }
}

impl FocusConfig {
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("focusai")
    }

    pub fn default_path() -> PathBuf {
        Self::config_dir().join(CONFIG_FILE)
    }

    /// Load the config file (if present) and apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file(&Self::default_path())?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// A missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("FOCUSAI_STORE_URL") {
            self.store_url = v;
        }
        if let Some(v) = var("FOCUSAI_API_KEY") {
            self.api_key = v;
        }
        if let Some(v) = var("FOCUSAI_USER") {
            self.user_id = Some(v);
        }
        if let Some(v) = var("FOCUSAI_COACH_KEY") {
            self.coach_api_key = Some(v);
        }
        if let Some(v) = var("FOCUSAI_DEBUG") {
            self.debug_logging = matches!(v.as_str(), "1" | "true" | "yes");
        }
        if let Some(v) = var("FOCUSAI_TIMEOUT_SECS") {
            match v.parse() {
                Ok(secs) => self.request_timeout_secs = secs,
                Err(e) => log::warn!("Invalid FOCUSAI_TIMEOUT_SECS {:?}: {}", v, e),
            }
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Ensure the remote backend settings are present.
    pub fn require_store(&self) -> Result<(), ConfigError> {
        if self.store_url.trim().is_empty() {
            return Err(ConfigError::Missing("store_url"));
        }
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::Missing("api_key"));
        }
        Ok(())
    }
}
