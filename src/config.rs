use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_API_URL: &str = "http://localhost:3000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// Runtime config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the BMail web server, without the `/api` suffix.
    pub api_url: String,
    /// Sender name put on outgoing mail. `Me` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Mirror the resident mail set into the local SQLite cache.
    pub cache: bool,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_url: DEFAULT_API_URL.to_string(),
            display_name: None,
            cache: true,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Host part of `api_url`, used to scope keyring entries.
    pub fn api_host(&self) -> &str {
        let rest = self
            .api_url
            .split_once("://")
            .map_or(self.api_url.as_str(), |(_, rest)| rest);
        rest.split('/').next().unwrap_or(rest)
    }

    /// Resolve config: file (if any) over defaults, then env vars on top.
    pub fn resolve() -> Result<Self> {
        let mut config = Self::load()?.unwrap_or_default();
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Read the config file. A missing file is `Ok(None)`.
    pub fn load() -> Result<Option<Self>> {
        let path = config_path();
        if !path.exists() {
            log::debug!("No config file at {}", path.display());
            return Ok(None);
        }
        let data =
            fs::read_to_string(&path).map_err(|e| Error::Config(format!("read config: {e}")))?;
        Self::parse(&data).map(Some)
    }

    pub fn parse(data: &str) -> Result<Self> {
        serde_json::from_str(data).map_err(|e| Error::Config(format!("parse config: {e}")))
    }

    pub fn save(&self) -> Result<()> {
        let path = config_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("create config dir: {e}")))?;
        }
        let data = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("serialize config: {e}")))?;
        fs::write(&path, data).map_err(|e| Error::Config(format!("write config: {e}")))
    }

    /// Overlay `BMAIL_*` variables. Unparseable values are ignored with a warning.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("BMAIL_API_URL").filter(|v| !v.trim().is_empty()) {
            self.api_url = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(name) = var("BMAIL_DISPLAY_NAME").filter(|v| !v.trim().is_empty()) {
            self.display_name = Some(name);
        }
        if let Some(cache) = var("BMAIL_CACHE") {
            self.cache = cache == "true" || cache == "1";
        }
        if let Some(timeout) = var("BMAIL_TIMEOUT_SECS") {
            match timeout.parse() {
                Ok(secs) => self.request_timeout_secs = secs,
                Err(e) => log::warn!("Ignoring BMAIL_TIMEOUT_SECS={timeout:?}: {e}"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// File paths
// ---------------------------------------------------------------------------

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bmail")
}

fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Directory holding `cache.db`.
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bmail")
}
