//! Configuration management for tvproxy
//!
//! Handles config file loading/saving. Config is stored at
//! ~/.config/tvproxy/config.toml; every field has a sensible default so a
//! missing file just works.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::proxy::governor::DEFAULT_HOST_CAPACITY;
use crate::proxy::playlist::DEFAULT_VARIANT_LIMIT;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How many variants of a master playlist to expose to the player.
    pub variant_limit: usize,
    /// Upstream connection slots per host.
    pub host_capacity: usize,
    /// Upstream fetch deadline, seconds.
    pub fetch_timeout_secs: u64,
    /// How long a request waits for a governor slot, seconds.
    pub acquire_timeout_secs: u64,
    /// Metadata/subtitle gather deadline, seconds.
    pub gather_deadline_secs: u64,
    /// Preferred player ("mpv" or "vlc").
    pub preferred_player: Option<String>,
    /// Extra arguments appended to every player invocation.
    pub player_args: Vec<String>,
    /// Preferred subtitle languages (3-letter codes).
    pub subtitle_languages: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            variant_limit: DEFAULT_VARIANT_LIMIT,
            host_capacity: DEFAULT_HOST_CAPACITY,
            fetch_timeout_secs: 15,
            acquire_timeout_secs: 20,
            gather_deadline_secs: 10,
            preferred_player: None,
            player_args: Vec::new(),
            subtitle_languages: vec!["eng".to_string()],
        }
    }
}

impl Config {
    /// Get config file path (~/.config/tvproxy/config.toml)
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("tvproxy").join("config.toml"))
    }

    /// Load config from file, or return default if not found
    pub fn load() -> Self {
        Self::path()
            .and_then(|p| std::fs::read_to_string(p).ok())
            .and_then(|s| toml::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let path = Self::path().ok_or_else(|| anyhow::anyhow!("Could not determine config path"))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml = toml::to_string_pretty(self)?;
        std::fs::write(path, toml)?;
        Ok(())
    }

    /// Variant limit with TVPROXY_VARIANT_LIMIT env override
    pub fn variant_limit(&self) -> usize {
        std::env::var("TVPROXY_VARIANT_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.variant_limit)
            .max(1)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn gather_deadline(&self) -> Duration {
        Duration::from_secs(self.gather_deadline_secs)
    }
}
