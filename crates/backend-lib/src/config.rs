// ============================
// callroom-backend/src/config.rs
// ============================
//! Configuration management.
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Log level used when `RUST_LOG` is not set
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,
    /// How long a directory join holds a slot before it lapses
    pub reservation_ttl_secs: u64,
    /// Interval of the background reservation sweep
    pub sweep_interval_secs: u64,
    /// Maximum chat message length in characters
    pub max_chat_length: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            reservation_ttl_secs: 30,
            sweep_interval_secs: 5,
            max_chat_length: 4096,
        }
    }
}

impl Settings {
    /// Load settings from `config.toml` and the environment
    pub fn load() -> Result<Self> {
        Self::load_from("config.toml")
    }

    /// Defaults, then the TOML file at `path` (if present), then `CALLROOM_*` variables
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("CALLROOM_"))
            .extract()?;

        Ok(settings)
    }

    /// Check settings for values the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if !VALID_LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            bail!("Invalid log level: {}", self.log_level);
        }

        if self.reservation_ttl_secs == 0 {
            bail!("reservation_ttl_secs must be greater than 0");
        }

        if self.sweep_interval_secs == 0 {
            bail!("sweep_interval_secs must be greater than 0");
        }

        if self.max_chat_length == 0 {
            bail!("max_chat_length must be greater than 0");
        }

        Ok(())
    }

    pub fn reservation_ttl(&self) -> Duration {
        Duration::from_secs(self.reservation_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Load settings from the default locations
pub fn load_settings() -> Result<Settings> {
    Settings::load()
}
