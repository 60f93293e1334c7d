//! Configuration module for voicestudio
//!
//! Loads config from `$VOICESTUDIO_CONFIG`, else `$XDG_CONFIG_HOME/voicestudio/config.toml`
//! or `~/.config/voicestudio/config.toml`.
//! Falls back to built-in defaults if the file doesn't exist.
//! Partial configs are merged with defaults using serde's default attributes.
//! `VOICESTUDIO_HOST` and `VOICESTUDIO_PORT` override the listen address.
//!
//! # Example
//!
//! ```no_run
//! use voicestudio::config::Config;
//!
//! let config = Config::load().expect("Failed to load config");
//! println!("Listening on {}:{}", config.server.host, config.server.port);
//! ```

pub mod schema;

pub use schema::Config;

use crate::error::{Result, VoiceError};
use std::fs;
use std::path::{Path, PathBuf};

impl Config {
    /// Load from the default location, apply env overrides, validate
    pub fn load() -> Result<Self> {
        let path = config_path()?;
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, using defaults if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            VoiceError::Config(format!("Failed to parse {}: {e}", path.display()))
        })
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("VOICESTUDIO_HOST") {
            self.server.host = host;
        }
        if let Ok(raw) = std::env::var("VOICESTUDIO_PORT") {
            match raw.parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(
                    "Invalid VOICESTUDIO_PORT='{raw}', keeping {}",
                    self.server.port
                ),
            }
        }
    }
}

/// Get config file path
pub fn config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("VOICESTUDIO_CONFIG") {
        return Ok(PathBuf::from(path));
    }

    let config_dir = if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config)
    } else {
        dirs::config_dir()
            .ok_or_else(|| VoiceError::Config("Cannot determine config directory".to_string()))?
    };

    Ok(config_dir.join("voicestudio").join("config.toml"))
}
