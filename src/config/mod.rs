//! Configuration module for screenflow
//!
//! The engine reads a single TOML document with three sections:
//!
//! ```toml
//! [tasker]
//! debug_mode = false
//! stop_poll_interval_ms = 10
//!
//! [logging]
//! filter = "info,screenflow=debug"
//! log_dir = "/var/log/screenflow"
//!
//! [defaults]
//! reco_timeout_ms = 20000
//! rate_limit_ms = 1000
//! ```
//!
//! # Config Location
//!
//! When no explicit path is given the config is looked up in the
//! platform-appropriate data directory under `dev.screenflow`:
//! - **Linux**: `~/.local/share/dev.screenflow/screenflow.toml`
//! - **macOS**: `~/Library/Application Support/dev.screenflow/screenflow.toml`
//! - **Windows**: `%APPDATA%\dev.screenflow\screenflow.toml`

pub mod settings;

pub use settings::*;

use crate::error::{FlowError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for data directories
pub const APP_ID: &str = "dev.screenflow";

/// Config filename
pub const CONFIG_FILE: &str = "screenflow.toml";

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Get the path to the default config file
pub fn default_config_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(CONFIG_FILE))
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tasker: TaskerSettings,
    pub logging: LogSettings,
    pub defaults: NodeDefaults,
}

impl EngineConfig {
    /// Load a config file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            FlowError::Config(format!("Failed to read config {:?}: {}", path, e))
        })?;
        Self::from_toml(&content)
            .map_err(|e| e.with_context(format!("Failed to parse config {:?}", path)))
    }

    /// Parse a config from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load the config from the default location, returning defaults on any error
    pub fn load_or_default() -> Self {
        let Some(path) = default_config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the config to disk as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| FlowError::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        std::fs::write(path, content)
            .map_err(|e| FlowError::Config(format!("Failed to write config {:?}: {}", path, e)))
    }
}
