//! Configuration for the deltavault CLI

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Tool configuration, loaded from a TOML file. CLI flags override it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default logging verbosity (0-3)
    pub verbose: u8,

    /// Emit logs as JSON by default
    pub json_logs: bool,

    /// Directory for restore staging files (system temp dir when unset)
    pub temp_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            verbose: 0,
            json_logs: false,
            temp_dir: None,
        }
    }
}

impl Config {
    /// Load from the default location; missing file means defaults.
    pub fn load() -> Result<Self> {
        let path = Self::default_config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("reading {}: {}", path.display(), e)))?;
        Ok(toml::from_str(&content)?)
    }

    /// Write the configuration to the default location.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::config(format!("creating {}: {}", parent.display(), e)))?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::config(format!("serializing config: {}", e)))?;
        std::fs::write(&path, content)
            .map_err(|e| Error::config(format!("writing {}: {}", path.display(), e)))
    }

    /// Platform config path: `<config dir>/deltavault/config.toml`.
    pub fn default_config_path() -> Result<PathBuf> {
        let base = dirs::config_dir()
            .ok_or_else(|| Error::config("could not determine config directory"))?;
        Ok(base.join("deltavault").join("config.toml"))
    }
}
