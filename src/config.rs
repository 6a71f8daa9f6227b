use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

/// Booth configuration, read from a YAML file next to the binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoothConfig {
    /// Flash brightness in percent, 0 to 100 in steps of 5.
    pub flash_brightness: u8,
    /// Number of captures per session, indexed by capture mode.
    pub capture_choices: Vec<u8>,
    /// Seconds the preview runs before each capture.
    pub preview_delay: f32,
}

impl Default for BoothConfig {
    fn default() -> Self {
        Self {
            flash_brightness: 100,
            capture_choices: vec![4, 1],
            preview_delay: 3.0,
        }
    }
}

impl BoothConfig {
    /// Load the configuration, falling back to defaults when the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("no configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).map_err(ConfigError::Io)?;
        let config = serde_yaml::from_str(&raw).map_err(ConfigError::Parse)?;
        info!("configuration loaded from {}", path.display());
        Ok(config)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    Parse(serde_yaml::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "failed to read configuration: {err}"),
            ConfigError::Parse(err) => write!(f, "failed to parse configuration: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {}
