use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::serial_reader::{SerialConfig, BAUD_RATES, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT};

const MIN_TIMEOUT_MS: u64 = 10;

/// User preferences remembered between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub port_name: String,
    pub baud_rate: u32,
    pub show_timestamp: bool,
    pub timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            show_timestamp: true,
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
        }
    }
}

impl Settings {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("rssiview").join("settings.json"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::Settings(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&text).map_err(|e| Error::Settings(format!("{}: {e}", path.display())))
    }

    /// Loads from the default location; a missing or broken file yields the
    /// defaults.
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("{e}, using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| Error::Settings(format!("{}: {e}", dir.display())))?;
        }
        let text = serde_json::to_string_pretty(self).map_err(|e| Error::Settings(e.to_string()))?;
        std::fs::write(path, text).map_err(|e| Error::Settings(format!("{}: {e}", path.display())))
    }

    /// Saves to the default location, logging instead of failing.
    pub fn store(&self) {
        let Some(path) = Self::default_path() else {
            return;
        };
        match self.save(&path) {
            Ok(()) => info!("settings saved to {}", path.display()),
            Err(e) => warn!("{e}"),
        }
    }

    pub fn baud_rate(&self) -> u32 {
        if BAUD_RATES.contains(&self.baud_rate) {
            self.baud_rate
        } else {
            DEFAULT_BAUD_RATE
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(MIN_TIMEOUT_MS))
    }

    pub fn serial_config(&self, port_name: &str, baud_rate: u32) -> SerialConfig {
        SerialConfig {
            port_name: port_name.to_string(),
            baud_rate,
            timeout: self.timeout(),
        }
    }
}
