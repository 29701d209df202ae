//! Configuration file support for xrattach.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (XRATTACH_*)
//! 3. Local config file (./xrattach.toml)
//! 4. Global config file (~/.config/xrattach/config.toml)

use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Preferred serial port (e.g., "/dev/ttyS1" or "COM3").
    pub serial: Option<String>,
    /// Working baud rate for the download and the HCI link.
    pub baud: Option<u32>,
}

/// Firmware configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FirmwareConfig {
    /// Firmware image path.
    pub path: Option<PathBuf>,
    /// Default chip variant name.
    pub chip: Option<String>,
    /// RAM address the image is written to.
    pub load_addr: Option<u32>,
    /// Entry point for the jump.
    pub jump_addr: Option<u32>,
}

/// Bring-up configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BringupConfig {
    /// Persistent device address file.
    pub bdaddr_file: Option<PathBuf>,
    /// Enable low-power mode after bring-up.
    #[serde(default)]
    pub lpm: bool,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Firmware settings.
    #[serde(default)]
    pub firmware: FirmwareConfig,
    /// Bring-up settings.
    #[serde(default)]
    pub bringup: BringupConfig,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                if let Some(global_config) = Self::load_from_file(&global_path) {
                    debug!("Loaded global config from {}", global_path.display());
                    config.merge(global_config);
                }
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new("xrattach.toml")) {
            debug!("Loaded local config from xrattach.toml");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "xrattach").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        if other.connection.serial.is_some() {
            self.connection.serial = other.connection.serial;
        }
        if other.connection.baud.is_some() {
            self.connection.baud = other.connection.baud;
        }

        if other.firmware.path.is_some() {
            self.firmware.path = other.firmware.path;
        }
        if other.firmware.chip.is_some() {
            self.firmware.chip = other.firmware.chip;
        }
        if other.firmware.load_addr.is_some() {
            self.firmware.load_addr = other.firmware.load_addr;
        }
        if other.firmware.jump_addr.is_some() {
            self.firmware.jump_addr = other.firmware.jump_addr;
        }

        if other.bringup.bdaddr_file.is_some() {
            self.bringup.bdaddr_file = other.bringup.bdaddr_file;
        }
        if other.bringup.lpm {
            self.bringup.lpm = true;
        }
    }
}
