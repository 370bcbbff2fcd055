//! Configuration management for romshelf
//!
//! Handles the application config file, scanner settings, and the small
//! key-value preference store the library index reads its flags from.

mod preferences;
mod scan_config;

pub use preferences::{MemoryPreferences, Preferences, TomlPreferences};
pub use scan_config::ScanConfig;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Preference key holding the locator of the directory tree to index
pub const SEARCH_LOCATION_KEY: &str = "search_location";

/// Preference key holding the invalidation flag
pub const REFRESH_REQUIRED_KEY: &str = "refresh_required";

/// File name of the persisted library cache
pub const CACHE_FILE_NAME: &str = "roms.bin";

/// Environment variable overriding the config file location
pub const CONFIG_ENV_VAR: &str = "ROMSHELF_CONFIG";

/// Main romshelf configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShelfConfig {
    /// Application-private data directory (cache, preferences)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Preference file name, relative to `data_dir` unless absolute
    #[serde(default = "default_preferences_file")]
    pub preferences_file: PathBuf,

    /// Default tracing filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub scan: ScanConfig,
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("romshelf"))
        .unwrap_or_else(|| PathBuf::from(".romshelf"))
}

fn default_preferences_file() -> PathBuf {
    PathBuf::from("preferences.toml")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ShelfConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            preferences_file: default_preferences_file(),
            log_level: default_log_level(),
            scan: ScanConfig::default(),
        }
    }
}

impl ShelfConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `ROMSHELF_CONFIG`, then the default location, falling back to defaults
    pub fn load_default() -> Result<Self, ConfigError> {
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            return Self::load(Path::new(&path));
        }

        let default_path = Self::default_path();
        if default_path.exists() {
            return Self::load(&default_path);
        }

        tracing::warn!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Default config file location (`config.toml` in the data directory)
    pub fn default_path() -> PathBuf {
        default_data_dir().join("config.toml")
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        tracing::info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Location of the library cache file
    pub fn cache_path(&self) -> PathBuf {
        self.data_dir.join(CACHE_FILE_NAME)
    }

    /// Location of the preference store
    pub fn preferences_path(&self) -> PathBuf {
        if self.preferences_file.is_absolute() {
            self.preferences_file.clone()
        } else {
            self.data_dir.join(&self.preferences_file)
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("data_dir must not be empty".to_string()));
        }
        if self.scan.max_depth == 0 {
            return Err(ConfigError::Invalid(
                "scan.max_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
