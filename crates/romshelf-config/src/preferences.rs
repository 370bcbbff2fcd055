//! Key-value preference storage
//!
//! The library index only needs two values from here (the search root and the
//! refresh flag), but the store itself is generic.

use crate::ConfigError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Persisted key-value preferences
pub trait Preferences {
    fn get_string(&self, key: &str) -> Option<String>;

    fn set_string(&mut self, key: &str, value: &str) -> Result<(), ConfigError>;

    /// Boolean lookup, `default` when the key is absent or not a boolean
    fn get_bool(&self, key: &str, default: bool) -> bool;

    fn set_bool(&mut self, key: &str, value: bool) -> Result<(), ConfigError>;

    fn remove(&mut self, key: &str) -> Result<(), ConfigError>;
}

/// In-memory preferences, mostly for tests
#[derive(Debug, Clone, Default)]
pub struct MemoryPreferences {
    values: BTreeMap<String, toml::Value>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Preferences for MemoryPreferences {
    fn get_string(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    fn set_string(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.values
            .insert(key.to_string(), toml::Value::String(value.to_string()));
        Ok(())
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        self.values
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(default)
    }

    fn set_bool(&mut self, key: &str, value: bool) -> Result<(), ConfigError> {
        self.values.insert(key.to_string(), toml::Value::Boolean(value));
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), ConfigError> {
        self.values.remove(key);
        Ok(())
    }
}

/// Preferences kept in a flat TOML table, written through on every change
#[derive(Debug)]
pub struct TomlPreferences {
    path: PathBuf,
    values: toml::Table,
}

impl TomlPreferences {
    /// Open a preference file; a missing file starts out empty
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let values = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            contents.parse::<toml::Table>()?
        } else {
            toml::Table::new()
        };

        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string(&self.values)?;
        std::fs::write(&self.path, contents)?;
        tracing::debug!("Preferences written to {}", self.path.display());
        Ok(())
    }
}

impl Preferences for TomlPreferences {
    fn get_string(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    fn set_string(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.values
            .insert(key.to_string(), toml::Value::String(value.to_string()));
        self.persist()
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        self.values
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(default)
    }

    fn set_bool(&mut self, key: &str, value: bool) -> Result<(), ConfigError> {
        self.values.insert(key.to_string(), toml::Value::Boolean(value));
        self.persist()
    }

    fn remove(&mut self, key: &str) -> Result<(), ConfigError> {
        if self.values.remove(key).is_some() {
            self.persist()?;
        }
        Ok(())
    }
}
