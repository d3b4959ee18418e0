#[cfg(test)]
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use tracing::{debug, trace, warn};

use crate::domain::PTVError;

pub const THEME_PREFERENCE_KEY: &str = "themeMode";

/// Key/value storage that survives a restart.
pub trait PreferenceStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), PTVError>;
}

/// Preferences kept as a flat TOML table on disk.
#[derive(Debug, Clone)]
pub struct FilePreferenceStore {
    path: PathBuf,
}

impl FilePreferenceStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// `<config dir>/ptv/preferences.toml`, or a file in the working
    /// directory when the platform has no config dir.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join("ptv"))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("preferences.toml")
    }

    fn read_table(&self) -> Result<toml::Table, PTVError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(contents.parse::<toml::Table>()?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(toml::Table::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn get(&self, key: &str) -> Option<String> {
        let table = match self.read_table() {
            Ok(table) => table,
            Err(e) => {
                warn!("Ignoring unreadable preferences {:?}: {e}", self.path);
                return None;
            }
        };
        let value = table.get(key).and_then(|v| v.as_str()).map(str::to_string);
        trace!("Preference {key} => {value:?}");
        value
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PTVError> {
        // Only an unparsable file is replaced. I/O errors keep it untouched.
        let mut table = match self.read_table() {
            Ok(table) => table,
            Err(PTVError::PreferenceParseError(e)) => {
                warn!("Replacing corrupt preferences {:?}: {e}", self.path);
                toml::Table::new()
            }
            Err(e) => return Err(e),
        };
        table.insert(key.to_string(), toml::Value::String(value.to_string()));

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, toml::to_string(&table)?)?;
        debug!("Stored preference {key}={value} in {:?}", self.path);
        Ok(())
    }
}

#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub struct MemoryPreferenceStore {
    values: HashMap<String, String>,
}

#[cfg(test)]
impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PTVError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
