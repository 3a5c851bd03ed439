//! Persisted device settings
//!
//! A small string key-value store standing in for the device's flash-backed
//! configuration: WiFi credentials and broker parameters. Values are read once
//! when an operating mode is built.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Settings section holding WiFi credentials
pub const WIFI_SCOPE: &str = "wifi";
/// Settings section holding broker parameters
pub const MQTT_SCOPE: &str = "mqtt";

pub const KEY_SSID: &str = "ssid";
pub const KEY_PASSWORD: &str = "password";
pub const KEY_BROKER: &str = "broker";
pub const KEY_PORT: &str = "port";
pub const KEY_USER: &str = "user";
pub const KEY_PREFIX: &str = "prefix";
pub const KEY_FINGERPRINT: &str = "fingerprint";

pub const DEFAULT_PORT: &str = "1883";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to access settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// String key-value access
pub trait Settings {
    fn get(&self, key: &str, default: &str) -> String;
    fn set(&mut self, key: &str, value: &str);
}

/// In-memory settings
#[derive(Debug, Clone, Default)]
pub struct MemorySettings {
    values: HashMap<String, String>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }
}

impl Settings for MemorySettings {
    fn get(&self, key: &str, default: &str) -> String {
        self.values
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }
}

type Tables = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
struct SettingsFile {
    tables: Tables,
}

/// TOML file of string tables, one table per scope
///
/// Changes are held in memory until [`FileSettings::flush`]; a dirty store is
/// also written back when dropped.
#[derive(Debug)]
pub struct FileSettings {
    path: PathBuf,
    file: SettingsFile,
    dirty: bool,
}

impl FileSettings {
    /// Open `path`, starting empty if it does not exist yet.
    pub fn open(path: &Path) -> Result<Self, SettingsError> {
        let file = match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Settings file missing, starting empty");
                SettingsFile::default()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path: path.to_path_buf(),
            file,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Settings view restricted to one table
    pub fn scope(&mut self, name: &str) -> Scoped<'_> {
        Scoped {
            store: self,
            scope: name.to_string(),
        }
    }

    pub fn get_in(&self, scope: &str, key: &str, default: &str) -> String {
        self.file
            .tables
            .get(scope)
            .and_then(|table| table.get(key))
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    pub fn set_in(&mut self, scope: &str, key: &str, value: &str) {
        let table = self.file.tables.entry(scope.to_string()).or_default();
        if table.get(key).map(String::as_str) != Some(value) {
            table.insert(key.to_string(), value.to_string());
            self.dirty = true;
        }
    }

    /// Write pending changes to disk.
    pub fn flush(&mut self) -> Result<(), SettingsError> {
        if !self.dirty {
            return Ok(());
        }
        let content = toml::to_string(&self.file)?;
        std::fs::write(&self.path, content)?;
        self.dirty = false;
        debug!(path = %self.path.display(), "Settings written");
        Ok(())
    }
}

impl Drop for FileSettings {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(path = %self.path.display(), error = %e, "Failed to write settings on drop");
        }
    }
}

/// One table of a [`FileSettings`]
pub struct Scoped<'a> {
    store: &'a mut FileSettings,
    scope: String,
}

impl Settings for Scoped<'_> {
    fn get(&self, key: &str, default: &str) -> String {
        self.store.get_in(&self.scope, key, default)
    }

    fn set(&mut self, key: &str, value: &str) {
        self.store.set_in(&self.scope, key, value);
    }
}

/// Stored WiFi network credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiCredentials {
    pub ssid: String,
    pub password: String,
}

impl WifiCredentials {
    /// None when no network has been provisioned.
    pub fn read(settings: &dyn Settings) -> Option<Self> {
        let ssid = settings.get(KEY_SSID, "");
        if ssid.is_empty() {
            return None;
        }
        Some(Self {
            ssid,
            password: settings.get(KEY_PASSWORD, ""),
        })
    }
}

/// Raw broker parameters as stored; validated by the connector's `configure`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerSettings {
    pub broker: String,
    pub port: String,
    pub user: String,
    pub password: String,
    pub prefix: String,
    pub fingerprint: String,
}

impl BrokerSettings {
    pub fn read(settings: &dyn Settings) -> Self {
        Self {
            broker: settings.get(KEY_BROKER, ""),
            port: settings.get(KEY_PORT, DEFAULT_PORT),
            user: settings.get(KEY_USER, ""),
            password: settings.get(KEY_PASSWORD, ""),
            prefix: settings.get(KEY_PREFIX, ""),
            fingerprint: settings.get(KEY_FINGERPRINT, ""),
        }
    }
}
