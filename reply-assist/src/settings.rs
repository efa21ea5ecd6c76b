use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

pub const KEY_ENABLED: &str = "enabled";
pub const KEY_PROCESS_MODE: &str = "processMode";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings storage holds invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("settings storage root must be a JSON object")]
    NotAnObject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProcessMode {
    #[default]
    #[serde(rename = "removeVowelWords")]
    RemoveVowelWords,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub process_mode: ProcessMode,
}

fn default_enabled() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            process_mode: ProcessMode::default(),
        }
    }
}

impl Settings {
    /// Reads the typed view of a storage snapshot. Keys that are missing or
    /// hold values of the wrong shape fall back to their defaults.
    pub fn from_entries(entries: &Map<String, Value>) -> Self {
        let mut settings = Settings::default();

        match entries.get(KEY_ENABLED) {
            None => {}
            Some(Value::Bool(enabled)) => settings.enabled = *enabled,
            Some(other) => warn!(value = %other, "stored `enabled` is not a boolean; using default"),
        }

        if let Some(raw) = entries.get(KEY_PROCESS_MODE) {
            match serde_json::from_value::<ProcessMode>(raw.clone()) {
                Ok(mode) => settings.process_mode = mode,
                Err(err) => warn!(value = %raw, "unknown processing mode; using default: {err}"),
            }
        }

        settings
    }

    pub fn to_entries(&self) -> Map<String, Value> {
        let mut entries = Map::new();
        entries.insert(KEY_ENABLED.to_string(), Value::Bool(self.enabled));
        entries.insert(
            KEY_PROCESS_MODE.to_string(),
            serde_json::to_value(self.process_mode).unwrap_or(Value::Null),
        );
        entries
    }
}

/// Key-value settings storage shared with the background coordinator.
pub trait SettingsStore {
    fn entries(&self) -> Result<Map<String, Value>, SettingsError>;
    /// Merges `updates` into the stored entries.
    fn merge(&mut self, updates: Map<String, Value>) -> Result<(), SettingsError>;

    fn load(&self) -> Result<Settings, SettingsError> {
        self.entries().map(|entries| Settings::from_entries(&entries))
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: Map<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Map<String, Value>) -> Self {
        Self { entries }
    }
}

impl SettingsStore for MemoryStore {
    fn entries(&self) -> Result<Map<String, Value>, SettingsError> {
        Ok(self.entries.clone())
    }

    fn merge(&mut self, updates: Map<String, Value>) -> Result<(), SettingsError> {
        self.entries.extend(updates);
        Ok(())
    }
}

/// Settings persisted as a pretty-printed JSON object on disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonFileStore {
    fn entries(&self) -> Result<Map<String, Value>, SettingsError> {
        if !self.path.exists() {
            return Ok(Map::new());
        }

        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&content)? {
            Value::Object(entries) => Ok(entries),
            _ => Err(SettingsError::NotAnObject),
        }
    }

    fn merge(&mut self, updates: Map<String, Value>) -> Result<(), SettingsError> {
        let mut entries = self.entries()?;
        entries.extend(updates);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let serialized = serde_json::to_string_pretty(&Value::Object(entries))?;
        fs::write(&self.path, serialized)?;
        Ok(())
    }
}

/// Writes defaults for keys that are not stored yet; existing values are
/// never overwritten. Returns whether anything was written.
pub fn install_defaults<S: SettingsStore + ?Sized>(store: &mut S) -> Result<bool, SettingsError> {
    let existing = store.entries()?;
    let missing: Map<String, Value> = Settings::default()
        .to_entries()
        .into_iter()
        .filter(|(key, _)| !existing.contains_key(key))
        .collect();

    if missing.is_empty() {
        return Ok(false);
    }

    let keys: Vec<&str> = missing.keys().map(String::as_str).collect();
    info!(keys = ?keys, "initializing missing settings");
    store.merge(missing)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn defaults_are_enabled_vowel_filter() {
        let settings = Settings::default();
        assert!(settings.enabled);
        assert_eq!(settings.process_mode, ProcessMode::RemoveVowelWords);
        assert_eq!(
            Value::Object(settings.to_entries()),
            json!({ "enabled": true, "processMode": "removeVowelWords" })
        );
    }

    #[test]
    fn malformed_entries_fall_back_to_defaults() {
        let settings =
            Settings::from_entries(&object(json!({ "enabled": "yes", "processMode": "shout" })));
        assert_eq!(settings, Settings::default());

        let disabled = Settings::from_entries(&object(json!({ "enabled": false })));
        assert!(!disabled.enabled);
    }

    #[test]
    fn install_defaults_keeps_existing_values() {
        let mut store = MemoryStore::with_entries(object(json!({ "enabled": false })));
        assert!(install_defaults(&mut store).unwrap());
        let settings = store.load().unwrap();
        assert!(!settings.enabled);
        assert_eq!(settings.process_mode, ProcessMode::RemoveVowelWords);

        assert!(!install_defaults(&mut store).unwrap());
    }

    #[test]
    fn json_file_store_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let mut store = JsonFileStore::new(&path);

        assert!(store.entries().unwrap().is_empty());
        install_defaults(&mut store).unwrap();
        store
            .merge(object(json!({ "enabled": false, "theme": "dark" })))
            .unwrap();

        let reopened = JsonFileStore::new(&path);
        let entries = reopened.entries().unwrap();
        assert_eq!(entries.get("theme"), Some(&json!("dark")));
        assert!(!reopened.load().unwrap().enabled);
    }

    #[test]
    fn json_file_store_rejects_non_object_root() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "[1, 2]").unwrap();
        let store = JsonFileStore::new(&path);
        assert!(matches!(store.entries(), Err(SettingsError::NotAnObject)));
    }
}
