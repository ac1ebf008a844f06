use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub storage_path: String,
    pub settings_path: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let storage_path = env::var("POCKETCHAT_STORAGE_PATH").unwrap_or("./".to_string());
        let settings_path = env::var("POCKETCHAT_SETTINGS_PATH")
            .unwrap_or_else(|_| format!("{}/settings.json", storage_path.trim_end_matches("/")));

        Self {
            storage_path,
            settings_path,
        }
    }
}

/// Where to send completions and how to authenticate. Stored as a
/// flat key-value JSON object, missing keys fall back to the
/// defaults.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectionConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

pub trait ConfigStore: Send + Sync {
    fn load(&self) -> Result<ConnectionConfig>;
    fn save(&self, config: &ConnectionConfig) -> Result<()>;
}

/// Settings kept in a JSON file on disk.
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Result<ConnectionConfig> {
        if !self.path.exists() {
            tracing::debug!("No settings at {}, using defaults", self.path.display());
            return Ok(ConnectionConfig::default());
        }
        let data = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let config = serde_json::from_str(&data)
            .with_context(|| format!("Invalid settings file {}", self.path.display()))?;
        Ok(config)
    }

    fn save(&self, config: &ConnectionConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create settings directory {}", parent.display())
                })?;
            }
        }
        let data = serde_json::to_string_pretty(config)?;
        fs::write(&self.path, data)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))?;
        tracing::info!("Saved settings to {}", self.path.display());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryConfigStore(RwLock<ConnectionConfig>);

impl MemoryConfigStore {
    pub fn new(config: ConnectionConfig) -> Self {
        Self(RwLock::new(config))
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> Result<ConnectionConfig> {
        let config = self
            .0
            .read()
            .map_err(|_| anyhow!("Settings lock poisoned"))?;
        Ok(config.clone())
    }

    fn save(&self, config: &ConnectionConfig) -> Result<()> {
        let mut current = self
            .0
            .write()
            .map_err(|_| anyhow!("Settings lock poisoned"))?;
        *current = config.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path().join("settings.json"));

        let config = store.load().unwrap();
        assert_eq!(config.base_url, "");
        assert_eq!(config.api_key, "");
        assert_eq!(config.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path().join("nested").join("settings.json"));
        let config = ConnectionConfig {
            base_url: String::from("https://api.example.com"),
            api_key: String::from("sk-test"),
            model: String::from("gpt-4"),
        };

        store.save(&config).unwrap();
        assert_eq!(store.load().unwrap(), config);
    }

    #[test]
    fn test_settings_file_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"baseUrl": "https://api.example.com"}"#).unwrap();

        let config = FileConfigStore::new(&path).load().unwrap();
        assert_eq!(config.base_url, "https://api.example.com");
        assert_eq!(config.api_key, "");
        assert_eq!(config.model, DEFAULT_MODEL);

        FileConfigStore::new(&path).save(&config).unwrap();
        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["baseUrl"], "https://api.example.com");
        assert_eq!(raw["apiKey"], "");
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();

        assert!(FileConfigStore::new(&path).load().is_err());
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryConfigStore::default();
        assert_eq!(store.load().unwrap(), ConnectionConfig::default());

        let config = ConnectionConfig {
            api_key: String::from("sk-test"),
            ..Default::default()
        };
        store.save(&config).unwrap();
        assert_eq!(store.load().unwrap().api_key, "sk-test");
    }

    #[test]
    #[serial]
    fn test_app_config_from_env() {
        unsafe {
            env::set_var("POCKETCHAT_STORAGE_PATH", "/tmp/pocketchat/");
            env::remove_var("POCKETCHAT_SETTINGS_PATH");
        }
        let config = AppConfig::default();
        assert_eq!(config.storage_path, "/tmp/pocketchat/");
        assert_eq!(config.settings_path, "/tmp/pocketchat/settings.json");

        unsafe {
            env::set_var("POCKETCHAT_SETTINGS_PATH", "/etc/pocketchat.json");
        }
        let config = AppConfig::default();
        assert_eq!(config.settings_path, "/etc/pocketchat.json");

        unsafe {
            env::remove_var("POCKETCHAT_STORAGE_PATH");
            env::remove_var("POCKETCHAT_SETTINGS_PATH");
        }
    }
}
