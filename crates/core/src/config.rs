use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::settings::Settings;

/// Settings persistence.
///
/// Stores [`Settings`] as JSON in `config.json` (working directory) by
/// default. Loading merges file contents over defaults: unknown keys are
/// ignored and missing keys fall back to their default values, so settings
/// files survive upgrades in both directions.
pub struct ConfigStore {
    config_path: PathBuf,
    settings: Settings,
}

/// Persisted configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    pub settings: Settings,
    pub created_at: String,
    pub modified_at: String,
}

impl ConfigStore {
    /// If no path is provided, defaults to 'config.json' in the current
    /// working directory.
    pub fn new(config_path: Option<PathBuf>) -> Self {
        let config_path = config_path.unwrap_or_else(|| PathBuf::from("config.json"));
        ConfigStore {
            config_path,
            settings: Settings::default(),
        }
    }

    /// Load settings from the configuration file, creating it with defaults
    /// if it does not exist yet.
    pub fn load(&mut self) -> Result<Settings, CoreError> {
        if !self.config_path.exists() {
            self.save()?;
            return Ok(self.settings.clone());
        }

        let content = fs::read_to_string(&self.config_path)
            .map_err(|e| CoreError::Config(format!("failed to read config file: {}", e)))?;
        let config_file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| CoreError::Config(format!("failed to parse config file: {}", e)))?;

        if config_file.version != env!("CARGO_PKG_VERSION") {
            log::warn!(
                "config file version {} doesn't match application version {}; using defaults for new settings",
                config_file.version,
                env!("CARGO_PKG_VERSION")
            );
        }

        self.settings = config_file.settings;
        Ok(self.settings.clone())
    }

    /// Save current settings to the configuration file.
    pub fn save(&self) -> Result<(), CoreError> {
        if let Some(parent) = self.config_path.parent() {
            if parent != Path::new("") && parent != Path::new(".") {
                fs::create_dir_all(parent)
                    .map_err(|e| CoreError::Config(format!("failed to create config dir: {}", e)))?;
            }
        }

        let config_file = ConfigFile {
            version: env!("CARGO_PKG_VERSION").to_string(),
            settings: self.settings.clone(),
            created_at: chrono::Utc::now().to_rfc3339(),
            modified_at: chrono::Utc::now().to_rfc3339(),
        };
        let content = serde_json::to_string_pretty(&config_file)
            .map_err(|e| CoreError::Config(format!("failed to serialize config: {}", e)))?;
        fs::write(&self.config_path, content)
            .map_err(|e| CoreError::Config(format!("failed to write config file: {}", e)))?;
        Ok(())
    }

    /// Update settings and save to file.
    pub fn update(&mut self, settings: Settings) -> Result<(), CoreError> {
        self.settings = settings;
        self.save()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_store_new() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test_config.json");

        let store = ConfigStore::new(Some(config_path.clone()));
        assert_eq!(store.config_path(), config_path);
        assert_eq!(store.settings(), &Settings::default());
    }

    #[test]
    fn test_load_creates_default_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        let mut store = ConfigStore::new(Some(config_path.clone()));
        let settings = store.load().unwrap();
        assert_eq!(settings, Settings::default());
        assert!(config_path.exists());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test_config.json");

        let mut store = ConfigStore::new(Some(config_path.clone()));

        let mut settings = Settings::default();
        settings.fps = 30;
        settings.priority = 180;
        settings.bind_addresses = vec!["10.1.2.3".to_string()];
        store.update(settings).unwrap();

        let mut store2 = ConfigStore::new(Some(config_path));
        let loaded = store2.load().unwrap();
        assert_eq!(loaded.fps, 30);
        assert_eq!(loaded.priority, 180);
        assert_eq!(loaded.bind_addresses, vec!["10.1.2.3".to_string()]);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        fs::write(&config_path, "{not json").unwrap();

        let mut store = ConfigStore::new(Some(config_path));
        assert!(matches!(store.load(), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_unknown_settings_keys_survive_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        let content = format!(
            r#"{{"version":"{}","settings":{{"fps":50,"someday_maybe":1}},"created_at":"","modified_at":""}}"#,
            env!("CARGO_PKG_VERSION")
        );
        fs::write(&config_path, content).unwrap();

        let mut store = ConfigStore::new(Some(config_path));
        let settings = store.load().unwrap();
        assert_eq!(settings.fps, 50);
        assert_eq!(settings.priority, Settings::default().priority);
    }
}
