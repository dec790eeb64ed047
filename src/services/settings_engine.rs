// Linkshelf Settings Engine
// Loads, saves and edits `config.json` at the platform config path, and layers
// environment overrides on top for deployments that configure by env.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::platform;
use crate::types::errors::SettingsError;
use crate::types::settings::{BackendKind, Settings};

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const DATABASE_FILE_NAME: &str = "linkshelf.db";

/// Trait defining the settings engine interface.
pub trait SettingsEngineTrait {
    fn load(&mut self) -> Result<Settings, SettingsError>;
    fn save(&self) -> Result<(), SettingsError>;
    fn get_settings(&self) -> &Settings;
    fn set_value(&mut self, key: &str, value: serde_json::Value) -> Result<(), SettingsError>;
    fn reset(&mut self) -> Result<(), SettingsError>;
    fn get_config_path(&self) -> &str;
}

/// Settings engine implementation that persists settings as JSON on disk.
pub struct SettingsEngine {
    config_path: String,
    settings: Settings,
}

impl SettingsEngine {
    /// If `path_override` is `None` the file lives in the platform config dir.
    pub fn new(path_override: Option<String>) -> Self {
        let config_path = match path_override {
            Some(p) => p,
            None => platform::get_config_dir()
                .join(CONFIG_FILE_NAME)
                .to_string_lossy()
                .to_string(),
        };

        Self {
            config_path,
            settings: Settings::default(),
        }
    }

    /// Applies overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), SettingsError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`. Empty values are ignored. Overrides
    /// only touch the in-memory settings until the next `save`.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(kind) = get("LINKSHELF_BACKEND") {
            self.settings.backend.kind = match kind.to_lowercase().as_str() {
                "local" | "sqlite" => BackendKind::Local,
                "supabase" | "hosted" => BackendKind::Supabase,
                other => {
                    return Err(SettingsError::InvalidValue(format!(
                        "LINKSHELF_BACKEND must be 'local' or 'supabase', got '{}'",
                        other
                    )))
                }
            };
        }
        if let Some(dir) = get(platform::DATA_DIR_ENV) {
            let path = Path::new(&dir).join(DATABASE_FILE_NAME);
            self.settings.backend.sqlite_path = Some(path.to_string_lossy().to_string());
        }
        if let Some(url) = get("SUPABASE_URL") {
            self.settings.backend.supabase_url = Some(url);
        }
        if let Some(key) = get("SUPABASE_ANON_KEY") {
            self.settings.backend.supabase_anon_key = Some(key);
        }
        if let Some(base) = get("LINKSHELF_SHARE_BASE_URL") {
            self.settings.sharing.base_url = base;
        }
        debug!(backend = ?self.settings.backend.kind, "environment overrides applied");
        Ok(())
    }

    /// Where the local backend keeps its database.
    pub fn database_path(&self) -> PathBuf {
        match &self.settings.backend.sqlite_path {
            Some(path) => PathBuf::from(path),
            None => platform::get_data_dir().join(DATABASE_FILE_NAME),
        }
    }
}

impl SettingsEngineTrait for SettingsEngine {
    /// Missing file yields defaults; a malformed one is a serialization error.
    fn load(&mut self) -> Result<Settings, SettingsError> {
        let path = Path::new(&self.config_path);

        if !path.exists() {
            self.settings = Settings::default();
            return Ok(self.settings.clone());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| SettingsError::IoError(format!("Failed to read config file: {}", e)))?;

        let settings: Settings = serde_json::from_str(&content).map_err(|e| {
            SettingsError::SerializationError(format!("Failed to parse config file: {}", e))
        })?;

        self.settings = settings;
        Ok(self.settings.clone())
    }

    fn save(&self) -> Result<(), SettingsError> {
        let path = Path::new(&self.config_path);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                SettingsError::IoError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let json = serde_json::to_string_pretty(&self.settings).map_err(|e| {
            SettingsError::SerializationError(format!("Failed to serialize settings: {}", e))
        })?;

        fs::write(path, json)
            .map_err(|e| SettingsError::IoError(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    fn get_settings(&self) -> &Settings {
        &self.settings
    }

    /// Updates one setting by dot path and saves.
    ///
    /// # Examples
    /// - `"backend.kind"` → `settings.backend.kind`
    /// - `"sharing.base_url"` → `settings.sharing.base_url`
    fn set_value(&mut self, key: &str, value: serde_json::Value) -> Result<(), SettingsError> {
        if key.is_empty() {
            return Err(SettingsError::InvalidKey("Key cannot be empty".to_string()));
        }
        let parts: Vec<&str> = key.split('.').collect();

        let mut json_value = serde_json::to_value(&self.settings).map_err(|e| {
            SettingsError::SerializationError(format!("Failed to serialize settings: {}", e))
        })?;

        {
            let mut current = &mut json_value;
            for (i, part) in parts.iter().enumerate() {
                if i == parts.len() - 1 {
                    match current {
                        serde_json::Value::Object(map) => {
                            if !map.contains_key(*part) {
                                return Err(SettingsError::InvalidKey(format!(
                                    "Key '{}' not found in settings",
                                    key
                                )));
                            }
                            map.insert(part.to_string(), value.clone());
                        }
                        _ => {
                            return Err(SettingsError::InvalidKey(format!(
                                "Cannot navigate to key '{}': intermediate value is not an object",
                                key
                            )));
                        }
                    }
                } else {
                    current = current.get_mut(*part).ok_or_else(|| {
                        SettingsError::InvalidKey(format!("Key '{}' not found in settings", key))
                    })?;
                }
            }
        }

        // Round-trip through the typed struct so bad values are rejected.
        let new_settings: Settings = serde_json::from_value(json_value).map_err(|e| {
            SettingsError::InvalidValue(format!("Invalid value for key '{}': {}", key, e))
        })?;

        self.settings = new_settings;
        self.save()
    }

    fn reset(&mut self) -> Result<(), SettingsError> {
        self.settings = Settings::default();
        self.save()
    }

    fn get_config_path(&self) -> &str {
        &self.config_path
    }
}
