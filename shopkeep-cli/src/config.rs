use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use shopkeep_core::remote::CREDENTIALS_SLOT;
use shopkeep_core::{slot_key, FileStorage, SlotStorage, DEFAULT_PREFIX};

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Directory holding slot files
    pub data_dir: ConfigValue<PathBuf>,
    /// Slot key prefix
    pub prefix: ConfigValue<String>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    prefix: Option<String>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        // Start with defaults
        let mut data_dir = ConfigValue::new(Self::default_data_dir(), ConfigSource::Default);
        let mut prefix = ConfigValue::new(DEFAULT_PREFIX.to_string(), ConfigSource::Default);
        let mut config_file = None;

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(dir) = file_config.data_dir {
                // Resolve relative paths against config file's directory
                let resolved = if dir.is_relative() {
                    path.parent().map(|p| p.join(&dir)).unwrap_or(dir)
                } else {
                    dir
                };
                data_dir = ConfigValue::new(resolved, ConfigSource::File);
            }
            if let Some(p) = file_config.prefix {
                prefix = ConfigValue::new(p, ConfigSource::File);
            }
        }

        // Apply environment variable overrides
        if let Ok(dir) = std::env::var("SHOPKEEP_DATA_DIR") {
            data_dir = ConfigValue::new(PathBuf::from(dir), ConfigSource::Environment);
        }
        if let Ok(p) = std::env::var("SHOPKEEP_PREFIX") {
            prefix = ConfigValue::new(p, ConfigSource::Environment);
        }

        if prefix.value.is_empty() {
            return Err(ConfigError::InvalidValue(
                "prefix".to_string(),
                "must not be empty".to_string(),
            ));
        }

        Ok(Self {
            data_dir,
            prefix,
            config_file,
        })
    }

    /// Opens slot storage in the configured data directory.
    pub fn storage(&self) -> Arc<dyn SlotStorage> {
        Arc::new(FileStorage::new(self.data_dir.value.clone()))
    }

    /// Full slot key for a slot name.
    pub fn slot_key(&self, name: &str) -> String {
        slot_key(&self.prefix.value, name)
    }

    /// Slot key holding the remote credentials.
    pub fn credentials_key(&self) -> String {
        self.slot_key(CREDENTIALS_SLOT)
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/shopkeep/
    /// - macOS: ~/Library/Application Support/shopkeep/
    /// - Windows: %APPDATA%/shopkeep/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("shopkeep")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/shopkeep/
    /// - macOS: ~/Library/Application Support/shopkeep/
    /// - Windows: %APPDATA%/shopkeep/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("shopkeep")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidValue(String, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidValue(field, reason) => {
                write!(f, "Invalid config value for '{}': {}", field, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
