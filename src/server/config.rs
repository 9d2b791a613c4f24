//! Server configuration and API keys.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use shopkeep_core::remote::DEFAULT_TABLE;

/// API key entry in config
#[derive(Debug, Clone, Deserialize)]
struct ApiKeyEntry {
    key: String,
    #[serde(default)]
    name: Option<String>,
}

/// Config file structure
#[derive(Debug, Clone, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    api_keys: Vec<ApiKeyEntry>,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// SQLite database file
    pub db_path: PathBuf,
    /// Path to config file
    pub config_path: PathBuf,
    /// Table name served under `/rest/v1/`
    pub table: String,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let port = std::env::var("SHOPKEEP_SERVER_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let db_path = std::env::var("SHOPKEEP_SERVER_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("shopkeep-server")
                    .join("kv.db")
            });

        let config_path = std::env::var("SHOPKEEP_SERVER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("shopkeep-server")
                    .join("config.yaml")
            });

        let table = std::env::var("SHOPKEEP_SERVER_TABLE")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TABLE.to_string());

        Self {
            port,
            db_path,
            config_path,
            table,
        }
    }
}

/// Authenticated client info, added to request extensions after auth
#[derive(Debug, Clone, PartialEq)]
pub struct AuthClient {
    pub name: String,
}

/// API key store - maps key -> AuthClient
#[derive(Debug, Clone, Default)]
pub struct ApiKeyStore {
    keys: HashMap<String, AuthClient>,
}

impl ApiKeyStore {
    /// Load API keys from config file
    pub fn load(config_path: &Path) -> Self {
        match std::fs::read_to_string(config_path) {
            Ok(contents) => match Self::from_yaml(&contents) {
                Ok(store) => {
                    tracing::info!("Loaded {} API key(s)", store.len());
                    store
                }
                Err(e) => {
                    tracing::warn!("Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to read config file {}: {}",
                    config_path.display(),
                    e
                );
                tracing::warn!("No API keys loaded - all table requests will fail");
                Self::default()
            }
        }
    }

    /// Parses the `api_keys` list of a YAML config document.
    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        let config: ConfigFile = serde_yaml::from_str(contents)?;
        let mut keys = HashMap::new();
        for (index, entry) in config.api_keys.into_iter().enumerate() {
            let name = entry
                .name
                .unwrap_or_else(|| format!("client-{}", index + 1));
            keys.insert(entry.key, AuthClient { name });
        }
        Ok(Self { keys })
    }

    /// Builds a store from `(key, name)` pairs.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let keys = pairs
            .into_iter()
            .map(|(key, name)| {
                (
                    key.to_string(),
                    AuthClient {
                        name: name.to_string(),
                    },
                )
            })
            .collect();
        Self { keys }
    }

    /// Validate an API key and return the associated client
    pub fn validate(&self, key: &str) -> Option<AuthClient> {
        self.keys.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
