//! Sync CLI commands for mirroring slots to the remote table.

use clap::{Args, Subcommand};
use serde_json::Value;
use std::sync::Arc;

use shopkeep_core::{
    read_slot, HttpRemoteTable, MirrorConfig, PersistentStore, RemoteCredentials, RemoteError, RemoteMirror,
    RemoteTable, SlotRead, SlotStorage, StorageError, SyncStatus,
};

use crate::config::Config;

/// Sync slots with the remote table
#[derive(Debug, Args)]
pub struct SyncCommand {
    #[command(subcommand)]
    command: Option<SyncSubcommand>,
}

#[derive(Debug, Subcommand)]
enum SyncSubcommand {
    /// Show sync configuration
    Status,

    /// Replace a local slot with its remote row, if one exists
    Pull {
        /// Slot name (prefix optional)
        name: String,
    },

    /// Upload a local slot to the remote table
    Push {
        /// Slot name (prefix optional)
        name: String,
    },
}

impl SyncCommand {
    pub fn run(&self, config: &Config) -> Result<(), SyncCommandError> {
        // Use tokio runtime for async operations
        let rt = tokio::runtime::Runtime::new()
            .map_err(|e| SyncCommandError::RuntimeError(e.to_string()))?;

        match &self.command {
            None | Some(SyncSubcommand::Status) => {
                self.status(config);
                Ok(())
            }
            Some(SyncSubcommand::Pull { name }) => rt.block_on(self.pull(config, name)),
            Some(SyncSubcommand::Push { name }) => rt.block_on(self.push(config, name)),
        }
    }

    fn status(&self, config: &Config) {
        println!("Sync Configuration");
        println!("==================");
        println!();

        let storage = config.storage();
        match RemoteCredentials::load(storage.as_ref(), &config.credentials_key()) {
            Some(creds) => {
                println!("Status:   Configured");
                println!("URL:      {}", creds.url);
                println!("Table:    {}", creds.table);
            }
            None => {
                println!("Status:   Not configured");
            }
        }
    }

    async fn pull(&self, config: &Config, name: &str) -> Result<(), SyncCommandError> {
        let key = config.slot_key(name);
        if key == config.credentials_key() {
            return Err(SyncCommandError::CredentialsSlot);
        }

        let storage = config.storage();
        let remote = Arc::new(HttpRemoteTable::new(
            Arc::clone(&storage),
            config.credentials_key(),
        ));
        if !remote.is_enabled() {
            return Err(SyncCommandError::Remote(RemoteError::NotConfigured));
        }

        let status = pull_slot(storage, remote, &key).await;
        match status {
            SyncStatus::Synced => println!("  ✓ {} updated from remote", key),
            SyncStatus::Idle => println!("  ✓ {} has no remote row, kept local value", key),
            _ => {
                println!("  ✗ {} could not be pulled", key);
                return Err(SyncCommandError::PullFailed(key));
            }
        }
        Ok(())
    }

    async fn push(&self, config: &Config, name: &str) -> Result<(), SyncCommandError> {
        let key = config.slot_key(name);
        if key == config.credentials_key() {
            return Err(SyncCommandError::CredentialsSlot);
        }

        let storage = config.storage();
        let value = match read_slot(storage.as_ref(), &key)? {
            SlotRead::Value(value) => value,
            SlotRead::Missing => return Err(SyncCommandError::SlotNotFound(key)),
            SlotRead::Corrupt => return Err(SyncCommandError::SlotUnreadable(key)),
        };

        let remote = HttpRemoteTable::new(storage, config.credentials_key());
        remote.upsert(&key, &value).await?;

        println!("  ✓ {} pushed to remote", key);
        Ok(())
    }
}

/// Runs one mount-time fetch for `key` and returns the resulting status.
async fn pull_slot(
    storage: Arc<dyn SlotStorage>,
    remote: Arc<dyn RemoteTable>,
    key: &str,
) -> SyncStatus {
    let store = PersistentStore::open(storage, key, Value::Null);
    let mirror = RemoteMirror::new(store, remote, MirrorConfig::default());
    mirror.hydrate().await;
    mirror.unmount();
    mirror.status()
}

/// Errors from sync commands
#[derive(Debug)]
pub enum SyncCommandError {
    Remote(RemoteError),
    Storage(StorageError),
    SlotNotFound(String),
    SlotUnreadable(String),
    PullFailed(String),
    CredentialsSlot,
    RuntimeError(String),
}

impl std::fmt::Display for SyncCommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncCommandError::Remote(e) => write!(f, "{}", e),
            SyncCommandError::Storage(e) => write!(f, "{}", e),
            SyncCommandError::SlotNotFound(key) => write!(f, "Slot '{}' not found", key),
            SyncCommandError::SlotUnreadable(key) => write!(f, "Slot '{}' is unreadable", key),
            SyncCommandError::PullFailed(key) => {
                write!(f, "Failed to pull '{}' from remote (see log)", key)
            }
            SyncCommandError::CredentialsSlot => {
                write!(f, "The credentials slot is never synced")
            }
            SyncCommandError::RuntimeError(e) => write!(f, "Runtime error: {}", e),
        }
    }
}

impl std::error::Error for SyncCommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncCommandError::Remote(e) => Some(e),
            SyncCommandError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RemoteError> for SyncCommandError {
    fn from(e: RemoteError) -> Self {
        SyncCommandError::Remote(e)
    }
}

impl From<StorageError> for SyncCommandError {
    fn from(e: StorageError) -> Self {
        SyncCommandError::Storage(e)
    }
}
