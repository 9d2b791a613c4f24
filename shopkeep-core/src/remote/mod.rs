//! Remote key-value table.
//!
//! The remote side of slot mirroring is a two-column table (`key` text
//! primary key, `value` JSON) that supports a point select and an
//! upsert-on-conflict by key. [`HttpRemoteTable`] talks to any backend that
//! speaks the PostgREST dialect for that table; [`MemoryRemoteTable`] keeps
//! rows in process.

mod http;
mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::storage::{read_slot, SlotRead, SlotStorage};

pub use http::HttpRemoteTable;
pub use memory::MemoryRemoteTable;

/// Default remote table name.
pub const DEFAULT_TABLE: &str = "kv_store";

/// Slot name (without prefix) holding [`RemoteCredentials`].
pub const CREDENTIALS_SLOT: &str = "supabase-config";

/// Errors that can occur talking to the remote table.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Remote sync not configured. Set a URL and access key first.")]
    NotConfigured,

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Remote returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode remote response: {0}")]
    Decode(String),
}

/// A row of the remote table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub key: String,
    pub value: Value,
}

/// Point select and upsert over the remote table.
#[async_trait]
pub trait RemoteTable: Send + Sync {
    /// Returns true if the table can be reached with the current credentials.
    ///
    /// Checked before every operation, since credentials can show up after
    /// startup.
    fn is_enabled(&self) -> bool;

    /// Fetches the value stored under `key`.
    ///
    /// `Ok(None)` means the table has no row for `key`, which is not an error.
    async fn fetch(&self, key: &str) -> Result<Option<Value>, RemoteError>;

    /// Inserts or replaces the row for `key`.
    async fn upsert(&self, key: &str, value: &Value) -> Result<(), RemoteError>;
}

/// Connection details for the remote table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteCredentials {
    /// Base URL of the backend (e.g. `https://project.example.co`)
    #[serde(default)]
    pub url: String,
    /// Public access key sent as `apikey` and bearer token
    #[serde(default, alias = "anonKey")]
    pub anon_key: String,
    /// Table name
    #[serde(default = "default_table")]
    pub table: String,
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

impl RemoteCredentials {
    /// Creates credentials for the default table.
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            anon_key: anon_key.into(),
            table: default_table(),
        }
    }

    /// Returns true if both a URL and an access key are present.
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty() && !self.anon_key.trim().is_empty()
    }

    /// Loads credentials from the slot `key`.
    ///
    /// Returns `None` when the slot is missing, unreadable, or incomplete.
    pub fn load(storage: &dyn SlotStorage, key: &str) -> Option<Self> {
        let value = match read_slot(storage, key) {
            Ok(SlotRead::Value(value)) => value,
            Ok(SlotRead::Missing) => return None,
            Ok(SlotRead::Corrupt) => {
                tracing::warn!("Remote credentials slot '{}' is unreadable", key);
                return None;
            }
            Err(e) => {
                tracing::warn!("Failed to read remote credentials '{}': {}", key, e);
                return None;
            }
        };

        serde_json::from_value::<Self>(value)
            .ok()
            .filter(Self::is_configured)
    }
}
