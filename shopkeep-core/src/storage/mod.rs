//! Durable slot storage.
//!
//! A [`SlotStorage`] is a flat, string-keyed text store: the same shape as a
//! browser's local storage. Every persisted collection lives in exactly one
//! slot, and slots are namespaced by a key prefix (e.g. `shopkeep-inventory`).
//!
//! The [`read_slot`] and [`write_slot`] helpers sit on top of the raw backend
//! and apply the obfuscation codec for sensitive keys, so every caller that
//! touches slot contents goes through the same encode path.

mod file;
mod memory;

use std::io;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;

use crate::codec;

pub use file::FileStorage;
pub use memory::MemoryStorage;

/// Backend for named text slots.
pub trait SlotStorage: Send + Sync {
    /// Returns the stored text for `key`, or `None` if the slot was never written.
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replaces the stored text for `key`.
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removes a slot. Removing a missing slot is not an error.
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;

    /// Returns every slot key, sorted.
    fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Returns every slot key starting with `prefix`, sorted.
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .keys()?
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .collect())
    }
}

/// Errors that can occur during slot storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// I/O error reading or writing a slot file.
    Io(PathBuf, io::Error),
    /// The write would push the backend past its size quota.
    QuotaExceeded {
        key: String,
        needed: usize,
        quota: usize,
    },
    /// The key cannot be stored by this backend.
    InvalidKey(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Io(path, e) => write!(f, "I/O error for {}: {}", path.display(), e),
            StorageError::QuotaExceeded { key, needed, quota } => write!(
                f,
                "Storage quota exceeded writing '{}': need {} bytes, quota is {}",
                key, needed, quota
            ),
            StorageError::InvalidKey(key) => write!(f, "Invalid slot key: '{}'", key),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(_, e) => Some(e),
            _ => None,
        }
    }
}

/// Outcome of reading a slot through the codec.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotRead {
    /// The slot has never been written.
    Missing,
    /// The slot decoded cleanly.
    Value(Value),
    /// The slot holds text that is neither JSON nor a readable envelope.
    Corrupt,
}

/// Reads a slot, decoding the envelope if the key is sensitive.
///
/// Sensitive keys accept plain JSON too, for slots written before the key
/// joined the denylist.
pub fn read_slot(storage: &dyn SlotStorage, key: &str) -> Result<SlotRead, StorageError> {
    let Some(stored) = storage.get_item(key)? else {
        return Ok(SlotRead::Missing);
    };

    let decoded = if codec::is_sensitive(key) {
        codec::decode(&stored)
    } else {
        serde_json::from_str(&stored).ok()
    };

    Ok(match decoded {
        Some(value) => SlotRead::Value(value),
        None => SlotRead::Corrupt,
    })
}

/// Serializes `value` into the text form stored under `key`.
pub fn slot_text<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<String, SlotWriteError> {
    if codec::is_sensitive(key) {
        let encoded = codec::encode(value);
        if encoded.is_empty() {
            return Err(SlotWriteError::Serialize(format!(
                "could not encode value for '{}'",
                key
            )));
        }
        Ok(encoded)
    } else {
        serde_json::to_string(value).map_err(|e| SlotWriteError::Serialize(e.to_string()))
    }
}

/// Writes a slot, encoding it if the key is sensitive.
pub fn write_slot<T: Serialize + ?Sized>(
    storage: &dyn SlotStorage,
    key: &str,
    value: &T,
) -> Result<(), SlotWriteError> {
    let text = slot_text(key, value)?;
    storage.set_item(key, &text)?;
    Ok(())
}

/// Errors from [`write_slot`].
#[derive(Debug)]
pub enum SlotWriteError {
    /// The value could not be turned into slot text.
    Serialize(String),
    /// The backend rejected the write.
    Storage(StorageError),
}

impl std::fmt::Display for SlotWriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotWriteError::Serialize(e) => write!(f, "Serialization error: {}", e),
            SlotWriteError::Storage(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SlotWriteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SlotWriteError::Storage(e) => Some(e),
            SlotWriteError::Serialize(_) => None,
        }
    }
}

impl From<StorageError> for SlotWriteError {
    fn from(e: StorageError) -> Self {
        SlotWriteError::Storage(e)
    }
}
