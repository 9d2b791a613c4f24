//! In-process slot storage.

use std::collections::BTreeMap;
use std::sync::RwLock;

use super::{SlotStorage, StorageError};

/// Slot storage held in memory.
///
/// With a quota, writes that would grow the total size (key plus value bytes
/// over all slots) past it fail with [`StorageError::QuotaExceeded`], the same
/// way a browser's local storage rejects writes once it is full.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    slots: RwLock<BTreeMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStorage {
    /// Creates an unbounded in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an in-memory storage that holds at most `quota` bytes.
    pub fn with_quota(quota: usize) -> Self {
        Self {
            slots: RwLock::new(BTreeMap::new()),
            quota: Some(quota),
        }
    }

    /// Total bytes currently stored.
    pub fn used_bytes(&self) -> usize {
        let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
        slots.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

impl SlotStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
        Ok(slots.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());

        if let Some(quota) = self.quota {
            let current: usize = slots
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = current + key.len() + value.len();
            if needed > quota {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    quota,
                });
            }
        }

        slots.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        slots.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
        Ok(slots.keys().cloned().collect())
    }
}
