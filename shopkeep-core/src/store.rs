//! Keyed persistent store.
//!
//! A [`PersistentStore`] binds an in-memory value to exactly one named slot.
//! It hydrates from storage when opened, persists synchronously on every
//! write, and notifies subscribers after each change.
//!
//! ```ignore
//! let storage: Arc<dyn SlotStorage> = Arc::new(FileStorage::new(data_dir));
//! let customers = PersistentStore::open(storage, "shopkeep-customers", Vec::<Customer>::new());
//!
//! customers.update(|list| {
//!     let mut next = list.clone();
//!     next.push(customer);
//!     next
//! });
//! ```

use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;

use crate::codec;
use crate::storage::{read_slot, write_slot, SlotRead, SlotStorage};

/// Handle to one persisted slot.
///
/// Clones share the same in-memory value. Separate [`PersistentStore::open`]
/// calls against the same key do not: each one hydrates its own copy and they
/// can drift apart until one of them is reopened.
pub struct PersistentStore<T> {
    storage: Arc<dyn SlotStorage>,
    key: Arc<str>,
    sensitive: bool,
    state: Arc<watch::Sender<T>>,
    /// Serializes writers so updaters compose without holding the value lock
    writer: Arc<Mutex<()>>,
}

impl<T> Clone for PersistentStore<T> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            key: Arc::clone(&self.key),
            sensitive: self.sensitive,
            state: Arc::clone(&self.state),
            writer: Arc::clone(&self.writer),
        }
    }
}

impl<T> std::fmt::Debug for PersistentStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentStore")
            .field("key", &self.key)
            .field("sensitive", &self.sensitive)
            .finish_non_exhaustive()
    }
}

impl<T> PersistentStore<T> {
    /// Returns the slot key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns true if the slot is obfuscated at rest.
    pub fn is_sensitive(&self) -> bool {
        self.sensitive
    }
}

impl<T> PersistentStore<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Opens the slot `key`, hydrating from storage.
    ///
    /// Falls back to `initial` when the slot is missing, unreadable, or holds
    /// a value of the wrong shape. Never fails.
    pub fn open(storage: Arc<dyn SlotStorage>, key: impl Into<String>, initial: T) -> Self {
        let key: String = key.into();
        let sensitive = codec::is_sensitive(&key);
        let value = Self::hydrate(storage.as_ref(), &key, initial);
        let (state, _) = watch::channel(value);

        Self {
            storage,
            key: key.into(),
            sensitive,
            state: Arc::new(state),
            writer: Arc::new(Mutex::new(())),
        }
    }

    fn hydrate(storage: &dyn SlotStorage, key: &str, initial: T) -> T {
        match read_slot(storage, key) {
            Ok(SlotRead::Missing) => initial,
            Ok(SlotRead::Value(value)) => match serde_json::from_value(value) {
                Ok(typed) => typed,
                Err(e) => {
                    tracing::warn!("Slot '{}' has unexpected shape, using default: {}", key, e);
                    initial
                }
            },
            Ok(SlotRead::Corrupt) => {
                tracing::warn!("Slot '{}' is unreadable, using default", key);
                initial
            }
            Err(e) => {
                tracing::warn!("Failed to read slot '{}', using default: {}", key, e);
                initial
            }
        }
    }

    /// Returns a copy of the current value.
    pub fn get(&self) -> T {
        self.state.borrow().clone()
    }

    /// Runs `f` against the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.state.borrow())
    }

    /// Replaces the value.
    pub fn set(&self, value: T) {
        self.update(|_| value);
    }

    /// Replaces the value with `f(current)`.
    ///
    /// `f` sees the latest value, including every earlier write on this
    /// handle, so consecutive updaters compose instead of clobbering. `f` may
    /// read the store but must not write to it.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let _writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let current = self.get();
        let next = f(&current);
        self.persist(&next);
        self.state.send_replace(next);
    }

    /// Subscribes to value changes.
    ///
    /// The receiver starts with the current value marked as seen.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.state.subscribe()
    }

    fn persist(&self, value: &T) {
        if let Err(e) = write_slot(self.storage.as_ref(), &self.key, value) {
            tracing::error!("Failed to persist slot '{}': {}", self.key, e);
        }
    }
}
