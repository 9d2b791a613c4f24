//! Shopkeep Core Library
//!
//! Slot storage for the Shopkeep point-of-sale app: every collection lives
//! in one named slot, sensitive slots are obfuscated at rest, and selected
//! slots can be mirrored to a remote key-value table.

pub mod backup;
pub mod codec;
pub mod mirror;
pub mod remote;
pub mod storage;
pub mod store;

pub use backup::{Backup, BackupError, RestoreReport};
pub use codec::{decode, encode, is_sensitive};
pub use mirror::{MirrorConfig, RemoteMirror, SyncStatus};
pub use remote::{
    HttpRemoteTable, MemoryRemoteTable, RemoteCredentials, RemoteError, RemoteRecord, RemoteTable,
};
pub use storage::{
    read_slot, write_slot, FileStorage, MemoryStorage, SlotRead, SlotStorage, SlotWriteError,
    StorageError,
};
pub use store::PersistentStore;

/// Default slot key prefix.
pub const DEFAULT_PREFIX: &str = "shopkeep-";

/// Builds the full slot key for `name` under `prefix`.
pub fn slot_key(prefix: &str, name: &str) -> String {
    if name.starts_with(prefix) {
        name.to_string()
    } else {
        format!("{}{}", prefix, name)
    }
}

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
