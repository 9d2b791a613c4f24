//! Server-side modules for the Shopkeep key-value table server.

pub mod api;
pub mod config;
pub mod storage;

pub use api::{router, AppState};
pub use config::{ApiKeyStore, AuthClient, ServerConfig};
pub use storage::{KvStore, KvStoreError};
