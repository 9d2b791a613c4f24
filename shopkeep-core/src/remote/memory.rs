//! In-process remote table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::{RemoteError, RemoteRecord, RemoteTable};

/// Remote table kept in memory.
///
/// Records every upsert it receives and can be switched off or told to fail,
/// which makes it a stand-in for a real backend in tests and offline runs.
#[derive(Debug)]
pub struct MemoryRemoteTable {
    rows: Mutex<HashMap<String, Value>>,
    upserts: Mutex<Vec<RemoteRecord>>,
    fetches: Mutex<Vec<String>>,
    enabled: AtomicBool,
    failing: AtomicBool,
}

impl Default for MemoryRemoteTable {
    fn default() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            upserts: Mutex::new(Vec::new()),
            fetches: Mutex::new(Vec::new()),
            enabled: AtomicBool::new(true),
            failing: AtomicBool::new(false),
        }
    }
}

impl MemoryRemoteTable {
    /// Creates an empty, enabled table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a row without recording it as an upsert.
    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.rows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into(), value);
    }

    /// Returns the row stored under `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.rows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    /// Returns every upsert received, oldest first.
    pub fn upserts(&self) -> Vec<RemoteRecord> {
        self.upserts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Returns the keys of every fetch received, oldest first.
    pub fn fetches(&self) -> Vec<String> {
        self.fetches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Enables or disables the table, as if credentials were added or removed.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Makes every subsequent operation fail with an HTTP error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), RemoteError> {
        if !self.is_enabled() {
            return Err(RemoteError::NotConfigured);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(RemoteError::Http("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteTable for MemoryRemoteTable {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    async fn fetch(&self, key: &str) -> Result<Option<Value>, RemoteError> {
        self.fetches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(key.to_string());
        self.check()?;
        Ok(self.get(key))
    }

    async fn upsert(&self, key: &str, value: &Value) -> Result<(), RemoteError> {
        self.check()?;
        self.upserts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RemoteRecord {
                key: key.to_string(),
                value: value.clone(),
            });
        self.insert(key, value.clone());
        Ok(())
    }
}
