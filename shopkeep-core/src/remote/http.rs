//! HTTP client for a PostgREST-style key-value table.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{RemoteCredentials, RemoteError, RemoteRecord, RemoteTable};
use crate::storage::SlotStorage;

/// Row shape returned by `select=value`.
#[derive(Debug, Deserialize)]
struct ValueRow {
    value: Value,
}

/// Remote table reached over HTTP.
///
/// Credentials are read from a local slot on every call rather than at
/// construction, so sync switches on as soon as the slot is written and off
/// again when it is cleared.
pub struct HttpRemoteTable {
    storage: Arc<dyn SlotStorage>,
    credentials_key: String,
    client: reqwest::Client,
}

impl HttpRemoteTable {
    /// Creates a remote table that reads its credentials from `credentials_key`.
    pub fn new(storage: Arc<dyn SlotStorage>, credentials_key: impl Into<String>) -> Self {
        Self {
            storage,
            credentials_key: credentials_key.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Returns the slot key holding the credentials.
    pub fn credentials_key(&self) -> &str {
        &self.credentials_key
    }

    fn credentials(&self) -> Result<RemoteCredentials, RemoteError> {
        RemoteCredentials::load(self.storage.as_ref(), &self.credentials_key)
            .ok_or(RemoteError::NotConfigured)
    }

    /// Builds the select URL for a single key.
    pub fn build_select_url(creds: &RemoteCredentials, key: &str) -> String {
        format!(
            "{}?select=value&key=eq.{}",
            Self::build_table_url(creds),
            urlencoding::encode(key)
        )
    }

    /// Builds the upsert URL.
    pub fn build_upsert_url(creds: &RemoteCredentials) -> String {
        format!("{}?on_conflict=key", Self::build_table_url(creds))
    }

    fn build_table_url(creds: &RemoteCredentials) -> String {
        let base = creds.url.trim().trim_end_matches('/');
        let base = if base.starts_with("http://") || base.starts_with("https://") {
            base.to_string()
        } else {
            format!("https://{}", base)
        };
        format!("{}/rest/v1/{}", base, urlencoding::encode(&creds.table))
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl RemoteTable for HttpRemoteTable {
    fn is_enabled(&self) -> bool {
        self.credentials().is_ok()
    }

    async fn fetch(&self, key: &str) -> Result<Option<Value>, RemoteError> {
        let creds = self.credentials()?;

        let response = self
            .client
            .get(Self::build_select_url(&creds, key))
            .header("apikey", &creds.anon_key)
            .bearer_auth(&creds.anon_key)
            .send()
            .await
            .map_err(|e| RemoteError::Http(e.to_string()))?;

        let rows: Vec<ValueRow> = Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;

        Ok(rows.into_iter().next().map(|row| row.value))
    }

    async fn upsert(&self, key: &str, value: &Value) -> Result<(), RemoteError> {
        let creds = self.credentials()?;
        let body = [RemoteRecord {
            key: key.to_string(),
            value: value.clone(),
        }];

        let response = self
            .client
            .post(Self::build_upsert_url(&creds))
            .header("apikey", &creds.anon_key)
            .bearer_auth(&creds.anon_key)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&body)
            .send()
            .await
            .map_err(|e| RemoteError::Http(e.to_string()))?;

        Self::check_status(response).await?;
        Ok(())
    }
}
