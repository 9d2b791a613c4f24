//! Bulk export and restore of namespaced slots.
//!
//! A backup holds decoded values, not the stored text, and restore encodes
//! every slot through [`slot_text`], the same path the store writes with. A
//! backup taken before a key joined the sensitive list therefore comes back
//! obfuscated, and a backup never carries envelope text that a later codec
//! change could fail to read.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::storage::{read_slot, slot_text, SlotRead, SlotStorage, SlotWriteError, StorageError};

/// Current backup document version.
pub const BACKUP_VERSION: u32 = 1;

/// Errors that can occur during export or restore.
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to restore slot '{key}': {source}")]
    Write {
        key: String,
        #[source]
        source: SlotWriteError,
    },

    #[error("Invalid backup document: {0}")]
    Format(#[from] serde_json::Error),

    #[error("Unsupported backup version {0} (expected {})", BACKUP_VERSION)]
    UnsupportedVersion(u32),

    #[error("Backup was taken under prefix '{found}', not '{expected}'")]
    PrefixMismatch { expected: String, found: String },

    #[error("Backup slot '{key}' is outside prefix '{prefix}'")]
    ForeignKey { key: String, prefix: String },
}

/// Snapshot of every slot under a prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backup {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub prefix: String,
    pub slots: BTreeMap<String, Value>,
}

impl Backup {
    /// Serializes the backup as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, BackupError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses a backup document, rejecting unknown versions.
    pub fn from_json(text: &str) -> Result<Self, BackupError> {
        let backup: Backup = serde_json::from_str(text)?;
        if backup.version != BACKUP_VERSION {
            return Err(BackupError::UnsupportedVersion(backup.version));
        }
        Ok(backup)
    }
}

/// Outcome of a restore.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestoreReport {
    /// Slots removed before writing
    pub cleared: usize,
    /// Slots written from the backup
    pub restored: usize,
}

/// Exports every slot whose key starts with `prefix`.
///
/// Unreadable slots are left out with a warning rather than failing the whole
/// export.
pub fn export(storage: &dyn SlotStorage, prefix: &str) -> Result<Backup, BackupError> {
    let mut slots = BTreeMap::new();

    for key in storage.keys_with_prefix(prefix)? {
        match read_slot(storage, &key)? {
            SlotRead::Value(value) => {
                slots.insert(key, value);
            }
            SlotRead::Corrupt => tracing::warn!("Skipping unreadable slot '{}' in export", key),
            SlotRead::Missing => {}
        }
    }

    Ok(Backup {
        version: BACKUP_VERSION,
        exported_at: Utc::now(),
        prefix: prefix.to_string(),
        slots,
    })
}

/// Replaces every slot under `prefix` with the contents of `backup`.
///
/// The backup is checked and every slot is encoded before anything is
/// removed, so a rejected backup leaves storage untouched. Once clearing
/// starts, all existing slots with the prefix are removed, so slots missing
/// from the backup do not survive the restore.
pub fn restore(
    storage: &dyn SlotStorage,
    prefix: &str,
    backup: &Backup,
) -> Result<RestoreReport, BackupError> {
    if backup.prefix != prefix {
        return Err(BackupError::PrefixMismatch {
            expected: prefix.to_string(),
            found: backup.prefix.clone(),
        });
    }

    let mut encoded = Vec::with_capacity(backup.slots.len());
    for (key, value) in &backup.slots {
        if !key.starts_with(prefix) {
            return Err(BackupError::ForeignKey {
                key: key.clone(),
                prefix: prefix.to_string(),
            });
        }
        let text = slot_text(key, value).map_err(|source| BackupError::Write {
            key: key.clone(),
            source,
        })?;
        encoded.push((key, text));
    }

    let mut report = RestoreReport::default();

    for key in storage.keys_with_prefix(prefix)? {
        storage.remove_item(&key)?;
        report.cleared += 1;
    }

    for (key, text) in encoded {
        storage
            .set_item(key, &text)
            .map_err(|e| BackupError::Write {
                key: key.clone(),
                source: SlotWriteError::from(e),
            })?;
        report.restored += 1;
    }

    tracing::info!(
        "Restored {} slot(s) under '{}' ({} cleared)",
        report.restored,
        prefix,
        report.cleared
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::storage::{write_slot, MemoryStorage};
    use serde_json::json;

    fn seeded() -> MemoryStorage {
        let storage = MemoryStorage::new();
        write_slot(&storage, "shopkeep-inventory", &json!([{"sku": "A1", "qty": 3}])).unwrap();
        write_slot(&storage, "shopkeep-customers", &json!([{"name": "Alice"}])).unwrap();
        write_slot(&storage, "other-app-theme", &json!("dark")).unwrap();
        storage
    }

    #[test]
    fn test_export_decodes_prefixed_slots() {
        let storage = seeded();
        let backup = export(&storage, "shopkeep-").unwrap();

        assert_eq!(backup.version, BACKUP_VERSION);
        assert_eq!(backup.prefix, "shopkeep-");
        assert_eq!(backup.slots.len(), 2);
        assert_eq!(
            backup.slots["shopkeep-customers"],
            json!([{"name": "Alice"}])
        );
    }

    #[test]
    fn test_export_skips_corrupt_slots() {
        let storage = seeded();
        storage.set_item("shopkeep-sales", "ENC_broken").unwrap();

        let backup = export(&storage, "shopkeep-").unwrap();
        assert!(!backup.slots.contains_key("shopkeep-sales"));
    }

    #[test]
    fn test_restore_clears_then_writes_through_codec() {
        let source = seeded();
        let backup = export(&source, "shopkeep-").unwrap();

        let target = MemoryStorage::new();
        target.set_item("shopkeep-stale", "1").unwrap();
        target.set_item("other-app-theme", "\"light\"").unwrap();

        let report = restore(&target, "shopkeep-", &backup).unwrap();
        assert_eq!(report.cleared, 1);
        assert_eq!(report.restored, 2);

        assert_eq!(target.get_item("shopkeep-stale").unwrap(), None);
        assert_eq!(
            target.get_item("other-app-theme").unwrap(),
            Some("\"light\"".to_string())
        );

        let raw = target.get_item("shopkeep-customers").unwrap().unwrap();
        assert!(codec::is_envelope(&raw));
        assert_eq!(
            read_slot(&target, "shopkeep-customers").unwrap(),
            SlotRead::Value(json!([{"name": "Alice"}]))
        );
    }

    #[test]
    fn test_restore_rejects_foreign_keys_without_clearing() {
        let mut backup = export(&seeded(), "shopkeep-").unwrap();
        backup.slots.insert("elsewhere".to_string(), json!(1));

        let target = seeded();
        let err = restore(&target, "shopkeep-", &backup).unwrap_err();
        assert!(matches!(err, BackupError::ForeignKey { ref key, .. } if key == "elsewhere"));
        assert_eq!(target.get_item("elsewhere").unwrap(), None);
        assert_eq!(
            target.keys_with_prefix("shopkeep-").unwrap(),
            vec![
                "shopkeep-customers".to_string(),
                "shopkeep-inventory".to_string()
            ]
        );
    }

    #[test]
    fn test_restore_from_other_prefix_keeps_existing_data() {
        let source = MemoryStorage::new();
        write_slot(&source, "app-inventory", &json!([{"sku": "B2"}])).unwrap();
        let backup = export(&source, "app-").unwrap();

        let target = seeded();
        let err = restore(&target, "shopkeep-", &backup).unwrap_err();
        assert!(matches!(
            err,
            BackupError::PrefixMismatch { ref expected, ref found }
                if expected == "shopkeep-" && found == "app-"
        ));
        assert_eq!(
            read_slot(&target, "shopkeep-inventory").unwrap(),
            SlotRead::Value(json!([{"sku": "A1", "qty": 3}]))
        );
        assert_eq!(
            read_slot(&target, "shopkeep-customers").unwrap(),
            SlotRead::Value(json!([{"name": "Alice"}]))
        );
    }

    #[test]
    fn test_legacy_plain_sensitive_slot_is_obfuscated_after_restore() {
        let storage = MemoryStorage::new();
        storage
            .set_item("shopkeep-expenses", r#"[{"amount":12}]"#)
            .unwrap();

        let backup = export(&storage, "shopkeep-").unwrap();
        restore(&storage, "shopkeep-", &backup).unwrap();

        let raw = storage.get_item("shopkeep-expenses").unwrap().unwrap();
        assert!(codec::is_envelope(&raw));
    }

    #[test]
    fn test_json_roundtrip_and_version_check() {
        let backup = export(&seeded(), "shopkeep-").unwrap();
        let text = backup.to_json().unwrap();
        assert_eq!(Backup::from_json(&text).unwrap(), backup);

        let future = text.replacen("\"version\": 1", "\"version\": 9", 1);
        assert!(matches!(
            Backup::from_json(&future),
            Err(BackupError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_restore_reports_quota_failure() {
        let backup = export(&seeded(), "shopkeep-").unwrap();
        let target = MemoryStorage::with_quota(8);

        let err = restore(&target, "shopkeep-", &backup).unwrap_err();
        assert!(matches!(err, BackupError::Write { .. }));
    }
}
