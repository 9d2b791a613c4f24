//! File-backed slot storage.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;

use super::{SlotStorage, StorageError};

/// File extension for slot files.
const SLOT_EXTENSION: &str = "slot";

/// Extension of the temporary file a slot is written to before the rename.
const TEMP_EXTENSION: &str = "slot.tmp";

/// Slot storage persisted as one file per slot.
///
/// Slot keys are percent-encoded into file names, so any key is safe to use
/// and `keys()` can map files back to keys.
#[derive(Debug, Clone)]
pub struct FileStorage {
    data_dir: PathBuf,
}

impl FileStorage {
    /// Creates a new storage instance rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Returns the data directory path.
    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    /// Returns the full path of the file backing `key`.
    pub fn path(&self, key: &str) -> PathBuf {
        self.data_dir
            .join(format!("{}.{}", urlencoding::encode(key), SLOT_EXTENSION))
    }

    fn check_key(key: &str) -> Result<(), StorageError> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(())
    }
}

impl SlotStorage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Self::check_key(key)?;
        let path = self.path(key);

        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(path, e)),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        Self::check_key(key)?;

        // Ensure data directory exists
        fs::create_dir_all(&self.data_dir)
            .map_err(|e| StorageError::Io(self.data_dir.clone(), e))?;

        let path = self.path(key);

        // Write atomically using temp file + rename
        let temp_path = path.with_extension(TEMP_EXTENSION);

        let mut file =
            File::create(&temp_path).map_err(|e| StorageError::Io(temp_path.clone(), e))?;

        file.write_all(value.as_bytes())
            .map_err(|e| StorageError::Io(temp_path.clone(), e))?;

        file.sync_all()
            .map_err(|e| StorageError::Io(temp_path.clone(), e))?;

        fs::rename(&temp_path, &path).map_err(|e| StorageError::Io(path, e))
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        Self::check_key(key)?;
        let path = self.path(key);

        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(path, e)),
        }
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let entries = match fs::read_dir(&self.data_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::Io(self.data_dir.clone(), e)),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::Io(self.data_dir.clone(), e))?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(SLOT_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            match urlencoding::decode(stem) {
                Ok(key) => keys.push(key.into_owned()),
                Err(_) => tracing::warn!("Skipping slot file with undecodable name: {}", stem),
            }
        }

        keys.sort();
        Ok(keys)
    }
}
