//! Last-used registration preferences
//!
//! A single small JSON document. Writes replace the whole file atomically
//! (temp file + rename), so a reader sees either the old or the new snapshot.

use crate::interface::{PreferenceSnapshot, StorageError, StoreKind};
use parking_lot::{Mutex, RwLock};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum PreferenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PreferenceError {
    fn into_storage(self) -> StorageError {
        StorageError::new(StoreKind::Preferences, self.to_string())
    }
}

/// Key-value snapshot of the last successful registration
pub trait PreferenceStore: Send + Sync {
    fn set(&self, last_email: &str, at_millis: i64) -> Result<(), StorageError>;

    fn try_get(&self) -> Result<PreferenceSnapshot, StorageError>;

    /// Never fails: an unreadable snapshot reads as the unset defaults
    fn get(&self) -> PreferenceSnapshot {
        self.try_get().unwrap_or_else(|err| {
            warn!(error = %err, "preference read failed, using defaults");
            PreferenceSnapshot::default()
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// JSON file backend
// ─────────────────────────────────────────────────────────────────────────────

pub struct JsonPreferenceFile {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonPreferenceFile {
    /// The file is created lazily on the first `set`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_snapshot(&self, snapshot: &PreferenceSnapshot) -> Result<(), PreferenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let bytes = serde_json::to_vec_pretty(snapshot)?;
        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn read_snapshot(&self) -> Result<PreferenceSnapshot, PreferenceError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(PreferenceSnapshot::default()),
            Err(err) => Err(err.into()),
        }
    }
}

impl PreferenceStore for JsonPreferenceFile {
    fn set(&self, last_email: &str, at_millis: i64) -> Result<(), StorageError> {
        let _write = self.write_lock.lock();
        let snapshot = PreferenceSnapshot {
            last_email: last_email.to_string(),
            last_saved_at_millis: at_millis,
        };
        self.write_snapshot(&snapshot)
            .map_err(PreferenceError::into_storage)
    }

    fn try_get(&self) -> Result<PreferenceSnapshot, StorageError> {
        self.read_snapshot().map_err(PreferenceError::into_storage)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory backend
// ─────────────────────────────────────────────────────────────────────────────

/// Process-local preferences, used by in-memory registries
#[derive(Default)]
pub struct InMemoryPreferences {
    snapshot: RwLock<PreferenceSnapshot>,
}

impl PreferenceStore for InMemoryPreferences {
    fn set(&self, last_email: &str, at_millis: i64) -> Result<(), StorageError> {
        *self.snapshot.write() = PreferenceSnapshot {
            last_email: last_email.to_string(),
            last_saved_at_millis: at_millis,
        };
        Ok(())
    }

    fn try_get(&self) -> Result<PreferenceSnapshot, StorageError> {
        Ok(self.snapshot.read().clone())
    }
}
