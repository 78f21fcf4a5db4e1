//! Secure record store: the singleton wallet-record repository.
//!
//! Exactly one [`WalletRecord`] may exist per device profile, held under a
//! fixed key. The repository object makes that invariant explicit and lets
//! the lifecycle controller be tested against an in-memory fake.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::envelope::WalletRecord;
use crate::errors::{WalletError, WalletResult};

/// Fixed singleton file name within a device profile directory.
const RECORD_FILE: &str = "wallet.record.json";

/// Repository owning the single persisted wallet slot.
pub trait RecordStore: Send + Sync {
    /// Load the record, or `None` when no wallet exists.
    fn load(&self) -> WalletResult<Option<WalletRecord>>;

    /// Persist the record, replacing any previous contents of the slot.
    fn save(&self, record: &WalletRecord) -> WalletResult<()>;

    /// Remove the record. Missing record is not an error; deletion is the
    /// one best-effort operation in the subsystem.
    fn delete(&self) -> WalletResult<()>;

    fn exists(&self) -> bool;
}

/// File-backed store writing via temp-file + rename so a crash mid-write
/// never leaves a truncated record.
#[derive(Debug, Clone)]
pub struct FileRecordStore {
    path: PathBuf,
}

impl FileRecordStore {
    pub fn new(profile_dir: impl AsRef<Path>) -> Self {
        Self {
            path: profile_dir.as_ref().join(RECORD_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordStore for FileRecordStore {
    fn load(&self) -> WalletResult<Option<WalletRecord>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&self.path)
            .map_err(|e| WalletError::StorageReadFailed(e.to_string()))?;
        let record: WalletRecord = serde_json::from_slice(&bytes)
            .map_err(|e| WalletError::StorageReadFailed(format!("Malformed record: {}", e)))?;
        record.validate()?;
        Ok(Some(record))
    }

    fn save(&self, record: &WalletRecord) -> WalletResult<()> {
        record.validate()?;

        let serialized = serde_json::to_vec_pretty(record)
            .map_err(|e| WalletError::StorageWriteFailed(e.to_string()))?;

        let dir = self.path.parent().ok_or_else(|| {
            WalletError::StorageWriteFailed("Invalid record path".to_string())
        })?;
        fs::create_dir_all(dir).map_err(|e| WalletError::StorageWriteFailed(e.to_string()))?;

        let tmp_path = self.path.with_extension("new");
        {
            let mut file = File::create(&tmp_path)
                .map_err(|e| WalletError::StorageWriteFailed(e.to_string()))?;
            file.write_all(&serialized)
                .map_err(|e| WalletError::StorageWriteFailed(e.to_string()))?;
            file.sync_all()
                .map_err(|e| WalletError::StorageWriteFailed(e.to_string()))?;
        }
        fs::rename(&tmp_path, &self.path)
            .map_err(|e| WalletError::StorageWriteFailed(e.to_string()))?;
        Ok(())
    }

    fn delete(&self) -> WalletResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WalletError::StorageWriteFailed(e.to_string())),
        }
    }

    fn exists(&self) -> bool {
        self.path.exists()
    }
}

/// In-memory fake for tests and ephemeral profiles.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    slot: Mutex<Option<WalletRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryRecordStore {
    fn load(&self) -> WalletResult<Option<WalletRecord>> {
        let slot = self.slot.lock();
        if let Some(record) = slot.as_ref() {
            record.validate()?;
        }
        Ok(slot.clone())
    }

    fn save(&self, record: &WalletRecord) -> WalletResult<()> {
        record.validate()?;
        *self.slot.lock() = Some(record.clone());
        Ok(())
    }

    fn delete(&self) -> WalletResult<()> {
        *self.slot.lock() = None;
        Ok(())
    }

    fn exists(&self) -> bool {
        self.slot.lock().is_some()
    }
}
