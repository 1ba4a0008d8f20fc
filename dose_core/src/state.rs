//! Ledger snapshot persistence with file locking.
//!
//! The engine itself never touches disk; hosts use this module to keep a
//! patient's ledger between runs.

use crate::{Error, LedgerSnapshot, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;

impl LedgerSnapshot {
    /// Load a snapshot from a file with shared locking
    ///
    /// Returns an empty snapshot for `patient_id` if the file doesn't exist.
    /// If the file is corrupted, logs a warning and starts empty.
    pub fn load(path: &Path, patient_id: &str) -> Result<Self> {
        let empty = || Self {
            patient_id: patient_id.to_string(),
            ..Self::default()
        };

        if !path.exists() {
            tracing::info!("No ledger snapshot for {}, starting empty", patient_id);
            return Ok(empty());
        }

        let file = File::open(path)?;
        file.lock_shared()?;

        let mut contents = String::new();
        let read = std::io::BufReader::new(&file).read_to_string(&mut contents);
        file.unlock()?;
        read?;

        match serde_json::from_str::<LedgerSnapshot>(&contents) {
            Ok(snapshot) if snapshot.patient_id == patient_id => {
                tracing::debug!(
                    "Loaded {} doses for {} from {:?}",
                    snapshot.instances.len(),
                    patient_id,
                    path
                );
                Ok(snapshot)
            }
            Ok(snapshot) => Err(Error::State(format!(
                "Snapshot {:?} belongs to patient {}, not {}",
                path, snapshot.patient_id, patient_id
            ))),
            Err(e) => {
                tracing::warn!(
                    "Failed to parse ledger snapshot {:?}: {}. Starting empty.",
                    path,
                    e
                );
                Ok(empty())
            }
        }
    }

    /// Save a snapshot with exclusive locking
    ///
    /// Atomically writes by:
    /// 1. Writing to a temp file in the same directory
    /// 2. Syncing to disk
    /// 3. Renaming over the original
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| Error::State(format!("Snapshot path {:?} has no parent", path)))?;
        std::fs::create_dir_all(parent)?;

        let temp = NamedTempFile::new_in(parent)?;
        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            let contents = serde_json::to_string(self)?;
            writer.write_all(contents.as_bytes())?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;

        temp.persist(path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Saved ledger snapshot for {} to {:?}", self.patient_id, path);
        Ok(())
    }
}

/// Exclusive hold on one patient's ledger across processes
///
/// Held for the whole load, change and save cycle so two hosts cannot both
/// log the same dose from stale snapshots. Released on drop.
#[derive(Debug)]
pub struct PatientLock {
    file: File,
}

impl PatientLock {
    /// Block until the lock file at `path` is exclusively held
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;
        file.lock_exclusive()?;
        tracing::debug!("Acquired patient lock {:?}", path);
        Ok(Self { file })
    }
}

impl Drop for PatientLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!("Failed to release patient lock: {}", e);
        }
    }
}
