//! Snapshot-file durability for on-disk stores.
//!
//! The whole committed state is rewritten on every commit: serialized with
//! MessagePack into a temporary file next to the target, synced, then
//! renamed over `<dir>/<name>.snapshot`.

use super::table::StoreSnapshot;
use crate::core::{Result, StoreError};
use crate::entity::Record;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurabilityMode {
    /// Keep everything in memory only.
    None,
    /// Rewrite the snapshot file before each commit is published.
    #[default]
    OnCommit,
}

// ============================================================================
// Snapshot file format
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub format: u32,
    pub version: u64,
    pub next_sequence: u64,
    pub records: Vec<Record>,
    pub metadata: SnapshotMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub created_at: DateTime<Utc>,
    pub record_count: usize,
    pub entity_count: usize,
}

impl SnapshotFile {
    pub fn capture(snapshot: &StoreSnapshot, next_sequence: u64) -> Self {
        let records: Vec<Record> = snapshot
            .all_records()
            .map(|record| record.as_ref().clone())
            .collect();

        Self {
            format: FORMAT_VERSION,
            version: snapshot.version(),
            next_sequence,
            metadata: SnapshotMetadata {
                created_at: Utc::now(),
                record_count: records.len(),
                entity_count: snapshot.entity_names().len(),
            },
            records,
        }
    }

    pub fn into_snapshot(self) -> (StoreSnapshot, u64) {
        let snapshot = StoreSnapshot::from_records(self.version, self.records);
        let next_sequence = snapshot
            .max_sequence()
            .map(|max| max + 1)
            .unwrap_or(1)
            .max(self.next_sequence);
        (snapshot, next_sequence)
    }
}

// ============================================================================
// Snapshot Manager
// ============================================================================

#[derive(Debug, Clone)]
pub struct SnapshotManager {
    snapshot_path: PathBuf,
}

impl SnapshotManager {
    pub fn new(dir: &Path, store_name: &str) -> Self {
        Self {
            snapshot_path: dir.join(format!("{}.snapshot", store_name)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn exists(&self) -> bool {
        self.snapshot_path.exists()
    }

    pub fn save(&self, file: &SnapshotFile) -> Result<()> {
        let dir = self
            .snapshot_path
            .parent()
            .ok_or_else(|| io_error("Snapshot path has no parent directory"))?;
        fs::create_dir_all(dir)
            .map_err(|e| io_error(format!("Failed to create snapshot directory: {}", e)))?;

        let serialized = rmp_serde::to_vec(file).map_err(|e| {
            StoreError::Serialization(format!("Failed to serialize snapshot: {}", e))
        })?;

        let temp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| io_error(format!("Failed to create temp file: {}", e)))?;
        let mut writer = BufWriter::new(temp);
        writer
            .write_all(&serialized)
            .map_err(|e| io_error(format!("Failed to write snapshot: {}", e)))?;
        let temp = writer
            .into_inner()
            .map_err(|e| io_error(format!("Failed to flush snapshot: {}", e)))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| io_error(format!("Failed to sync snapshot: {}", e)))?;
        temp.persist(&self.snapshot_path)
            .map_err(|e| io_error(format!("Failed to rename snapshot: {}", e)))?;

        Ok(())
    }

    pub fn load(&self) -> Result<Option<SnapshotFile>> {
        if !self.exists() {
            return Ok(None);
        }

        let mut data = Vec::new();
        File::open(&self.snapshot_path)
            .and_then(|mut file| file.read_to_end(&mut data))
            .map_err(|e| io_error(format!("Failed to read snapshot: {}", e)))?;

        let file: SnapshotFile = rmp_serde::from_slice(&data).map_err(|e| {
            StoreError::Serialization(format!("Failed to deserialize snapshot: {}", e))
        })?;
        if file.format != FORMAT_VERSION {
            return Err(StoreError::Serialization(format!(
                "Unsupported snapshot format {}",
                file.format
            ))
            .into());
        }
        Ok(Some(file))
    }

    pub fn delete(&self) -> Result<()> {
        if self.exists() {
            fs::remove_file(&self.snapshot_path)
                .map_err(|e| io_error(format!("Failed to delete snapshot: {}", e)))?;
        }
        Ok(())
    }
}

fn io_error(message: impl Into<String>) -> StoreError {
    StoreError::Io(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ObjectId;
    use crate::entity::Document;
    use tempfile::TempDir;

    fn snapshot_with(sequences: &[u64]) -> StoreSnapshot {
        StoreSnapshot::from_records(
            7,
            sequences
                .iter()
                .map(|seq| Record::new(ObjectId::new(), "student", *seq, Document::new())),
        )
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let manager = SnapshotManager::new(dir.path(), "school");
        assert!(manager.load().unwrap().is_none());

        manager
            .save(&SnapshotFile::capture(&snapshot_with(&[1, 2, 3]), 4))
            .unwrap();
        assert!(manager.path().ends_with("school.snapshot"));

        let file = manager.load().unwrap().unwrap();
        assert_eq!(file.metadata.record_count, 3);
        assert_eq!(file.metadata.entity_count, 1);

        let (snapshot, next_sequence) = file.into_snapshot();
        assert_eq!(snapshot.version(), 7);
        assert_eq!(snapshot.count("student"), 3);
        assert_eq!(next_sequence, 4);
    }

    #[test]
    fn test_next_sequence_never_reuses_stored_values() {
        let file = SnapshotFile::capture(&snapshot_with(&[10]), 2);
        let (_, next_sequence) = file.into_snapshot();
        assert_eq!(next_sequence, 11);
    }

    #[test]
    fn test_corrupt_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let manager = SnapshotManager::new(dir.path(), "school");
        fs::write(manager.path(), b"not messagepack").unwrap();

        assert!(manager.load().is_err());

        manager.delete().unwrap();
        assert!(!manager.exists());
    }
}
