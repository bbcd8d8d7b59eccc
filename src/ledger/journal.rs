//! Write-intent journal
//!
//! Before a subject write touches disk, an intent marker naming the subject
//! and the version about to be written lands in `.journal/`. The marker is
//! removed once the record has been replaced. Markers found at startup
//! belong to interrupted writes and drive roll-forward recovery.

use std::fs;
use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::SubjectType;
use crate::store::atomic::{is_temp_file, remove_durable};
use crate::store::{read_json, write_json, Layout, StoreError, StoreResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteIntent {
    pub id: Uuid,
    pub subject_type: SubjectType,
    pub subject_id: String,
    pub version_number: u64,
    /// Record path relative to the storage root
    pub record_path: String,
    pub started_at: DateTime<Utc>,
}

impl WriteIntent {
    pub fn new(
        subject_type: SubjectType,
        subject_id: impl Into<String>,
        version_number: u64,
        record_path: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject_type,
            subject_id: subject_id.into(),
            version_number,
            record_path: record_path.into(),
            started_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Journal {
    dir: PathBuf,
}

impl Journal {
    pub fn new(layout: &Layout) -> Self {
        Self {
            dir: layout.journal_dir(),
        }
    }

    fn marker_path(&self, intent: &WriteIntent) -> PathBuf {
        self.dir.join(format!("{}.json", intent.id))
    }

    pub fn begin(&self, intent: &WriteIntent) -> StoreResult<()> {
        write_json(&self.marker_path(intent), intent)
    }

    pub fn complete(&self, intent: &WriteIntent) -> StoreResult<()> {
        remove_durable(&self.marker_path(intent))?;
        Ok(())
    }

    /// Markers left by interrupted writes, oldest first.
    pub fn pending(&self) -> StoreResult<Vec<WriteIntent>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io_at("listing", &self.dir, e)),
        };

        let mut intents = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StoreError::io_at("listing", &self.dir, e))?.path();
            if is_temp_file(&path) {
                let _ = fs::remove_file(&path);
                continue;
            }
            if path.extension().map_or(false, |e| e == "json") {
                intents.push(read_json::<WriteIntent>(&path)?);
            }
        }
        intents.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.id.cmp(&b.id)));
        Ok(intents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_begin_complete() {
        let temp = TempDir::new().unwrap();
        let journal = Journal::new(&Layout::new(temp.path()));
        let intent = WriteIntent::new(
            SubjectType::Entity,
            "entity:person/abc",
            1,
            "entities/person/abc.json",
        );

        journal.begin(&intent).unwrap();
        assert_eq!(journal.pending().unwrap(), vec![intent.clone()]);

        journal.complete(&intent).unwrap();
        assert!(journal.pending().unwrap().is_empty());
    }

    #[test]
    fn test_pending_on_missing_dir() {
        let temp = TempDir::new().unwrap();
        let journal = Journal::new(&Layout::new(temp.path().join("nowhere")));
        assert!(journal.pending().unwrap().is_empty());
    }
}
