//! Version Ledger
//!
//! Sequencing and retention of immutable version snapshots. Version numbers
//! are derived from what is on disk: the next number for a subject is the
//! highest persisted version plus one. Snapshot files are created with
//! `create_new`, so two writers racing for the same number cannot both win.

use std::fs;
use std::io;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::journal::{Journal, WriteIntent};
use crate::diff::FieldChange;
use crate::model::{SubjectRef, Version, VersionSummary};
use crate::store::checksum::checksum_string;
use crate::store::{read_json_opt, to_document_bytes, write_json, Layout, RecordStore, StoreError, StoreResult};

/// Outcome of roll-forward recovery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Subjects whose record was rewritten from a persisted snapshot
    pub rolled_forward: Vec<String>,
    /// Intents whose snapshot never landed; nothing was changed
    pub discarded: Vec<String>,
    /// Intents whose record had already been replaced
    pub already_complete: Vec<String>,
}

impl RecoveryReport {
    pub fn is_empty(&self) -> bool {
        self.rolled_forward.is_empty() && self.discarded.is_empty() && self.already_complete.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct VersionLedger {
    store: RecordStore,
    journal: Journal,
}

impl VersionLedger {
    pub fn new(store: RecordStore) -> Self {
        let journal = Journal::new(store.layout());
        Self { store, journal }
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    fn layout(&self) -> &Layout {
        self.store.layout()
    }

    fn version_dir(&self, subject: &SubjectRef) -> StoreResult<PathBuf> {
        self.layout()
            .version_dir(subject)
            .ok_or_else(|| StoreError::not_found("Version history", subject.id()))
    }

    fn version_path(&self, subject: &SubjectRef, version_number: u64) -> StoreResult<PathBuf> {
        Ok(self
            .version_dir(subject)?
            .join(Layout::version_file_name(version_number)))
    }

    /// Persisted version numbers of a subject, ascending.
    fn version_numbers(&self, subject: &SubjectRef) -> StoreResult<Vec<u64>> {
        let dir = match self.layout().version_dir(subject) {
            Some(dir) => dir,
            None => return Ok(Vec::new()),
        };
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io_at("listing", &dir, e)),
        };

        let mut numbers = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io_at("listing", &dir, e))?;
            if let Some(n) = entry
                .file_name()
                .to_str()
                .and_then(Layout::parse_version_file_name)
            {
                numbers.push(n);
            }
        }
        numbers.sort_unstable();
        Ok(numbers)
    }

    /// Highest persisted version number, 0 if the subject has no history.
    pub fn latest_version_number(&self, subject: &SubjectRef) -> StoreResult<u64> {
        Ok(self.version_numbers(subject)?.last().copied().unwrap_or(0))
    }

    pub fn next_version(&self, subject: &SubjectRef) -> StoreResult<u64> {
        Ok(self.latest_version_number(subject)? + 1)
    }

    /// Writes the immutable snapshot for `summary.version_number`.
    ///
    /// Fails with `OutOfSequence` if that number is not the next one, which
    /// covers both gaps and lost races.
    pub fn append_snapshot(
        &self,
        subject: &SubjectRef,
        snapshot: &Value,
        summary: &VersionSummary,
        changes: Vec<FieldChange>,
    ) -> StoreResult<Version> {
        let expected = summary.version_number;
        let next = self.next_version(subject)?;
        if expected != next {
            return Err(StoreError::OutOfSequence {
                subject: subject.id(),
                expected,
                actual: next,
            });
        }

        let canonical =
            serde_json::to_vec(snapshot).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let version = Version {
            subject_type: subject.subject_type(),
            subject_id: subject.id(),
            version_number: expected,
            snapshot: snapshot.clone(),
            author_id: summary.author_id.clone(),
            change_description: summary.change_description.clone(),
            created_at: summary.created_at,
            changes,
            checksum: checksum_string(&canonical),
        };

        let path = self.version_path(subject, expected)?;
        match self.store.create_new(&path, &to_document_bytes(&version)?) {
            Ok(()) => {}
            Err(StoreError::AlreadyExists { .. }) => {
                return Err(StoreError::OutOfSequence {
                    subject: subject.id(),
                    expected,
                    actual: self.next_version(subject)?,
                })
            }
            Err(e) => return Err(e),
        }

        debug!(subject = %subject, version = expected, "snapshot appended");
        Ok(version)
    }

    /// Every version of a subject, ascending. Each snapshot's checksum is
    /// verified; a mismatch is a corruption error.
    pub fn list_versions(&self, subject: &SubjectRef) -> StoreResult<Vec<Version>> {
        self.version_numbers(subject)?
            .into_iter()
            .map(|n| self.get_version(subject, n))
            .collect()
    }

    pub fn get_version(&self, subject: &SubjectRef, version_number: u64) -> StoreResult<Version> {
        let path = self.version_path(subject, version_number)?;
        let version: Version = read_json_opt(&path)?.ok_or_else(|| {
            StoreError::not_found("Version", format!("{}@{}", subject, version_number))
        })?;
        verify(&path, &version)?;
        Ok(version)
    }

    pub fn version_exists(&self, subject: &SubjectRef, version_number: u64) -> StoreResult<bool> {
        Ok(self.version_path(subject, version_number)?.is_file())
    }

    /// Completes or discards every write interrupted mid-sequence.
    ///
    /// For each pending intent:
    /// 1. Snapshot present, record absent or older: rewrite record from snapshot
    /// 2. Snapshot present, record current: nothing to do
    /// 3. Snapshot absent: the write never became visible; drop it
    ///
    /// The marker is removed in every case.
    pub fn roll_forward(&self) -> StoreResult<RecoveryReport> {
        let mut report = RecoveryReport::default();

        for intent in self.journal.pending()? {
            let subject = SubjectRef::parse(intent.subject_type, &intent.subject_id)
                .map_err(|e| {
                    StoreError::corruption(&self.layout().journal_dir(), format!("bad intent subject: {}", e))
                })?;
            let record_path = self.record_path(&subject)?;
            let label = format!("{}@{}", subject, intent.version_number);

            if !self.version_exists(&subject, intent.version_number)? {
                warn!(subject = %subject, version = intent.version_number, "discarding write without snapshot");
                report.discarded.push(label);
            } else {
                let current: Option<Value> = read_json_opt(&record_path)?;
                let current_version = current
                    .as_ref()
                    .and_then(|v| v.pointer("/version_summary/version_number"))
                    .and_then(Value::as_u64)
                    .unwrap_or(0);

                if current_version < intent.version_number {
                    let version = self.get_version(&subject, intent.version_number)?;
                    write_json(&record_path, &version.snapshot)?;
                    info!(subject = %subject, version = intent.version_number, "rolled forward interrupted write");
                    report.rolled_forward.push(label);
                } else {
                    report.already_complete.push(label);
                }
            }

            self.journal.complete(&intent)?;
        }

        Ok(report)
    }

    /// Record path of a subject, relative form used in intents.
    pub fn relative_record_path(&self, subject: &SubjectRef) -> StoreResult<String> {
        let path = self.record_path(subject)?;
        Ok(self.layout().relative(&path).unwrap_or_default())
    }

    fn record_path(&self, subject: &SubjectRef) -> StoreResult<PathBuf> {
        match subject {
            SubjectRef::Entity(key) => Ok(self.layout().entity_path(key)),
            SubjectRef::Relationship(id) => self
                .layout()
                .relationship_path(id)
                .ok_or_else(|| StoreError::not_found("Relationship", id.clone())),
        }
    }

    pub fn begin(&self, intent: &WriteIntent) -> StoreResult<()> {
        self.journal.begin(intent)
    }

    pub fn complete(&self, intent: &WriteIntent) -> StoreResult<()> {
        self.journal.complete(intent)
    }

    pub fn pending_intents(&self) -> StoreResult<Vec<WriteIntent>> {
        self.journal.pending()
    }
}

fn verify(path: &std::path::Path, version: &Version) -> StoreResult<()> {
    let canonical = serde_json::to_vec(&version.snapshot)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let actual = checksum_string(&canonical);
    if actual != version.checksum {
        return Err(StoreError::corruption(
            path,
            format!("checksum mismatch: recorded {}, computed {}", version.checksum, actual),
        ));
    }
    Ok(())
}
