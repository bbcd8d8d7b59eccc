//! Migration Log
//!
//! `migration-logs/<full-name>/` records one successful run:
//! - `changes.diff`: readable structural diff per changed file
//! - `changes.json`: the same diff, machine-readable
//! - `logs.txt`: the procedure's log lines
//! - `metadata.json`: written last; its presence alone marks the migration
//!   applied
//!
//! Failed runs are recorded under `.migration-failures/<full-name>/<ts>/`
//! instead, which change tracking ignores.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::errors::MigrationResult;
use super::tracker::{Change, ChangeStatus, ChangeTracker};
use crate::diff::{diff_documents, render, FieldChange};
use crate::store::atomic::write_atomic;
use crate::store::{
    read_json_opt, write_json, Layout, StoreError, StoreResult, AUTHORS_DIR, ENTITIES_DIR,
    MIGRATION_LOGS_DIR, RELATIONSHIPS_DIR, VERSIONS_DIR,
};

pub const METADATA_FILE: &str = "metadata.json";
pub const CHANGES_DIFF_FILE: &str = "changes.diff";
pub const CHANGES_JSON_FILE: &str = "changes.json";
pub const LOGS_FILE: &str = "logs.txt";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStats {
    pub entities_created: usize,
    pub entities_updated: usize,
    pub entities_deleted: usize,
    pub relationships_created: usize,
    pub relationships_updated: usize,
    pub relationships_deleted: usize,
    pub authors_created: usize,
    pub authors_updated: usize,
    pub versions_created: usize,
    pub files_changed: usize,
}

impl MigrationStats {
    /// Counts changes by top-level directory. Migration log files are not
    /// counted.
    pub fn from_changes(changes: &[Change]) -> Self {
        let mut stats = MigrationStats::default();
        for change in changes {
            let top = change.path.split('/').next().unwrap_or("");
            if top == MIGRATION_LOGS_DIR {
                continue;
            }
            stats.files_changed += 1;
            let status = change.status;
            match top {
                ENTITIES_DIR => bump(
                    status,
                    &mut stats.entities_created,
                    &mut stats.entities_updated,
                    &mut stats.entities_deleted,
                ),
                RELATIONSHIPS_DIR => bump(
                    status,
                    &mut stats.relationships_created,
                    &mut stats.relationships_updated,
                    &mut stats.relationships_deleted,
                ),
                AUTHORS_DIR => match status {
                    ChangeStatus::Added => stats.authors_created += 1,
                    ChangeStatus::Modified => stats.authors_updated += 1,
                    ChangeStatus::Deleted => {}
                },
                VERSIONS_DIR if status == ChangeStatus::Added => stats.versions_created += 1,
                _ => {}
            }
        }
        stats
    }
}

fn bump(status: ChangeStatus, created: &mut usize, updated: &mut usize, deleted: &mut usize) {
    match status {
        ChangeStatus::Added => *created += 1,
        ChangeStatus::Modified => *updated += 1,
        ChangeStatus::Deleted => *deleted += 1,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationMetadata {
    pub migration_name: String,
    pub author: String,
    pub date: String,
    pub description: String,
    pub executed_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub status: RunStatus,
    #[serde(default)]
    pub forced: bool,
    pub statistics: MigrationStats,
    pub content_digest: String,
}

/// Structural diff of one changed file against its baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDiff {
    pub path: String,
    pub status: ChangeStatus,
    pub changes: Vec<FieldChange>,
}

/// Diffs every change against the tracker's baseline. Non-JSON content is
/// compared as a single string value.
pub fn compute_diffs(
    tracker: &dyn ChangeTracker,
    layout: &Layout,
    changes: &[Change],
) -> MigrationResult<Vec<FileDiff>> {
    let mut diffs = Vec::with_capacity(changes.len());
    for change in changes {
        let before = tracker.baseline_content(&change.path)?.map(|b| as_document(&b));
        let after = match fs::read(layout.root().join(&change.path)) {
            Ok(bytes) => Some(as_document(&bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(StoreError::io_at("reading", &layout.root().join(&change.path), e).into())
            }
        };
        diffs.push(FileDiff {
            path: change.path.clone(),
            status: change.status,
            changes: diff_documents(before.as_ref(), after.as_ref()),
        });
    }
    Ok(diffs)
}

fn as_document(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

/// Unified-style rendering of file diffs.
pub fn render_diffs(diffs: &[FileDiff]) -> String {
    let mut out = String::new();
    for diff in diffs {
        let (from, to) = match diff.status {
            ChangeStatus::Added => ("/dev/null".to_string(), format!("b/{}", diff.path)),
            ChangeStatus::Deleted => (format!("a/{}", diff.path), "/dev/null".to_string()),
            ChangeStatus::Modified => (format!("a/{}", diff.path), format!("b/{}", diff.path)),
        };
        out.push_str(&format!("--- {}\n+++ {}\n", from, to));
        out.push_str(&render(&diff.changes));
        out.push('\n');
    }
    out
}

/// Reads and writes Migration Log entries.
#[derive(Debug, Clone)]
pub struct MigrationLogStore {
    layout: Layout,
}

impl MigrationLogStore {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    pub fn log_dir(&self, migration: &str) -> PathBuf {
        self.layout.migration_log_dir(migration)
    }

    pub fn is_applied(&self, migration: &str) -> bool {
        self.log_dir(migration).join(METADATA_FILE).is_file()
    }

    /// Names of every applied migration.
    pub fn applied_names(&self) -> StoreResult<BTreeSet<String>> {
        let dir = self.layout.migration_logs_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => return Err(StoreError::io_at("listing", &dir, e)),
        };

        let mut names = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io_at("listing", &dir, e))?;
            if entry.path().join(METADATA_FILE).is_file() {
                names.insert(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    pub fn read_metadata(&self, migration: &str) -> StoreResult<Option<MigrationMetadata>> {
        read_json_opt(&self.log_dir(migration).join(METADATA_FILE))
    }

    /// Writes a complete log entry, replacing any previous one. Returns the
    /// written paths relative to the storage root.
    pub fn write(
        &self,
        metadata: &MigrationMetadata,
        diffs: &[FileDiff],
        logs: &[String],
    ) -> StoreResult<Vec<String>> {
        let dir = self.log_dir(&metadata.migration_name);
        fs::create_dir_all(&dir).map_err(|e| StoreError::io_at("creating", &dir, e))?;

        // A previous marker must not survive a partially rewritten entry
        let marker = dir.join(METADATA_FILE);
        if marker.exists() {
            fs::remove_file(&marker).map_err(|e| StoreError::io_at("removing", &marker, e))?;
        }

        write_atomic(&dir.join(CHANGES_DIFF_FILE), render_diffs(diffs).as_bytes())?;
        write_json(&dir.join(CHANGES_JSON_FILE), &diffs)?;
        write_atomic(&dir.join(LOGS_FILE), join_lines(logs).as_bytes())?;
        write_json(&marker, metadata)?;

        info!(
            migration = %metadata.migration_name,
            files = metadata.statistics.files_changed,
            "migration log written"
        );

        Ok([CHANGES_DIFF_FILE, CHANGES_JSON_FILE, LOGS_FILE, METADATA_FILE]
            .iter()
            .map(|file| format!("{}/{}/{}", MIGRATION_LOGS_DIR, metadata.migration_name, file))
            .collect())
    }

    /// Records a failed run under the untracked failures directory.
    pub fn write_failure(
        &self,
        metadata: &MigrationMetadata,
        error: &str,
        logs: &[String],
    ) -> StoreResult<PathBuf> {
        let stamp = metadata.executed_at.format("%Y%m%dT%H%M%S%.3fZ").to_string();
        let dir = self
            .layout
            .failures_dir()
            .join(&metadata.migration_name)
            .join(stamp);
        fs::create_dir_all(&dir).map_err(|e| StoreError::io_at("creating", &dir, e))?;

        write_atomic(&dir.join("error.txt"), format!("{}\n", error).as_bytes())?;
        write_atomic(&dir.join(LOGS_FILE), join_lines(logs).as_bytes())?;
        write_json(&dir.join(METADATA_FILE), metadata)?;
        debug!(migration = %metadata.migration_name, dir = %dir.display(), "failure recorded");
        Ok(dir)
    }
}

fn join_lines(lines: &[String]) -> String {
    let mut out = lines.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn metadata(name: &str) -> MigrationMetadata {
        MigrationMetadata {
            migration_name: name.to_string(),
            author: "data@example.org".into(),
            date: "2024-01-01".into(),
            description: "Seed".into(),
            executed_at: Utc::now(),
            duration_seconds: 0.5,
            status: RunStatus::Completed,
            forced: false,
            statistics: MigrationStats::default(),
            content_digest: "abc".into(),
        }
    }

    #[test]
    fn test_stats_from_changes() {
        let changes = vec![
            Change::new("entities/person/a.json", ChangeStatus::Added),
            Change::new("entities/person/b.json", ChangeStatus::Modified),
            Change::new("relationships/x.json", ChangeStatus::Deleted),
            Change::new("authors/migration-001-seed.json", ChangeStatus::Added),
            Change::new("versions/entity/person/a/0000000001.json", ChangeStatus::Added),
            Change::new("versions/entity/person/b/0000000002.json", ChangeStatus::Added),
            Change::new("migration-logs/001-seed/metadata.json", ChangeStatus::Added),
        ];
        let stats = MigrationStats::from_changes(&changes);
        assert_eq!(stats.entities_created, 1);
        assert_eq!(stats.entities_updated, 1);
        assert_eq!(stats.relationships_deleted, 1);
        assert_eq!(stats.authors_created, 1);
        assert_eq!(stats.versions_created, 2);
        assert_eq!(stats.files_changed, 6);
    }

    #[test]
    fn test_write_marks_applied() {
        let temp = TempDir::new().unwrap();
        let logs = MigrationLogStore::new(Layout::new(temp.path()));
        assert!(!logs.is_applied("001-seed"));

        let paths = logs
            .write(&metadata("001-seed"), &[], &["one".to_string(), "two".to_string()])
            .unwrap();
        assert!(logs.is_applied("001-seed"));
        assert_eq!(paths.len(), 4);
        assert_eq!(paths[3], "migration-logs/001-seed/metadata.json");
        assert_eq!(
            fs::read_to_string(logs.log_dir("001-seed").join(LOGS_FILE)).unwrap(),
            "one\ntwo\n"
        );
        assert_eq!(
            logs.applied_names().unwrap().into_iter().collect::<Vec<_>>(),
            vec!["001-seed".to_string()]
        );
        assert_eq!(logs.read_metadata("001-seed").unwrap().unwrap().content_digest, "abc");
    }

    #[test]
    fn test_failure_not_applied() {
        let temp = TempDir::new().unwrap();
        let logs = MigrationLogStore::new(Layout::new(temp.path()));
        let mut meta = metadata("002-broken");
        meta.status = RunStatus::Failed;
        let dir = logs.write_failure(&meta, "boom", &[]).unwrap();
        assert!(dir.join("error.txt").is_file());
        assert!(!logs.is_applied("002-broken"));
    }

    #[test]
    fn test_render_diffs_headers() {
        let diffs = vec![FileDiff {
            path: "authors/x.json".into(),
            status: ChangeStatus::Added,
            changes: diff_documents(None, Some(&serde_json::json!({"id": "x"}))),
        }];
        let text = render_diffs(&diffs);
        assert!(text.starts_with("--- /dev/null\n+++ b/authors/x.json\n+ .: {\"id\":\"x\"}\n"));
    }
}
