//! Content-addressed baseline tracker
//!
//! Layout under `.baseline/`:
//! ```text
//! objects/<sha256>             file contents, one blob per distinct content
//! commits/<NNNNNNNNNN>.json    full path -> digest manifest per commit
//! HEAD                         number of the current commit
//! ```
//!
//! Commits are immutable. Reverting a migration moves HEAD back to the
//! parent of its first commit and restores the working tree to match.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::errors::{TrackerError, TrackerResult};
use super::{Change, ChangeStatus, ChangeTracker};
use crate::store::atomic::{create_new_atomic, is_temp_file, write_atomic};
use crate::store::checksum::sha256_hex;
use crate::store::{read_json_opt, to_document_bytes, Layout, StoreError};

const HEAD_FILE: &str = "HEAD";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestCommit {
    pub number: u64,
    #[serde(default)]
    pub parent: Option<u64>,
    pub message: String,
    #[serde(default)]
    pub migration: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Relative path -> sha256 of content
    pub files: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ManifestTracker {
    layout: Layout,
}

impl ManifestTracker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            layout: Layout::new(root),
        }
    }

    fn objects_dir(&self) -> PathBuf {
        self.layout.baseline_dir().join("objects")
    }

    fn commits_dir(&self) -> PathBuf {
        self.layout.baseline_dir().join("commits")
    }

    fn commit_path(&self, number: u64) -> PathBuf {
        self.commits_dir().join(Layout::version_file_name(number))
    }

    fn head_number(&self) -> TrackerResult<Option<u64>> {
        let path = self.layout.baseline_dir().join(HEAD_FILE);
        match fs::read_to_string(&path) {
            Ok(content) => content
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| TrackerError::Corruption {
                    path: path.display().to_string(),
                    reason: format!("bad HEAD '{}'", content.trim()),
                }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TrackerError::io_at("reading", &path, e)),
        }
    }

    fn set_head(&self, number: u64) -> TrackerResult<()> {
        let path = self.layout.baseline_dir().join(HEAD_FILE);
        write_atomic(&path, format!("{}\n", number).as_bytes())?;
        Ok(())
    }

    fn load_commit(&self, number: u64) -> TrackerResult<ManifestCommit> {
        let path = self.commit_path(number);
        read_json_opt(&path)?.ok_or_else(|| TrackerError::Corruption {
            path: path.display().to_string(),
            reason: "commit missing".into(),
        })
    }

    pub fn head(&self) -> TrackerResult<Option<ManifestCommit>> {
        match self.head_number()? {
            Some(n) => self.load_commit(n).map(Some),
            None => Ok(None),
        }
    }

    fn head_files(&self) -> TrackerResult<BTreeMap<String, String>> {
        Ok(self.head()?.map(|c| c.files).unwrap_or_default())
    }

    /// Highest commit number on disk, including commits no longer reachable
    /// from HEAD.
    fn last_commit_number(&self) -> TrackerResult<u64> {
        let dir = self.commits_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(TrackerError::io_at("listing", &dir, e)),
        };
        let mut last = 0;
        for entry in entries {
            let entry = entry.map_err(|e| TrackerError::io_at("listing", &dir, e))?;
            if let Some(n) = entry.file_name().to_str().and_then(Layout::parse_version_file_name) {
                last = last.max(n);
            }
        }
        Ok(last)
    }

    /// Digest of every tracked file currently in the working tree.
    fn scan(&self) -> TrackerResult<BTreeMap<String, String>> {
        let mut files = BTreeMap::new();
        self.scan_dir(self.layout.root(), &mut files)?;
        Ok(files)
    }

    fn scan_dir(&self, dir: &Path, out: &mut BTreeMap<String, String>) -> TrackerResult<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(TrackerError::io_at("listing", dir, e)),
        };
        for entry in entries {
            let entry = entry.map_err(|e| TrackerError::io_at("listing", dir, e))?;
            let path = entry.path();
            let rel = match self.layout.relative(&path) {
                Some(rel) => rel,
                None => continue,
            };
            if Layout::is_untracked(&rel) || is_temp_file(&path) {
                continue;
            }
            let file_type = entry
                .file_type()
                .map_err(|e| TrackerError::io_at("inspecting", &path, e))?;
            if file_type.is_dir() {
                self.scan_dir(&path, out)?;
            } else if file_type.is_file() {
                let bytes = fs::read(&path).map_err(|e| TrackerError::io_at("reading", &path, e))?;
                out.insert(rel, sha256_hex(&bytes));
            }
        }
        Ok(())
    }

    fn store_object(&self, bytes: &[u8]) -> TrackerResult<String> {
        let digest = sha256_hex(bytes);
        match create_new_atomic(&self.objects_dir().join(&digest), bytes) {
            Ok(()) | Err(StoreError::AlreadyExists { .. }) => Ok(digest),
            Err(e) => Err(e.into()),
        }
    }

    fn read_object(&self, digest: &str) -> TrackerResult<Vec<u8>> {
        let path = self.objects_dir().join(digest);
        let bytes = fs::read(&path).map_err(|e| TrackerError::io_at("reading", &path, e))?;
        if sha256_hex(&bytes) != digest {
            return Err(TrackerError::Corruption {
                path: path.display().to_string(),
                reason: "object content does not match its digest".into(),
            });
        }
        Ok(bytes)
    }

    fn write_commit(
        &self,
        files: BTreeMap<String, String>,
        message: &str,
        migration: Option<&str>,
    ) -> TrackerResult<u64> {
        let parent = self.head_number()?;
        let number = self.last_commit_number()? + 1;
        let commit = ManifestCommit {
            number,
            parent,
            message: message.to_string(),
            migration: migration.map(str::to_string),
            created_at: Utc::now(),
            files,
        };
        create_new_atomic(&self.commit_path(number), &to_document_bytes(&commit)?)?;
        self.set_head(number)?;
        debug!(commit = number, summary = message, "baseline commit written");
        Ok(number)
    }

    fn restore(&self, rel: &str, digest: &str) -> TrackerResult<()> {
        let bytes = self.read_object(digest)?;
        write_atomic(&self.layout.root().join(rel), &bytes)?;
        Ok(())
    }

    fn remove(&self, rel: &str) -> TrackerResult<()> {
        let path = self.layout.root().join(rel);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(TrackerError::io_at("removing", &path, e)),
        }
        self.prune_empty_dirs(&path);
        Ok(())
    }

    /// Removes now-empty parent directories up to the root.
    fn prune_empty_dirs(&self, removed: &Path) {
        let mut dir = removed.parent();
        while let Some(current) = dir {
            if current == self.layout.root() || fs::remove_dir(current).is_err() {
                break;
            }
            dir = current.parent();
        }
    }
}

impl ChangeTracker for ManifestTracker {
    fn name(&self) -> &'static str {
        "manifest"
    }

    fn init(&self) -> TrackerResult<()> {
        if self.head_number()?.is_some() {
            return Ok(());
        }
        let paths: Vec<String> = self.scan()?.into_keys().collect();
        let mut files = BTreeMap::new();
        for rel in paths {
            let path = self.layout.root().join(&rel);
            let bytes = fs::read(&path).map_err(|e| TrackerError::io_at("reading", &path, e))?;
            files.insert(rel, self.store_object(&bytes)?);
        }
        let number = self.write_commit(files, "Initialize storage", None)?;
        info!(commit = number, "baseline initialized");
        Ok(())
    }

    fn changes(&self) -> TrackerResult<Vec<Change>> {
        let baseline = self.head_files()?;
        let working = self.scan()?;

        let mut changes = Vec::new();
        for (path, digest) in &working {
            match baseline.get(path) {
                None => changes.push(Change::new(path.clone(), ChangeStatus::Added)),
                Some(committed) if committed != digest => {
                    changes.push(Change::new(path.clone(), ChangeStatus::Modified))
                }
                Some(_) => {}
            }
        }
        for path in baseline.keys() {
            if !working.contains_key(path) {
                changes.push(Change::new(path.clone(), ChangeStatus::Deleted));
            }
        }
        changes.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(changes)
    }

    fn baseline_content(&self, path: &str) -> TrackerResult<Option<Vec<u8>>> {
        match self.head_files()?.get(path) {
            Some(digest) => self.read_object(digest).map(Some),
            None => Ok(None),
        }
    }

    fn commit(&self, paths: &[String], message: &str, migration: Option<&str>) -> TrackerResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut files = self.head_files()?;
        for rel in paths {
            let path = self.layout.root().join(rel);
            match fs::read(&path) {
                Ok(bytes) => {
                    files.insert(rel.clone(), self.store_object(&bytes)?);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    files.remove(rel);
                }
                Err(e) => return Err(TrackerError::io_at("reading", &path, e)),
            }
        }
        self.write_commit(files, message, migration)?;
        Ok(())
    }

    fn discard(&self, changes: &[Change]) -> TrackerResult<()> {
        let baseline = self.head_files()?;
        for change in changes {
            match baseline.get(&change.path) {
                Some(digest) => self.restore(&change.path, digest)?,
                None => self.remove(&change.path)?,
            }
        }
        Ok(())
    }

    fn revert_migration(&self, migration: &str) -> TrackerResult<usize> {
        let head = match self.head()? {
            Some(head) => head,
            None => return Err(TrackerError::NothingToRevert(migration.to_string())),
        };

        // Walk back over the run of commits belonging to this migration
        let mut reverted = 0;
        let mut cursor = Some(head.clone());
        let mut target: Option<u64> = None;
        while let Some(commit) = cursor {
            if commit.migration.as_deref() != Some(migration) {
                break;
            }
            reverted += 1;
            target = commit.parent;
            cursor = match commit.parent {
                Some(parent) => Some(self.load_commit(parent)?),
                None => None,
            };
        }

        if reverted == 0 {
            let mut number = head.parent;
            while let Some(n) = number {
                let commit = self.load_commit(n)?;
                if commit.migration.as_deref() == Some(migration) {
                    return Err(TrackerError::NotRevertible {
                        migration: migration.to_string(),
                        reason: "later commits exist; only the most recent migration can be reverted"
                            .into(),
                    });
                }
                number = commit.parent;
            }
            return Err(TrackerError::NothingToRevert(migration.to_string()));
        }

        let target_files = match target {
            Some(n) => self.load_commit(n)?.files,
            None => BTreeMap::new(),
        };

        for (path, digest) in &head.files {
            match target_files.get(path) {
                None => self.remove(path)?,
                Some(previous) if previous != digest => self.restore(path, previous)?,
                Some(_) => {}
            }
        }
        for (path, digest) in &target_files {
            if !head.files.contains_key(path) {
                self.restore(path, digest)?;
            }
        }

        match target {
            Some(n) => self.set_head(n)?,
            None => {
                let path = self.layout.baseline_dir().join(HEAD_FILE);
                crate::store::atomic::remove_durable(&path)?;
            }
        }

        info!(migration, commits = reverted, "migration reverted");
        Ok(reverted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_init_and_changes() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "entities/person/a.json", "a");
        let tracker = ManifestTracker::new(temp.path());
        tracker.init().unwrap();
        assert!(tracker.changes().unwrap().is_empty());

        write(temp.path(), "entities/person/a.json", "a2");
        write(temp.path(), "entities/person/b.json", "b");
        write(temp.path(), ".journal/x.json", "ignored");

        let changes = tracker.changes().unwrap();
        assert_eq!(
            changes,
            vec![
                Change::new("entities/person/a.json", ChangeStatus::Modified),
                Change::new("entities/person/b.json", ChangeStatus::Added),
            ]
        );
        assert_eq!(
            tracker.baseline_content("entities/person/a.json").unwrap(),
            Some(b"a".to_vec())
        );
    }

    #[test]
    fn test_commit_and_discard() {
        let temp = TempDir::new().unwrap();
        let tracker = ManifestTracker::new(temp.path());
        tracker.init().unwrap();

        write(temp.path(), "authors/x.json", "x");
        tracker
            .commit(&["authors/x.json".to_string()], "add x", None)
            .unwrap();
        assert!(tracker.changes().unwrap().is_empty());

        write(temp.path(), "authors/x.json", "changed");
        write(temp.path(), "authors/y.json", "new");
        let changes = tracker.changes().unwrap();
        tracker.discard(&changes).unwrap();

        assert!(tracker.changes().unwrap().is_empty());
        assert_eq!(fs::read_to_string(temp.path().join("authors/x.json")).unwrap(), "x");
        assert!(!temp.path().join("authors/y.json").exists());
    }

    #[test]
    fn test_revert_most_recent_migration() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "authors/base.json", "base");
        let tracker = ManifestTracker::new(temp.path());
        tracker.init().unwrap();

        write(temp.path(), "authors/base.json", "edited");
        write(temp.path(), "authors/one.json", "one");
        let paths: Vec<String> = tracker.changes().unwrap().into_iter().map(|c| c.path).collect();
        tracker.commit(&paths[..1], "Migration: 001-x (batch 1/2)", Some("001-x")).unwrap();
        tracker.commit(&paths[1..], "Migration: 001-x (batch 2/2)", Some("001-x")).unwrap();

        assert_eq!(tracker.revert_migration("001-x").unwrap(), 2);
        assert!(tracker.changes().unwrap().is_empty());
        assert_eq!(fs::read_to_string(temp.path().join("authors/base.json")).unwrap(), "base");
        assert!(!temp.path().join("authors/one.json").exists());
    }

    #[test]
    fn test_revert_refuses_buried_migration() {
        let temp = TempDir::new().unwrap();
        let tracker = ManifestTracker::new(temp.path());
        tracker.init().unwrap();

        write(temp.path(), "authors/one.json", "one");
        tracker.commit(&["authors/one.json".into()], "Migration: 001-x", Some("001-x")).unwrap();
        write(temp.path(), "authors/two.json", "two");
        tracker.commit(&["authors/two.json".into()], "Migration: 002-y", Some("002-y")).unwrap();

        let err = tracker.revert_migration("001-x").unwrap_err();
        assert!(matches!(err, TrackerError::NotRevertible { .. }));
        let err = tracker.revert_migration("003-z").unwrap_err();
        assert!(matches!(err, TrackerError::NothingToRevert(_)));
    }
}
