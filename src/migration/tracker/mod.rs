//! Change tracking
//!
//! The engine needs four things from whatever records the history of the
//! storage root: the list of uncommitted changes, the committed content of
//! a path, a way to commit a set of paths, and a way to undo a migration's
//! commits. Two backends implement it: a plain git repository, and a
//! content-addressed manifest kept under `.baseline/`.

mod errors;
mod git;
mod manifest;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use errors::{TrackerError, TrackerResult};
pub use git::GitTracker;
pub use manifest::ManifestTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Added,
    Modified,
    Deleted,
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeStatus::Added => "added",
            ChangeStatus::Modified => "modified",
            ChangeStatus::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

/// An uncommitted change to one file, path relative to the storage root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub path: String,
    pub status: ChangeStatus,
}

impl Change {
    pub fn new(path: impl Into<String>, status: ChangeStatus) -> Self {
        Self {
            path: path.into(),
            status,
        }
    }
}

pub trait ChangeTracker: Send + Sync {
    fn name(&self) -> &'static str;

    /// Records the current content as the initial baseline.
    fn init(&self) -> TrackerResult<()>;

    /// Uncommitted changes, ordered by path. Untracked directories
    /// (`.baseline/`, `.git/`, `.journal/`, `.migration-failures/`) never
    /// appear.
    fn changes(&self) -> TrackerResult<Vec<Change>>;

    /// Committed content of `path`, `None` if it is not in the baseline.
    fn baseline_content(&self, path: &str) -> TrackerResult<Option<Vec<u8>>>;

    /// Commits the current content of `paths` (deleted paths are removed).
    fn commit(&self, paths: &[String], message: &str, migration: Option<&str>) -> TrackerResult<()>;

    /// Restores the committed content of every changed path.
    fn discard(&self, changes: &[Change]) -> TrackerResult<()>;

    /// Undoes every commit made for `migration`. Returns the number of
    /// commits reverted.
    fn revert_migration(&self, migration: &str) -> TrackerResult<usize>;
}

/// Backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerKind {
    Manifest,
    Git,
}

impl TrackerKind {
    pub fn open(&self, root: impl Into<PathBuf>) -> Box<dyn ChangeTracker> {
        match self {
            TrackerKind::Manifest => Box::new(ManifestTracker::new(root)),
            TrackerKind::Git => Box::new(GitTracker::new(root)),
        }
    }
}

impl std::str::FromStr for TrackerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manifest" => Ok(TrackerKind::Manifest),
            "git" => Ok(TrackerKind::Git),
            other => Err(format!("unknown tracker '{}'", other)),
        }
    }
}
