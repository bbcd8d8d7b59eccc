//! Git-backed change tracker
//!
//! Shells out to the `git` binary. The storage root may live anywhere inside
//! the repository; every path handed in or out is relative to the storage
//! root, translated with `git rev-parse --show-prefix`.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::{Command, Output};

use tracing::{debug, info};

use super::errors::{TrackerError, TrackerResult};
use super::{Change, ChangeStatus, ChangeTracker};
use crate::store::Layout;

/// Paths per `git add` / `git checkout` invocation.
const PATHS_PER_COMMAND: usize = 500;

/// Identity used when the repository has none configured.
const FALLBACK_NAME: &str = "civicdb";
const FALLBACK_EMAIL: &str = "civicdb@localhost";

#[derive(Debug, Clone)]
pub struct GitTracker {
    root: PathBuf,
}

impl GitTracker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-C").arg(&self.root).args(args);
        cmd
    }

    fn run_output(&self, args: &[&str]) -> TrackerResult<Output> {
        self.command(args).output().map_err(|e| TrackerError::Io {
            context: format!("running git {}", args.first().copied().unwrap_or("")),
            source: e,
        })
    }

    fn run(&self, args: &[&str]) -> TrackerResult<Vec<u8>> {
        let output = self.run_output(args)?;
        if !output.status.success() {
            return Err(TrackerError::Git {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }

    fn run_with_paths(&self, base: &[&str], paths: &[String]) -> TrackerResult<()> {
        for chunk in paths.chunks(PATHS_PER_COMMAND) {
            let mut args: Vec<&str> = base.to_vec();
            args.push("--");
            args.extend(chunk.iter().map(String::as_str));
            self.run(&args)?;
        }
        Ok(())
    }

    fn has_identity(&self) -> bool {
        self.run_output(&["config", "user.email"])
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn commit_with_identity(&self, args: &[&str]) -> TrackerResult<()> {
        let mut cmd = self.command(args);
        if !self.has_identity() {
            cmd.env("GIT_AUTHOR_NAME", FALLBACK_NAME)
                .env("GIT_AUTHOR_EMAIL", FALLBACK_EMAIL)
                .env("GIT_COMMITTER_NAME", FALLBACK_NAME)
                .env("GIT_COMMITTER_EMAIL", FALLBACK_EMAIL);
        }
        let output = cmd.output().map_err(|e| TrackerError::Io {
            context: "running git commit".into(),
            source: e,
        })?;
        if !output.status.success() {
            return Err(TrackerError::Git {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    /// Location of the storage root inside the repository, with trailing `/`.
    fn prefix(&self) -> TrackerResult<String> {
        let out = self.run(&["rev-parse", "--show-prefix"])?;
        Ok(String::from_utf8_lossy(&out).trim().to_string())
    }

    fn has_head(&self) -> bool {
        self.run_output(&["rev-parse", "--verify", "--quiet", "HEAD"])
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn is_repository(&self) -> bool {
        self.run_output(&["rev-parse", "--git-dir"])
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Hashes of commits made for `migration`, newest first. Reverts of
    /// those commits are excluded.
    fn migration_commits(&self, migration: &str) -> TrackerResult<Vec<String>> {
        let pattern = format!("^Migration: {}( \\(batch [0-9]+/[0-9]+\\))?$", migration);
        let out = self.run(&[
            "log",
            "--format=%H",
            "--extended-regexp",
            "--grep",
            &pattern,
        ])?;
        Ok(String::from_utf8_lossy(&out)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// Parses `git status --porcelain -z` output into `(status, repo path)`.
fn parse_porcelain(raw: &[u8]) -> Vec<(ChangeStatus, String)> {
    let text = String::from_utf8_lossy(raw);
    let mut fields = text.split('\0').filter(|f| !f.is_empty());
    let mut entries = Vec::new();

    while let Some(field) = fields.next() {
        if field.len() < 4 {
            continue;
        }
        let (code, path) = field.split_at(3);
        let code = code.as_bytes();
        let (x, y) = (code[0], code[1]);

        // Renames and copies carry the original path as the next field
        if x == b'R' || x == b'C' {
            fields.next();
        }

        let status = if x == b'?' || x == b'A' {
            ChangeStatus::Added
        } else if x == b'D' || y == b'D' {
            ChangeStatus::Deleted
        } else if x == b'R' || x == b'C' {
            ChangeStatus::Added
        } else {
            ChangeStatus::Modified
        };
        entries.push((status, path.to_string()));
    }
    entries
}

impl ChangeTracker for GitTracker {
    fn name(&self) -> &'static str {
        "git"
    }

    fn init(&self) -> TrackerResult<()> {
        fs::create_dir_all(&self.root).map_err(|e| TrackerError::io_at("creating", &self.root, e))?;
        if !self.is_repository() {
            self.run(&["init", "--quiet"])?;
            info!(root = %self.root.display(), "git repository initialized");
        }
        let paths: Vec<String> = self.changes()?.into_iter().map(|c| c.path).collect();
        if !paths.is_empty() || !self.has_head() {
            self.run_with_paths(&["add", "--all"], &paths)?;
            self.commit_with_identity(&["commit", "--quiet", "--allow-empty", "-m", "Initialize storage"])?;
        }
        Ok(())
    }

    fn changes(&self) -> TrackerResult<Vec<Change>> {
        let prefix = self.prefix()?;
        let raw = self.run(&["status", "--porcelain", "-z", "-uall", "--", "."])?;

        let mut changes: Vec<Change> = parse_porcelain(&raw)
            .into_iter()
            .filter_map(|(status, path)| {
                let rel = path.strip_prefix(prefix.as_str())?.to_string();
                if Layout::is_untracked(&rel) {
                    None
                } else {
                    Some(Change::new(rel, status))
                }
            })
            .collect();
        changes.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(changes)
    }

    fn baseline_content(&self, path: &str) -> TrackerResult<Option<Vec<u8>>> {
        if !self.has_head() {
            return Ok(None);
        }
        let spec = format!("HEAD:./{}", path);
        let output = self.run_output(&["show", &spec])?;
        if output.status.success() {
            Ok(Some(output.stdout))
        } else {
            Ok(None)
        }
    }

    fn commit(&self, paths: &[String], message: &str, migration: Option<&str>) -> TrackerResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        self.run_with_paths(&["add", "--all"], paths)?;
        self.commit_with_identity(&["commit", "--quiet", "-m", message])?;
        debug!(files = paths.len(), migration = migration.unwrap_or(""), "git commit written");
        Ok(())
    }

    fn discard(&self, changes: &[Change]) -> TrackerResult<()> {
        let mut restore = Vec::new();
        for change in changes {
            match change.status {
                ChangeStatus::Added => {
                    self.run(&["rm", "--quiet", "--cached", "--ignore-unmatch", "--", &change.path])?;
                    let path = self.root.join(&change.path);
                    match fs::remove_file(&path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                        Err(e) => return Err(TrackerError::io_at("removing", &path, e)),
                    }
                }
                ChangeStatus::Modified | ChangeStatus::Deleted => restore.push(change.path.clone()),
            }
        }
        self.run_with_paths(&["checkout", "HEAD"], &restore)
    }

    fn revert_migration(&self, migration: &str) -> TrackerResult<usize> {
        let commits = self.migration_commits(migration)?;
        if commits.is_empty() {
            return Err(TrackerError::NothingToRevert(migration.to_string()));
        }

        let mut args = vec!["revert", "--no-edit"];
        args.extend(commits.iter().map(String::as_str));
        if let Err(e) = self.commit_with_identity(&args) {
            let _ = self.run(&["revert", "--abort"]);
            return Err(TrackerError::NotRevertible {
                migration: migration.to_string(),
                reason: e.to_string(),
            });
        }

        info!(migration, commits = commits.len(), "migration reverted");
        Ok(commits.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[test]
    fn test_parse_porcelain() {
        let raw = b"?? entities/person/a.json\0 M authors/x.json\0 D authors/y.json\0R  new.json\0old.json\0";
        let parsed = parse_porcelain(raw);
        assert_eq!(
            parsed,
            vec![
                (ChangeStatus::Added, "entities/person/a.json".to_string()),
                (ChangeStatus::Modified, "authors/x.json".to_string()),
                (ChangeStatus::Deleted, "authors/y.json".to_string()),
                (ChangeStatus::Added, "new.json".to_string()),
            ]
        );
    }

    #[test]
    fn test_commit_discard_revert() {
        if !git_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let tracker = GitTracker::new(temp.path());
        fs::create_dir_all(temp.path().join("authors")).unwrap();
        fs::write(temp.path().join("authors/base.json"), "base").unwrap();
        tracker.init().unwrap();
        assert!(tracker.changes().unwrap().is_empty());

        fs::write(temp.path().join("authors/base.json"), "edited").unwrap();
        fs::write(temp.path().join("authors/new.json"), "new").unwrap();
        fs::create_dir_all(temp.path().join(".journal")).unwrap();
        fs::write(temp.path().join(".journal/x.json"), "ignored").unwrap();
        assert_eq!(tracker.changes().unwrap().len(), 2);
        assert_eq!(
            tracker.baseline_content("authors/base.json").unwrap(),
            Some(b"base".to_vec())
        );

        let paths: Vec<String> = tracker.changes().unwrap().into_iter().map(|c| c.path).collect();
        tracker.commit(&paths, "Migration: 001-x", Some("001-x")).unwrap();
        assert!(tracker.changes().unwrap().is_empty());

        assert_eq!(tracker.revert_migration("001-x").unwrap(), 1);
        assert_eq!(fs::read_to_string(temp.path().join("authors/base.json")).unwrap(), "base");
        assert!(!temp.path().join("authors/new.json").exists());
    }
}
