//! Atomic file writes
//!
//! Replacement writes follow the same sequence everywhere:
//! 1. Write to `<name>.tmp-<uuid>` next to the target
//! 2. fsync the temp file
//! 3. Rename over the target
//! 4. fsync the parent directory
//!
//! A crash at any point leaves either the old document or the new one, never
//! a torn file. Leftover temp files are ignored by listings.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::errors::{StoreError, StoreResult};

/// Marker embedded in temp file names.
pub const TEMP_MARKER: &str = ".tmp-";

pub fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map_or(false, |n| n.contains(TEMP_MARKER))
}

fn temp_path_for(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("record");
    target.with_file_name(format!("{}{}{}", name, TEMP_MARKER, Uuid::new_v4()))
}

fn write_synced_temp(target: &Path, bytes: &[u8]) -> StoreResult<PathBuf> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::io_at("creating", parent, e))?;
    }

    let temp = temp_path_for(target);
    let result = (|| -> io::Result<()> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(&temp)?;
        file.write_all(bytes)?;
        file.sync_all()
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&temp);
        return Err(StoreError::io_at("writing", &temp, e));
    }
    Ok(temp)
}

/// Atomically replaces `target` with `bytes`.
pub fn write_atomic(target: &Path, bytes: &[u8]) -> StoreResult<()> {
    let temp = write_synced_temp(target, bytes)?;

    if let Err(e) = fs::rename(&temp, target) {
        let _ = fs::remove_file(&temp);
        return Err(StoreError::io_at("renaming onto", target, e));
    }

    fsync_parent(target)
}

/// Atomically creates `target`, failing with `AlreadyExists` if it is
/// already present. Used for immutable files.
pub fn create_new_atomic(target: &Path, bytes: &[u8]) -> StoreResult<()> {
    let temp = write_synced_temp(target, bytes)?;

    // hard_link fails if the target exists; rename would overwrite
    let linked = fs::hard_link(&temp, target);
    let _ = fs::remove_file(&temp);
    match linked {
        Ok(()) => fsync_parent(target),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(StoreError::AlreadyExists {
            path: target.to_path_buf(),
        }),
        Err(e) => Err(StoreError::io_at("linking", target, e)),
    }
}

/// Removes a file and fsyncs its directory. Returns false if it was absent.
pub fn remove_durable(target: &Path) -> StoreResult<bool> {
    match fs::remove_file(target) {
        Ok(()) => {
            fsync_parent(target)?;
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StoreError::io_at("removing", target, e)),
    }
}

fn fsync_parent(target: &Path) -> StoreResult<()> {
    match target.parent() {
        Some(parent) => fsync_dir(parent),
        None => Ok(()),
    }
}

/// fsyncs a directory so a rename inside it is durable.
pub fn fsync_dir(dir: &Path) -> StoreResult<()> {
    // Directories cannot be opened for sync on every platform
    if cfg!(unix) {
        let handle = File::open(dir).map_err(|e| StoreError::io_at("opening", dir, e))?;
        handle
            .sync_all()
            .map_err(|e| StoreError::io_at("syncing", dir, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_replaces() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("a/b/doc.json");

        write_atomic(&target, b"one").unwrap();
        write_atomic(&target, b"two").unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"two");
        let leftovers: Vec<_> = fs::read_dir(target.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| is_temp_file(&e.path()))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_create_new_refuses_existing() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("0000000001.json");

        create_new_atomic(&target, b"first").unwrap();
        let err = create_new_atomic(&target, b"second").unwrap_err();

        assert!(matches!(err, StoreError::AlreadyExists { .. }));
        assert_eq!(fs::read(&target).unwrap(), b"first");
    }

    #[test]
    fn test_remove_durable() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("x.json");
        write_atomic(&target, b"x").unwrap();

        assert!(remove_durable(&target).unwrap());
        assert!(!remove_durable(&target).unwrap());
    }

    #[test]
    fn test_temp_detection() {
        assert!(is_temp_file(Path::new("dir/abc.json.tmp-1234")));
        assert!(!is_temp_file(Path::new("dir/abc.json")));
    }
}
