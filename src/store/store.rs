//! File-backed record store
//!
//! One JSON document per record. Readers never lock: a document is only ever
//! replaced by an atomic rename, so a reader sees either the old or the new
//! version in full.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::atomic::{create_new_atomic, is_temp_file, remove_durable, write_atomic};
use super::errors::{StoreError, StoreResult};
use super::layout::{Layout, RecordKind};
use super::record::Record;

#[derive(Debug, Clone)]
pub struct RecordStore {
    layout: Layout,
}

impl RecordStore {
    /// Opens a storage root, creating the record directories if needed.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let layout = Layout::new(root);
        for kind in [RecordKind::Entity, RecordKind::Relationship, RecordKind::Author] {
            let dir = layout.kind_dir(kind);
            fs::create_dir_all(&dir).map_err(|e| StoreError::io_at("creating", &dir, e))?;
        }
        Ok(Self { layout })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    pub fn get<R: Record>(&self, key: &R::Key) -> StoreResult<R> {
        self.try_get::<R>(key)?
            .ok_or_else(|| StoreError::not_found(R::KIND.label(), R::key_string(key)))
    }

    pub fn try_get<R: Record>(&self, key: &R::Key) -> StoreResult<Option<R>> {
        let path = match R::record_path(&self.layout, key) {
            Ok(path) => path,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        read_json_opt(&path)
    }

    /// Atomically replaces the record's document.
    pub fn put<R: Record>(&self, record: &R) -> StoreResult<()> {
        let key = record.key();
        let path = R::record_path(&self.layout, &key)?;
        write_json(&path, record)?;
        debug!(kind = R::KIND.label(), id = %R::key_string(&key), "record written");
        Ok(())
    }

    /// Removes the current record only; history stays. Returns false if absent.
    pub fn delete<R: Record>(&self, key: &R::Key) -> StoreResult<bool> {
        let path = match R::record_path(&self.layout, key) {
            Ok(path) => path,
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e),
        };
        let removed = remove_durable(&path)?;
        if removed {
            debug!(kind = R::KIND.label(), id = %R::key_string(key), "record deleted");
        }
        Ok(removed)
    }

    pub fn exists<R: Record>(&self, key: &R::Key) -> StoreResult<bool> {
        match R::record_path(&self.layout, key) {
            Ok(path) => Ok(path.is_file()),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Filtered listing ordered by canonical key. Returns the requested page
    /// and the total number of matches. A document removed while the listing
    /// runs is left out.
    pub fn list<R, F>(&self, predicate: F, limit: Option<usize>, offset: usize) -> StoreResult<(Vec<R>, usize)>
    where
        R: Record,
        F: Fn(&R) -> bool,
    {
        let mut matches: Vec<(String, R)> = Vec::new();
        for path in self.record_files(R::KIND)? {
            let Some(record) = read_json_opt::<R>(&path)? else {
                continue;
            };
            if predicate(&record) {
                matches.push((R::key_string(&record.key()), record));
            }
        }
        matches.sort_by(|a, b| a.0.cmp(&b.0));

        let total = matches.len();
        let page = matches
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .map(|(_, r)| r)
            .collect();
        Ok((page, total))
    }

    pub fn count<R: Record>(&self) -> StoreResult<usize> {
        Ok(self.record_files(R::KIND)?.len())
    }

    /// Writes an immutable file; fails with `AlreadyExists` if present.
    pub fn create_new(&self, path: &Path, bytes: &[u8]) -> StoreResult<()> {
        create_new_atomic(path, bytes)
    }

    fn record_files(&self, kind: RecordKind) -> StoreResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        collect_json_files(&self.layout.kind_dir(kind), &mut files)?;
        Ok(files)
    }
}

fn collect_json_files(dir: &Path, out: &mut Vec<PathBuf>) -> StoreResult<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(StoreError::io_at("listing", dir, e)),
    };
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(StoreError::io_at("listing", dir, e)),
        };
        let path = entry.path();
        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(StoreError::io_at("inspecting", &path, e)),
        };
        if file_type.is_dir() {
            collect_json_files(&path, out)?;
        } else if !is_temp_file(&path) && path.extension().map_or(false, |e| e == "json") {
            out.push(path);
        }
    }
    Ok(())
}

/// Serializes as pretty JSON with a trailing newline.
pub fn to_document_bytes<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    let mut bytes =
        serde_json::to_vec_pretty(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
    bytes.push(b'\n');
    Ok(bytes)
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    write_atomic(path, &to_document_bytes(value)?)
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> StoreResult<T> {
    read_json_opt(path)?.ok_or_else(|| {
        StoreError::io_at("reading", path, io::Error::from(io::ErrorKind::NotFound))
    })
}

pub fn read_json_opt<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io_at("reading", path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| StoreError::corruption(path, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Author;
    use tempfile::TempDir;

    fn store() -> (TempDir, RecordStore) {
        let temp = TempDir::new().unwrap();
        let store = RecordStore::open(temp.path()).unwrap();
        (temp, store)
    }

    #[test]
    fn test_put_get_delete() {
        let (_temp, store) = store();
        let author = Author::new("importer-bot", "Importer");

        store.put(&author).unwrap();
        assert!(store.exists::<Author>(&"importer-bot".to_string()).unwrap());
        let loaded: Author = store.get(&"importer-bot".to_string()).unwrap();
        assert_eq!(loaded, author);

        assert!(store.delete::<Author>(&"importer-bot".to_string()).unwrap());
        assert!(!store.delete::<Author>(&"importer-bot".to_string()).unwrap());
        let err = store.get::<Author>(&"importer-bot".to_string()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_malformed_key_is_not_found() {
        let (_temp, store) = store();
        let err = store.get::<Author>(&"../../etc/passwd".to_string()).unwrap_err();
        assert!(err.is_not_found());
        assert!(!store.exists::<Author>(&"../x".to_string()).unwrap());
    }

    #[test]
    fn test_list_ordering_and_paging() {
        let (_temp, store) = store();
        for id in ["ccc-author", "aaa-author", "bbb-author", "ddd-author"] {
            store.put(&Author::new(id, id)).unwrap();
        }

        let (page, total) = store.list::<Author, _>(|_| true, Some(2), 1).unwrap();
        assert_eq!(total, 4);
        let ids: Vec<_> = page.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["bbb-author", "ccc-author"]);

        let (page, total) = store.list::<Author, _>(|a| a.id.starts_with('a'), None, 0).unwrap();
        assert_eq!(total, 1);
        assert_eq!(page[0].id, "aaa-author");
        assert_eq!(store.count::<Author>().unwrap(), 4);
    }

    #[test]
    fn test_list_skips_temp_files() {
        let (temp, store) = store();
        store.put(&Author::new("real-author", "Real")).unwrap();
        fs::write(temp.path().join("authors/real-author.json.tmp-abc"), b"{garbage").unwrap();

        let (page, total) = store.list::<Author, _>(|_| true, None, 0).unwrap();
        assert_eq!(total, 1);
        assert_eq!(page.len(), 1);
    }

    #[test]
    fn test_list_tolerates_vanished_document() {
        let (temp, store) = store();
        store.put(&Author::new("kept-author", "Kept")).unwrap();
        store.put(&Author::new("gone-author", "Gone")).unwrap();
        let gone = temp.path().join("authors/gone-author.json");

        let (page, total) = store
            .list::<Author, _>(
                |a| {
                    // Removed after the directory scan, before it is read
                    let _ = fs::remove_file(&gone);
                    a.id != "nobody"
                },
                None,
                0,
            )
            .unwrap();
        assert_eq!(total, page.len());
        assert!(page.iter().any(|a| a.id == "kept-author"));
    }

    #[test]
    fn test_corrupted_document() {
        let (temp, store) = store();
        fs::write(temp.path().join("authors/broken-author.json"), b"{not json").unwrap();
        let err = store.get::<Author>(&"broken-author".to_string()).unwrap_err();
        assert!(matches!(err, StoreError::Corruption { .. }));
    }
}
