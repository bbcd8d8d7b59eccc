//! Migration discovery
//!
//! Scans the migrations root for `NNN-descriptive-name/` folders:
//! 1. Hidden entries and plain files are ignored
//! 2. Each folder is checked for name shape, `migrate.json` and `README.md`
//! 3. Folders sharing a numeric prefix are all rejected
//! 4. Valid migrations are sorted ascending by prefix
//!
//! Rejected folders are reported with their errors, never silently dropped.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use super::errors::{MigrationError, MigrationResult};
use super::manifest::{MigrationManifest, MANIFEST_FILE, README_FILE};
use crate::store::checksum::sha256_hex;

fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{3})-([a-z0-9]+(?:-[a-z0-9]+)*)$").expect("static regex"))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Migration {
    pub prefix: u32,
    /// Descriptive part after the prefix
    pub name: String,
    /// `NNN-descriptive-name`
    pub full_name: String,
    pub folder: PathBuf,
    pub manifest: MigrationManifest,
    pub date: NaiveDate,
}

impl Migration {
    /// Description recorded on every version the migration writes.
    pub fn change_description(&self) -> String {
        match &self.manifest.change_description {
            Some(desc) if !desc.trim().is_empty() => desc.clone(),
            _ => format!("Migration {}: {}", self.full_name, self.manifest.description),
        }
    }

    /// Author id under which the migration's versions are recorded.
    pub fn author_id(&self) -> String {
        let mut id = format!("migration-{}", self.full_name);
        id.truncate(50);
        id.trim_end_matches('-').to_string()
    }

    /// SHA-256 over every file in the folder (path and content), in path
    /// order.
    pub fn content_digest(&self) -> MigrationResult<String> {
        let mut files = Vec::new();
        collect_files(&self.folder, &self.folder, &mut files)?;
        files.sort();

        let mut buffer = Vec::new();
        for rel in files {
            let path = self.folder.join(&rel);
            let bytes = fs::read(&path).map_err(|e| MigrationError::data(rel.clone(), e))?;
            buffer.extend_from_slice(rel.as_bytes());
            buffer.push(0);
            buffer.extend_from_slice(sha256_hex(&bytes).as_bytes());
            buffer.push(b'\n');
        }
        Ok(sha256_hex(&buffer))
    }
}

fn collect_files(base: &Path, dir: &Path, out: &mut Vec<String>) -> MigrationResult<()> {
    let entries = fs::read_dir(dir).map_err(|e| MigrationError::data(dir.display().to_string(), e))?;
    for entry in entries {
        let entry = entry.map_err(|e| MigrationError::data(dir.display().to_string(), e))?;
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if hidden {
            continue;
        }
        if path.is_dir() {
            collect_files(base, &path, out)?;
        } else if let Ok(rel) = path.strip_prefix(base) {
            out.push(rel.to_string_lossy().replace('\\', "/"));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidMigration {
    pub name: String,
    pub folder: PathBuf,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub valid: Vec<Migration>,
    pub invalid: Vec<InvalidMigration>,
}

impl Discovery {
    pub fn find(&self, name: &str) -> Option<&Migration> {
        self.valid
            .iter()
            .find(|m| m.full_name == name || format!("{:03}", m.prefix) == name)
    }

    pub fn find_invalid(&self, name: &str) -> Option<&InvalidMigration> {
        self.invalid.iter().find(|m| m.name == name)
    }
}

/// Discovers migrations under `root`. A missing root yields nothing.
pub fn discover(root: &Path) -> MigrationResult<Discovery> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(root = %root.display(), "migrations directory does not exist");
            return Ok(Discovery::default());
        }
        Err(e) => return Err(MigrationError::data(root.display().to_string(), e)),
    };

    let mut discovery = Discovery::default();
    let mut candidates = Vec::new();

    for entry in entries {
        let entry = entry.map_err(|e| MigrationError::data(root.display().to_string(), e))?;
        let folder_name = entry.file_name().to_string_lossy().into_owned();
        if folder_name.starts_with('.') || !entry.path().is_dir() {
            continue;
        }
        match load(&entry.path(), &folder_name) {
            Ok(migration) => candidates.push(migration),
            Err(errors) => {
                warn!(migration = %folder_name, errors = %errors.join("; "), "invalid migration folder");
                discovery.invalid.push(InvalidMigration {
                    name: folder_name,
                    folder: entry.path(),
                    errors,
                });
            }
        }
    }

    let mut by_prefix: BTreeMap<u32, Vec<Migration>> = BTreeMap::new();
    for migration in candidates {
        by_prefix.entry(migration.prefix).or_default().push(migration);
    }
    for (prefix, group) in by_prefix {
        if group.len() == 1 {
            discovery.valid.extend(group);
            continue;
        }
        let names: Vec<String> = group.iter().map(|m| m.full_name.clone()).collect();
        for migration in group {
            discovery.invalid.push(InvalidMigration {
                name: migration.full_name.clone(),
                folder: migration.folder,
                errors: vec![format!(
                    "duplicate prefix {:03} shared by {}",
                    prefix,
                    names.join(", ")
                )],
            });
        }
    }

    discovery.invalid.sort_by(|a, b| a.name.cmp(&b.name));
    debug!(
        valid = discovery.valid.len(),
        invalid = discovery.invalid.len(),
        "migrations discovered"
    );
    Ok(discovery)
}

fn load(folder: &Path, folder_name: &str) -> Result<Migration, Vec<String>> {
    let mut errors = Vec::new();

    let captures = name_regex().captures(folder_name);
    if captures.is_none() {
        errors.push(format!(
            "folder name '{}' must look like NNN-descriptive-name (3-digit prefix, lowercase kebab-case)",
            folder_name
        ));
    }
    if !folder.join(README_FILE).is_file() {
        errors.push(format!("missing {}", README_FILE));
    }

    let manifest_path = folder.join(MANIFEST_FILE);
    let manifest = match fs::read(&manifest_path) {
        Ok(bytes) => match serde_json::from_slice::<MigrationManifest>(&bytes) {
            Ok(manifest) => {
                errors.extend(manifest.problems());
                Some(manifest)
            }
            Err(e) => {
                errors.push(format!("unreadable {}: {}", MANIFEST_FILE, e));
                None
            }
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            errors.push(format!("missing {}", MANIFEST_FILE));
            None
        }
        Err(e) => {
            errors.push(format!("cannot read {}: {}", MANIFEST_FILE, e));
            None
        }
    };

    match (captures, manifest) {
        (Some(caps), Some(manifest)) if errors.is_empty() => {
            let prefix = caps[1].parse::<u32>().map_err(|e| vec![e.to_string()])?;
            let date = manifest
                .parsed_date()
                .ok_or_else(|| vec![format!("date '{}' is not YYYY-MM-DD", manifest.date)])?;
            Ok(Migration {
                prefix,
                name: caps[2].to_string(),
                full_name: folder_name.to_string(),
                folder: folder.to_path_buf(),
                manifest,
                date,
            })
        }
        _ => Err(errors),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make(root: &Path, name: &str, manifest: Option<&str>, readme: bool) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        if let Some(m) = manifest {
            fs::write(dir.join(MANIFEST_FILE), m).unwrap();
        }
        if readme {
            fs::write(dir.join(README_FILE), "# migration\n").unwrap();
        }
    }

    const GOOD: &str = r#"{"author": "a@b.c", "date": "2024-01-01", "description": "d"}"#;

    #[test]
    fn test_sorted_by_prefix() {
        let temp = TempDir::new().unwrap();
        make(temp.path(), "010-later", Some(GOOD), true);
        make(temp.path(), "002-earlier", Some(GOOD), true);
        make(temp.path(), ".hidden", None, false);

        let discovery = discover(temp.path()).unwrap();
        let names: Vec<_> = discovery.valid.iter().map(|m| m.full_name.as_str()).collect();
        assert_eq!(names, vec!["002-earlier", "010-later"]);
        assert!(discovery.invalid.is_empty());
        assert_eq!(discovery.valid[0].prefix, 2);
        assert_eq!(discovery.valid[0].name, "earlier");
    }

    #[test]
    fn test_invalid_folders_reported() {
        let temp = TempDir::new().unwrap();
        make(temp.path(), "1-bad-name", Some(GOOD), true);
        make(temp.path(), "003-no-readme", Some(GOOD), false);
        make(temp.path(), "004-no-manifest", None, true);
        make(temp.path(), "005-bad-date", Some(r#"{"author": "a", "date": "2024/01/01", "description": "d"}"#), true);

        let discovery = discover(temp.path()).unwrap();
        assert!(discovery.valid.is_empty());
        assert_eq!(discovery.invalid.len(), 4);
        let no_readme = discovery.find_invalid("003-no-readme").unwrap();
        assert_eq!(no_readme.errors, vec!["missing README.md".to_string()]);
    }

    #[test]
    fn test_duplicate_prefix_rejected() {
        let temp = TempDir::new().unwrap();
        make(temp.path(), "007-one", Some(GOOD), true);
        make(temp.path(), "007-two", Some(GOOD), true);

        let discovery = discover(temp.path()).unwrap();
        assert!(discovery.valid.is_empty());
        assert_eq!(discovery.invalid.len(), 2);
    }

    #[test]
    fn test_missing_root_is_empty() {
        let temp = TempDir::new().unwrap();
        let discovery = discover(&temp.path().join("missing")).unwrap();
        assert!(discovery.valid.is_empty());
    }

    #[test]
    fn test_digest_changes_with_content() {
        let temp = TempDir::new().unwrap();
        make(temp.path(), "001-seed", Some(GOOD), true);
        let first = discover(temp.path()).unwrap().valid[0].content_digest().unwrap();
        fs::write(temp.path().join("001-seed/data.csv"), "a,b\n").unwrap();
        let second = discover(temp.path()).unwrap().valid[0].content_digest().unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_author_id_is_slug() {
        let temp = TempDir::new().unwrap();
        make(temp.path(), "005-seed-2079-election-candidates-with-a-long-name", Some(GOOD), true);
        let migration = discover(temp.path()).unwrap().valid.remove(0);
        let id = migration.author_id();
        assert!(crate::model::validation::is_valid_slug(&id));
    }
}
