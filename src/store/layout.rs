//! On-disk layout of a storage root
//!
//! ```text
//! entities/<type>[/<sub_type>]/<slug>.json
//! relationships/<uuid>.json
//! authors/<id>.json
//! versions/entity/<type>[/<sub_type>]/<slug>/<NNNNNNNNNN>.json
//! versions/relationship/<uuid>/<NNNNNNNNNN>.json
//! migration-logs/<migration>/...
//! .journal/                 write-intent markers
//! .migration-failures/      failed migration runs
//! ```

use std::path::{Path, PathBuf};

use crate::model::{relationship_id_suffix, EntityKey, SubjectRef};

pub const ENTITIES_DIR: &str = "entities";
pub const RELATIONSHIPS_DIR: &str = "relationships";
pub const AUTHORS_DIR: &str = "authors";
pub const VERSIONS_DIR: &str = "versions";
pub const MIGRATION_LOGS_DIR: &str = "migration-logs";
pub const JOURNAL_DIR: &str = ".journal";
pub const FAILURES_DIR: &str = ".migration-failures";
pub const BASELINE_DIR: &str = ".baseline";

/// Top-level entries that are never part of tracked content.
pub const UNTRACKED_DIRS: &[&str] = &[BASELINE_DIR, ".git", JOURNAL_DIR, FAILURES_DIR];

/// Width of zero-padded version file names.
pub const VERSION_WIDTH: usize = 10;

/// Kinds of current-state records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Entity,
    Relationship,
    Author,
}

impl RecordKind {
    pub fn label(&self) -> &'static str {
        match self {
            RecordKind::Entity => "Entity",
            RecordKind::Relationship => "Relationship",
            RecordKind::Author => "Author",
        }
    }

    pub fn dir_name(&self) -> &'static str {
        match self {
            RecordKind::Entity => ENTITIES_DIR,
            RecordKind::Relationship => RELATIONSHIPS_DIR,
            RecordKind::Author => AUTHORS_DIR,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn kind_dir(&self, kind: RecordKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    pub fn entity_path(&self, key: &EntityKey) -> PathBuf {
        let mut path = self.root.join(ENTITIES_DIR);
        let segments = key.segments();
        let (slug, dirs) = match segments.split_last() {
            Some(split) => split,
            None => return path,
        };
        for dir in dirs {
            path.push(dir);
        }
        path.push(format!("{}.json", slug));
        path
    }

    /// `None` for malformed relationship ids.
    pub fn relationship_path(&self, id: &str) -> Option<PathBuf> {
        let suffix = relationship_id_suffix(id)?;
        Some(self.root.join(RELATIONSHIPS_DIR).join(format!("{}.json", suffix)))
    }

    pub fn author_path(&self, id: &str) -> PathBuf {
        self.root.join(AUTHORS_DIR).join(format!("{}.json", id))
    }

    /// `None` for malformed relationship ids.
    pub fn version_dir(&self, subject: &SubjectRef) -> Option<PathBuf> {
        let mut path = self.root.join(VERSIONS_DIR);
        match subject {
            SubjectRef::Entity(key) => {
                path.push("entity");
                for segment in key.segments() {
                    path.push(segment);
                }
            }
            SubjectRef::Relationship(id) => {
                path.push("relationship");
                path.push(relationship_id_suffix(id)?);
            }
        }
        Some(path)
    }

    pub fn version_file_name(version_number: u64) -> String {
        format!("{:0width$}.json", version_number, width = VERSION_WIDTH)
    }

    /// Parses `NNNNNNNNNN.json`.
    pub fn parse_version_file_name(name: &str) -> Option<u64> {
        let stem = name.strip_suffix(".json")?;
        if stem.len() != VERSION_WIDTH || !stem.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        stem.parse().ok()
    }

    pub fn migration_logs_dir(&self) -> PathBuf {
        self.root.join(MIGRATION_LOGS_DIR)
    }

    pub fn migration_log_dir(&self, migration: &str) -> PathBuf {
        self.migration_logs_dir().join(migration)
    }

    pub fn journal_dir(&self) -> PathBuf {
        self.root.join(JOURNAL_DIR)
    }

    pub fn failures_dir(&self) -> PathBuf {
        self.root.join(FAILURES_DIR)
    }

    pub fn baseline_dir(&self) -> PathBuf {
        self.root.join(BASELINE_DIR)
    }

    /// Path relative to the root with `/` separators, if below the root.
    pub fn relative(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }

    /// True for relative paths inside an untracked top-level directory.
    pub fn is_untracked(relative: &str) -> bool {
        let top = relative.split('/').next().unwrap_or("");
        UNTRACKED_DIRS.contains(&top)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntitySubType, EntityType};

    #[test]
    fn test_entity_paths() {
        let layout = Layout::new("/data");
        let with_sub = EntityKey::new(EntityType::Person, Some(EntitySubType::Politician), "ram-poudel");
        let without = EntityKey::new(EntityType::Location, None, "kaski");
        assert_eq!(
            layout.entity_path(&with_sub),
            PathBuf::from("/data/entities/person/politician/ram-poudel.json")
        );
        assert_eq!(layout.entity_path(&without), PathBuf::from("/data/entities/location/kaski.json"));
    }

    #[test]
    fn test_version_paths() {
        let layout = Layout::new("/data");
        let subject = SubjectRef::Entity(EntityKey::new(EntityType::Person, None, "abc"));
        assert_eq!(
            layout.version_dir(&subject).unwrap(),
            PathBuf::from("/data/versions/entity/person/abc")
        );
        assert_eq!(Layout::version_file_name(2), "0000000002.json");
        assert_eq!(Layout::parse_version_file_name("0000000002.json"), Some(2));
        assert_eq!(Layout::parse_version_file_name("2.json"), None);
        assert_eq!(Layout::parse_version_file_name("0000000002.json.tmp-x"), None);
    }

    #[test]
    fn test_malformed_relationship_id_has_no_path() {
        let layout = Layout::new("/data");
        assert!(layout.relationship_path("relationship:../x").is_none());
        assert!(layout
            .version_dir(&SubjectRef::Relationship("bogus".into()))
            .is_none());
    }

    #[test]
    fn test_untracked() {
        assert!(Layout::is_untracked(".journal/abc.json"));
        assert!(Layout::is_untracked(".migration-failures/001-x/t/metadata.json"));
        assert!(!Layout::is_untracked("entities/person/abc.json"));
        assert!(!Layout::is_untracked("migration-logs/001-x/metadata.json"));
    }
}
