//! Version records
//!
//! A version is an immutable snapshot of a subject at one point in its
//! history. Version numbers start at 1 and are contiguous per subject.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::diff::FieldChange;

use super::keys::SubjectType;

/// Current-version stamp carried on every entity and relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSummary {
    pub version_number: u64,
    pub author_id: String,
    pub change_description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub subject_type: SubjectType,
    pub subject_id: String,
    pub version_number: u64,
    /// Full serialized subject at this version
    pub snapshot: Value,
    pub author_id: String,
    pub change_description: String,
    pub created_at: DateTime<Utc>,
    /// Structural diff against the previous version (empty for version 1)
    #[serde(default)]
    pub changes: Vec<FieldChange>,
    /// `crc32:xxxxxxxx` over the canonical snapshot bytes
    pub checksum: String,
}

impl Version {
    pub fn summary(&self) -> VersionSummary {
        VersionSummary {
            version_number: self.version_number,
            author_id: self.author_id.clone(),
            change_description: self.change_description.clone(),
            created_at: self.created_at,
        }
    }
}
