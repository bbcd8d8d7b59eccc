//! Record identity
//!
//! An entity is identified by `(entity_type, sub_type, slug)`; its canonical id
//! string is `entity:<type>/<slug>` or `entity:<type>/<sub_type>/<slug>`.
//! Relationships are identified by a generated `relationship:<uuid>` id.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::validation::{is_valid_slug, FieldError, ValidationErrors};

/// Prefix of every canonical entity id.
pub const ENTITY_ID_PREFIX: &str = "entity:";

/// Prefix of every relationship id.
pub const RELATIONSHIP_ID_PREFIX: &str = "relationship:";

/// Top-level entity classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Organization,
    Location,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "person",
            EntityType::Organization => "organization",
            EntityType::Location => "location",
        }
    }

    pub fn all() -> &'static [EntityType] {
        &[EntityType::Person, EntityType::Organization, EntityType::Location]
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::all()
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown entity type '{}'", s))
    }
}

/// Closed sub-type vocabulary. Every sub-type belongs to exactly one
/// entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitySubType {
    Politician,
    PoliticalParty,
    GovernmentBody,
    Ngo,
    InternationalOrg,
    Hospital,
    Province,
    District,
    MetropolitanCity,
    SubMetropolitanCity,
    Municipality,
    RuralMunicipality,
    Ward,
    Constituency,
}

impl EntitySubType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntitySubType::Politician => "politician",
            EntitySubType::PoliticalParty => "political_party",
            EntitySubType::GovernmentBody => "government_body",
            EntitySubType::Ngo => "ngo",
            EntitySubType::InternationalOrg => "international_org",
            EntitySubType::Hospital => "hospital",
            EntitySubType::Province => "province",
            EntitySubType::District => "district",
            EntitySubType::MetropolitanCity => "metropolitan_city",
            EntitySubType::SubMetropolitanCity => "sub_metropolitan_city",
            EntitySubType::Municipality => "municipality",
            EntitySubType::RuralMunicipality => "rural_municipality",
            EntitySubType::Ward => "ward",
            EntitySubType::Constituency => "constituency",
        }
    }

    /// The entity type this sub-type may be used with.
    pub fn parent_type(&self) -> EntityType {
        match self {
            EntitySubType::Politician => EntityType::Person,
            EntitySubType::PoliticalParty
            | EntitySubType::GovernmentBody
            | EntitySubType::Ngo
            | EntitySubType::InternationalOrg
            | EntitySubType::Hospital => EntityType::Organization,
            EntitySubType::Province
            | EntitySubType::District
            | EntitySubType::MetropolitanCity
            | EntitySubType::SubMetropolitanCity
            | EntitySubType::Municipality
            | EntitySubType::RuralMunicipality
            | EntitySubType::Ward
            | EntitySubType::Constituency => EntityType::Location,
        }
    }

    pub fn all() -> &'static [EntitySubType] {
        &[
            EntitySubType::Politician,
            EntitySubType::PoliticalParty,
            EntitySubType::GovernmentBody,
            EntitySubType::Ngo,
            EntitySubType::InternationalOrg,
            EntitySubType::Hospital,
            EntitySubType::Province,
            EntitySubType::District,
            EntitySubType::MetropolitanCity,
            EntitySubType::SubMetropolitanCity,
            EntitySubType::Municipality,
            EntitySubType::RuralMunicipality,
            EntitySubType::Ward,
            EntitySubType::Constituency,
        ]
    }
}

impl fmt::Display for EntitySubType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntitySubType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntitySubType::all()
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown entity sub-type '{}'", s))
    }
}

/// Path segment the read API uses for version history; never a slug.
pub const HISTORY_SEGMENT: &str = "versions";

/// Composite entity key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityKey {
    pub entity_type: EntityType,
    pub sub_type: Option<EntitySubType>,
    pub slug: String,
}

impl EntityKey {
    pub fn new(entity_type: EntityType, sub_type: Option<EntitySubType>, slug: impl Into<String>) -> Self {
        Self {
            entity_type,
            sub_type,
            slug: slug.into(),
        }
    }

    /// Checks slug shape and sub-type compatibility.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if !is_valid_slug(&self.slug) {
            errors.push(FieldError::new(
                "slug",
                "must be 3-50 characters of lowercase kebab-case",
            ));
        } else if self.slug == HISTORY_SEGMENT {
            errors.push(FieldError::new(
                "slug",
                format!("'{}' is reserved", HISTORY_SEGMENT),
            ));
        }
        if let Some(sub_type) = self.sub_type {
            if sub_type.parent_type() != self.entity_type {
                errors.push(FieldError::new(
                    "sub_type",
                    format!(
                        "'{}' is not a sub-type of '{}'",
                        sub_type, self.entity_type
                    ),
                ));
            }
        }
        errors.into_result()
    }

    /// Canonical id string, e.g. `entity:person/politician/ram-poudel`.
    pub fn id(&self) -> String {
        self.to_string()
    }

    /// Path segments below `entities/` (and below `versions/entity/`).
    pub fn segments(&self) -> Vec<&str> {
        let mut segments = vec![self.entity_type.as_str()];
        if let Some(sub_type) = &self.sub_type {
            segments.push(sub_type.as_str());
        }
        segments.push(&self.slug);
        segments
    }

    /// Parses `<type>/<slug>` or `<type>/<sub_type>/<slug>` (no prefix).
    pub fn from_path(path: &str) -> Result<Self, ValidationErrors> {
        let parts: Vec<&str> = path.split('/').collect();
        let key = match parts.as_slice() {
            [entity_type, slug] => EntityKey::new(parse_type(entity_type)?, None, *slug),
            [entity_type, sub_type, slug] => EntityKey::new(
                parse_type(entity_type)?,
                Some(parse_sub_type(sub_type)?),
                *slug,
            ),
            _ => {
                return Err(ValidationErrors::single(
                    "id",
                    format!("malformed entity path '{}'", path),
                ))
            }
        };
        key.validate()?;
        Ok(key)
    }
}

fn parse_type(s: &str) -> Result<EntityType, ValidationErrors> {
    s.parse().map_err(|e: String| ValidationErrors::single("type", e))
}

fn parse_sub_type(s: &str) -> Result<EntitySubType, ValidationErrors> {
    s.parse().map_err(|e: String| ValidationErrors::single("sub_type", e))
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", ENTITY_ID_PREFIX, self.segments().join("/"))
    }
}

impl FromStr for EntityKey {
    type Err = ValidationErrors;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let path = s.strip_prefix(ENTITY_ID_PREFIX).ok_or_else(|| {
            ValidationErrors::single("id", format!("entity id must start with '{}'", ENTITY_ID_PREFIX))
        })?;
        EntityKey::from_path(path)
    }
}

/// Generates a fresh relationship id.
pub fn new_relationship_id() -> String {
    format!("{}{}", RELATIONSHIP_ID_PREFIX, Uuid::new_v4())
}

/// Returns the file-system safe part of a relationship id, or `None` if the
/// id is malformed.
pub fn relationship_id_suffix(id: &str) -> Option<&str> {
    let suffix = id.strip_prefix(RELATIONSHIP_ID_PREFIX)?;
    let well_formed = !suffix.is_empty()
        && suffix.len() <= 64
        && suffix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if well_formed {
        Some(suffix)
    } else {
        None
    }
}

/// The subject of a version record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubjectRef {
    Entity(EntityKey),
    Relationship(String),
}

impl SubjectRef {
    pub fn subject_type(&self) -> SubjectType {
        match self {
            SubjectRef::Entity(_) => SubjectType::Entity,
            SubjectRef::Relationship(_) => SubjectType::Relationship,
        }
    }

    /// Canonical id of the subject.
    pub fn id(&self) -> String {
        match self {
            SubjectRef::Entity(key) => key.id(),
            SubjectRef::Relationship(id) => id.clone(),
        }
    }

    /// Rebuilds a subject from its persisted `(type, id)` pair.
    pub fn parse(subject_type: SubjectType, id: &str) -> Result<Self, ValidationErrors> {
        match subject_type {
            SubjectType::Entity => Ok(SubjectRef::Entity(id.parse()?)),
            SubjectType::Relationship => {
                if relationship_id_suffix(id).is_none() {
                    return Err(ValidationErrors::single(
                        "id",
                        format!("malformed relationship id '{}'", id),
                    ));
                }
                Ok(SubjectRef::Relationship(id.to_string()))
            }
        }
    }
}

impl fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

/// Kind of versioned subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    Entity,
    Relationship,
}

impl SubjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectType::Entity => "entity",
            SubjectType::Relationship => "relationship",
        }
    }
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
