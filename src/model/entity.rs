//! Entities: people, organizations and locations

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::identifiers::{
    validate_attributions, validate_contacts, validate_identifiers, Attribution, Contact,
    ExternalIdentifier,
};
use super::keys::{EntityKey, EntitySubType, EntityType};
use super::names::{validate_names, Name, NameKind};
use super::validation::{FieldError, ValidationErrors};
use super::version::VersionSummary;

/// Ordered string to JSON attribute map.
pub type Attributes = BTreeMap<String, Value>;

/// Entity fields supplied by a caller; the version stamp and creation time
/// are assigned on publication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEntity {
    pub slug: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<EntitySubType>,
    pub names: Vec<Name>,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub identifiers: Vec<ExternalIdentifier>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub attributions: Vec<Attribution>,
}

impl NewEntity {
    pub fn new(key: EntityKey, names: Vec<Name>) -> Self {
        Self {
            slug: key.slug,
            entity_type: key.entity_type,
            sub_type: key.sub_type,
            names,
            attributes: Attributes::new(),
            identifiers: Vec::new(),
            contacts: Vec::new(),
            attributions: Vec::new(),
        }
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.entity_type, self.sub_type, self.slug.clone())
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Stamps the draft with its first version.
    pub fn into_entity(self, summary: VersionSummary) -> Entity {
        let created_at = summary.created_at;
        Entity {
            slug: self.slug,
            entity_type: self.entity_type,
            sub_type: self.sub_type,
            names: self.names,
            attributes: self.attributes,
            identifiers: self.identifiers,
            contacts: self.contacts,
            attributions: self.attributions,
            version_summary: summary,
            created_at,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        validate_fields(
            &self.key(),
            &self.names,
            &self.attributes,
            &self.identifiers,
            &self.contacts,
            &self.attributions,
        )
    }
}

/// A published entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub slug: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<EntitySubType>,
    pub names: Vec<Name>,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub identifiers: Vec<ExternalIdentifier>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub attributions: Vec<Attribution>,
    pub version_summary: VersionSummary,
    pub created_at: DateTime<Utc>,
}

impl Entity {
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.entity_type, self.sub_type, self.slug.clone())
    }

    pub fn id(&self) -> String {
        self.key().id()
    }

    pub fn primary_name(&self) -> Option<&Name> {
        self.names.iter().find(|n| n.kind == NameKind::Primary)
    }

    /// Case-insensitive substring match over all names. `needle` must already
    /// be lowercased.
    pub fn matches_name(&self, needle: &str) -> bool {
        self.names.iter().any(|n| n.matches(needle))
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        validate_fields(
            &self.key(),
            &self.names,
            &self.attributes,
            &self.identifiers,
            &self.contacts,
            &self.attributions,
        )
    }
}

fn validate_fields(
    key: &EntityKey,
    names: &[Name],
    attributes: &Attributes,
    identifiers: &[ExternalIdentifier],
    contacts: &[Contact],
    attributions: &[Attribution],
) -> Result<(), ValidationErrors> {
    let mut errors = match key.validate() {
        Ok(()) => ValidationErrors::new(),
        Err(e) => e,
    };
    for error in validate_names(names).errors() {
        errors.push(error.clone());
    }
    if attributes.keys().any(|k| k.trim().is_empty()) {
        errors.push(FieldError::new("attributes", "attribute names must not be empty"));
    }
    for error in validate_identifiers(identifiers)
        .errors()
        .iter()
        .chain(validate_contacts(contacts).errors())
        .chain(validate_attributions(attributions).errors())
    {
        errors.push(error.clone());
    }
    errors.into_result()
}
