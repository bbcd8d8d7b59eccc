//! Predicate filtering for search
//!
//! Attribute filters are exact JSON equality, no coercion, AND semantics.
//! A missing or null attribute never matches.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::Value;

use crate::model::{Entity, EntitySubType, EntityType, Relationship, RelationshipType};

/// Evaluates an entity query against entities.
#[derive(Debug, Clone, Default)]
pub struct EntityFilter {
    /// Lowercased name needle
    pub needle: Option<String>,
    pub entity_type: Option<EntityType>,
    pub sub_type: Option<EntitySubType>,
    pub attributes: BTreeMap<String, Value>,
}

impl EntityFilter {
    pub fn matches(&self, entity: &Entity) -> bool {
        if let Some(entity_type) = self.entity_type {
            if entity.entity_type != entity_type {
                return false;
            }
        }
        if let Some(sub_type) = self.sub_type {
            if entity.sub_type != Some(sub_type) {
                return false;
            }
        }
        if let Some(needle) = &self.needle {
            if !entity.matches_name(needle) {
                return false;
            }
        }
        self.attributes
            .iter()
            .all(|(name, expected)| attribute_matches(entity.attributes.get(name), expected))
    }
}

fn attribute_matches(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        Some(value) if !value.is_null() => value == expected,
        _ => false,
    }
}

#[derive(Debug, Clone, Default)]
pub struct RelationshipFilter {
    pub relationship_type: Option<RelationshipType>,
    pub source: Option<String>,
    pub target: Option<String>,
    pub active_on: Option<NaiveDate>,
    pub currently_active: bool,
}

impl RelationshipFilter {
    pub fn matches(&self, relationship: &Relationship) -> bool {
        if let Some(kind) = self.relationship_type {
            if relationship.relationship_type != kind {
                return false;
            }
        }
        if let Some(source) = &self.source {
            if &relationship.source_entity_id != source {
                return false;
            }
        }
        if let Some(target) = &self.target {
            if &relationship.target_entity_id != target {
                return false;
            }
        }
        if let Some(date) = self.active_on {
            if !relationship.is_active_on(date) {
                return false;
            }
        }
        !self.currently_active || relationship.is_currently_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attribute_equality_is_strict() {
        assert!(attribute_matches(Some(&json!("a")), &json!("a")));
        assert!(!attribute_matches(Some(&json!(1)), &json!("1")));
        assert!(!attribute_matches(Some(&Value::Null), &Value::Null));
        assert!(!attribute_matches(None, &json!("a")));
    }
}
