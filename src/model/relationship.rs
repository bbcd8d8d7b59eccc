//! Typed, dated relationships between entities

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::entity::Attributes;
use super::keys::EntityKey;
use super::validation::{FieldError, ValidationErrors};
use super::version::VersionSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    MemberOf,
    AffiliatedWith,
    EmployedBy,
    HoldsPosition,
    ElectedTo,
    LocatedIn,
    ParentOf,
    ChildOf,
    SpouseOf,
    SiblingOf,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::MemberOf => "MEMBER_OF",
            RelationshipType::AffiliatedWith => "AFFILIATED_WITH",
            RelationshipType::EmployedBy => "EMPLOYED_BY",
            RelationshipType::HoldsPosition => "HOLDS_POSITION",
            RelationshipType::ElectedTo => "ELECTED_TO",
            RelationshipType::LocatedIn => "LOCATED_IN",
            RelationshipType::ParentOf => "PARENT_OF",
            RelationshipType::ChildOf => "CHILD_OF",
            RelationshipType::SpouseOf => "SPOUSE_OF",
            RelationshipType::SiblingOf => "SIBLING_OF",
        }
    }

    pub fn all() -> &'static [RelationshipType] {
        &[
            RelationshipType::MemberOf,
            RelationshipType::AffiliatedWith,
            RelationshipType::EmployedBy,
            RelationshipType::HoldsPosition,
            RelationshipType::ElectedTo,
            RelationshipType::LocatedIn,
            RelationshipType::ParentOf,
            RelationshipType::ChildOf,
            RelationshipType::SpouseOf,
            RelationshipType::SiblingOf,
        ]
    }
}

impl std::str::FromStr for RelationshipType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RelationshipType::all()
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown relationship type '{}'", s))
    }
}

/// Relationship fields supplied by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRelationship {
    pub source_entity_id: String,
    pub target_entity_id: String,
    pub relationship_type: RelationshipType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub attributes: Attributes,
}

impl NewRelationship {
    pub fn new(source: &EntityKey, target: &EntityKey, relationship_type: RelationshipType) -> Self {
        Self {
            source_entity_id: source.id(),
            target_entity_id: target.id(),
            relationship_type,
            start_date: None,
            end_date: None,
            attributes: Attributes::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        validate_fields(
            &self.source_entity_id,
            &self.target_entity_id,
            self.start_date,
            self.end_date,
        )
    }

    pub fn into_relationship(self, id: String, summary: VersionSummary) -> Relationship {
        let created_at = summary.created_at;
        Relationship {
            id,
            source_entity_id: self.source_entity_id,
            target_entity_id: self.target_entity_id,
            relationship_type: self.relationship_type,
            start_date: self.start_date,
            end_date: self.end_date,
            attributes: self.attributes,
            version_summary: summary,
            created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    pub source_entity_id: String,
    pub target_entity_id: String,
    pub relationship_type: RelationshipType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub attributes: Attributes,
    pub version_summary: VersionSummary,
    pub created_at: DateTime<Utc>,
}

impl Relationship {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        validate_fields(
            &self.source_entity_id,
            &self.target_entity_id,
            self.start_date,
            self.end_date,
        )
    }

    /// True when `[start_date, end_date]` contains `date`; open ends are
    /// unbounded.
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        let started = self.start_date.map_or(true, |start| start <= date);
        let not_ended = self.end_date.map_or(true, |end| date <= end);
        started && not_ended
    }

    /// A relationship without an end date is current.
    pub fn is_currently_active(&self) -> bool {
        self.end_date.is_none()
    }
}

fn validate_fields(
    source: &str,
    target: &str,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    if let Err(e) = source.parse::<EntityKey>() {
        errors.extend_prefixed("source_entity_id", e);
    }
    if let Err(e) = target.parse::<EntityKey>() {
        errors.extend_prefixed("target_entity_id", e);
    }
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            errors.push(FieldError::new(
                "end_date",
                format!("{} is before start_date {}", end, start),
            ));
        }
    }
    errors.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::keys::{EntitySubType, EntityType};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn draft() -> NewRelationship {
        NewRelationship::new(
            &EntityKey::new(EntityType::Person, Some(EntitySubType::Politician), "ram-poudel"),
            &EntityKey::new(EntityType::Organization, Some(EntitySubType::PoliticalParty), "nepali-congress"),
            RelationshipType::MemberOf,
        )
    }

    #[test]
    fn test_end_before_start_rejected() {
        let mut d = draft();
        d.start_date = Some(date("2020-01-01"));
        d.end_date = Some(date("2019-12-31"));
        let errors = d.validate().unwrap_err();
        assert!(errors.has_field("end_date"));
    }

    #[test]
    fn test_same_day_allowed() {
        let mut d = draft();
        d.start_date = Some(date("2020-01-01"));
        d.end_date = Some(date("2020-01-01"));
        assert!(d.validate().is_ok());
    }

    #[test]
    fn test_malformed_endpoint_rejected() {
        let mut d = draft();
        d.target_entity_id = "not-an-id".into();
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_activity_window() {
        let summary = VersionSummary {
            version_number: 1,
            author_id: "tester".into(),
            change_description: "test".into(),
            created_at: Utc::now(),
        };
        let mut d = draft();
        d.start_date = Some(date("2018-01-01"));
        d.end_date = Some(date("2022-12-31"));
        let rel = d.into_relationship("relationship:abc".into(), summary);
        assert!(rel.is_active_on(date("2018-01-01")));
        assert!(rel.is_active_on(date("2022-12-31")));
        assert!(!rel.is_active_on(date("2017-12-31")));
        assert!(!rel.is_active_on(date("2023-01-01")));
        assert!(!rel.is_currently_active());
    }

    #[test]
    fn test_type_parse() {
        assert_eq!("ELECTED_TO".parse::<RelationshipType>().unwrap(), RelationshipType::ElectedTo);
        assert!("FRIEND_OF".parse::<RelationshipType>().is_err());
    }
}
