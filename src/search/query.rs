//! Query and page types

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{EntitySubType, EntityType, RelationshipType};

/// Page size used when neither the caller nor the config narrows it.
pub const DEFAULT_MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityQuery {
    /// Case-insensitive substring over every name part
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub entity_type: Option<EntityType>,
    #[serde(default)]
    pub sub_type: Option<EntitySubType>,
    /// Exact-match attribute filters, all must hold
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationshipQuery {
    #[serde(default)]
    pub relationship_type: Option<RelationshipType>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub active_on: Option<NaiveDate>,
    #[serde(default)]
    pub currently_active: bool,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

/// One page of ordered results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub results: Vec<T>,
    /// Number of matches across all pages
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// Clamps a requested limit to `1..=max`; absent means `max`.
pub fn clamp_limit(requested: Option<usize>, max: usize) -> usize {
    let max = max.max(1);
    requested.unwrap_or(max).clamp(1, max)
}
