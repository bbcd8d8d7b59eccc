//! Normalization boundary
//!
//! Migrations may turn raw, messy source text into structured candidate
//! fields through an external service (scraping, translation, language
//! models). The service is opaque and not assumed deterministic; migration
//! applicability never depends on its output.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::model::EntityType;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizationRequest {
    pub raw_text: String,
    #[serde(default)]
    pub identifiers: BTreeMap<String, String>,
    #[serde(default)]
    pub entity_type_hint: Option<EntityType>,
}

impl NormalizationRequest {
    pub fn new(raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            ..Default::default()
        }
    }

    pub fn with_hint(mut self, entity_type: EntityType) -> Self {
        self.entity_type_hint = Some(entity_type);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedCandidate {
    pub fields: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("Normalization service unavailable")]
    Unavailable,

    #[error("Normalization failed: {0}")]
    Failed(String),
}

pub trait Normalizer: Send + Sync {
    fn normalize(&self, request: &NormalizationRequest) -> Result<NormalizedCandidate, NormalizationError>;
}

impl<F> Normalizer for F
where
    F: Fn(&NormalizationRequest) -> Result<NormalizedCandidate, NormalizationError> + Send + Sync,
{
    fn normalize(&self, request: &NormalizationRequest) -> Result<NormalizedCandidate, NormalizationError> {
        self(request)
    }
}

/// Default when no service is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableNormalizer;

impl Normalizer for UnavailableNormalizer {
    fn normalize(&self, _request: &NormalizationRequest) -> Result<NormalizedCandidate, NormalizationError> {
        Err(NormalizationError::Unavailable)
    }
}
