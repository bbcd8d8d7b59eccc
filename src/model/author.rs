//! Authors of versions: humans, importers and migration runs.

use serde::{Deserialize, Serialize};

use super::validation::{is_valid_slug, FieldError, ValidationErrors};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Slug-shaped id
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
}

impl Author {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            contact: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if !is_valid_slug(&self.id) {
            errors.push(FieldError::new("id", "must be 3-50 characters of lowercase kebab-case"));
        }
        if self.name.trim().is_empty() {
            errors.push(FieldError::missing("name"));
        }
        errors.into_result()
    }
}
