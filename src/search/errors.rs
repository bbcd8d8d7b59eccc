//! # Search Errors

use thiserror::Error;

use crate::errors::ErrorKind;
use crate::model::ValidationErrors;
use crate::store::StoreError;

pub type SearchResult<T> = Result<T, SearchError>;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid query: {0}")]
    Validation(ValidationErrors),

    #[error("Storage error: {0}")]
    Storage(StoreError),
}

impl SearchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SearchError::NotFound { .. } => ErrorKind::NotFound,
            SearchError::Validation(_) => ErrorKind::Validation,
            SearchError::Storage(e) => e.kind(),
        }
    }

    pub fn details(&self) -> Option<&ValidationErrors> {
        match self {
            SearchError::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

impl From<StoreError> for SearchError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, id } => SearchError::NotFound { kind, id },
            other => SearchError::Storage(other),
        }
    }
}

impl From<ValidationErrors> for SearchError {
    fn from(errors: ValidationErrors) -> Self {
        SearchError::Validation(errors)
    }
}
