//! # Publication Errors

use thiserror::Error;

use crate::errors::ErrorKind;
use crate::model::ValidationErrors;
use crate::store::StoreError;

pub type PublicationResult<T> = Result<T, PublicationError>;

#[derive(Debug, Error)]
pub enum PublicationError {
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{field} does not resolve to an entity: {id}")]
    Referential { field: &'static str, id: String },

    #[error("Storage error: {0}")]
    Storage(StoreError),

    /// The version snapshot landed but the current record could not be
    /// replaced. The write is part of history; recovery finishes it.
    #[error("{subject} v{version} committed, record pending recovery: {source}")]
    PendingRecovery {
        subject: String,
        version: u64,
        source: StoreError,
    },
}

impl PublicationError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        PublicationError::NotFound { kind, id: id.into() }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        PublicationError::Validation(ValidationErrors::single(field, message))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PublicationError::Validation(_) => ErrorKind::Validation,
            PublicationError::NotFound { .. } => ErrorKind::NotFound,
            PublicationError::Conflict(_) => ErrorKind::Conflict,
            PublicationError::Referential { .. } => ErrorKind::Referential,
            PublicationError::Storage(e) => e.kind(),
            PublicationError::PendingRecovery { .. } => ErrorKind::Storage,
        }
    }

    /// Field-level details for validation failures.
    pub fn details(&self) -> Option<&ValidationErrors> {
        match self {
            PublicationError::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

impl From<ValidationErrors> for PublicationError {
    fn from(errors: ValidationErrors) -> Self {
        PublicationError::Validation(errors)
    }
}

impl From<StoreError> for PublicationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, id } => PublicationError::NotFound { kind, id },
            StoreError::OutOfSequence { .. } | StoreError::AlreadyExists { .. } => {
                PublicationError::Conflict(err.to_string())
            }
            other => PublicationError::Storage(other),
        }
    }
}
