//! # Migration Errors

use thiserror::Error;

use super::tracker::TrackerError;
use crate::errors::ErrorKind;
use crate::normalize::NormalizationError;
use crate::publication::PublicationError;
use crate::search::SearchError;
use crate::store::StoreError;

pub type MigrationResult<T> = Result<T, MigrationError>;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Migration not found: {0}")]
    NotFound(String),

    #[error("Invalid migration {name}: {}", errors.join("; "))]
    Invalid { name: String, errors: Vec<String> },

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Migration already applied: {0}")]
    AlreadyApplied(String),

    #[error("Migration not applied: {0}")]
    NotApplied(String),

    #[error("No procedure for migration {0}: register one or declare steps in migrate.json")]
    NoProcedure(String),

    #[error("Data file {file}: {reason}")]
    Data { file: String, reason: String },

    #[error("{0}")]
    Procedure(String),

    #[error(transparent)]
    Publication(#[from] PublicationError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Normalization(#[from] NormalizationError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MigrationError {
    pub fn procedure(message: impl Into<String>) -> Self {
        MigrationError::Procedure(message.into())
    }

    pub fn data(file: impl Into<String>, reason: impl ToString) -> Self {
        MigrationError::Data {
            file: file.into(),
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MigrationError::NotFound(_) | MigrationError::NotApplied(_) => ErrorKind::NotFound,
            MigrationError::Invalid { .. }
            | MigrationError::NoProcedure(_)
            | MigrationError::Data { .. }
            | MigrationError::Procedure(_) => ErrorKind::Validation,
            MigrationError::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
            MigrationError::AlreadyApplied(_) => ErrorKind::AlreadyApplied,
            MigrationError::Publication(e) => e.kind(),
            MigrationError::Search(e) => e.kind(),
            MigrationError::Normalization(_) => ErrorKind::Storage,
            MigrationError::Tracker(e) => e.kind(),
            MigrationError::Store(e) => e.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            MigrationError::PreconditionFailed("dirty".into()).kind(),
            ErrorKind::PreconditionFailed
        );
        assert_eq!(MigrationError::AlreadyApplied("x".into()).kind(), ErrorKind::AlreadyApplied);
        assert_eq!(MigrationError::NotFound("x".into()).kind(), ErrorKind::NotFound);
        let err: MigrationError = PublicationError::Conflict("dup".into()).into();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_invalid_message_lists_errors() {
        let err = MigrationError::Invalid {
            name: "5-bad".into(),
            errors: vec!["bad name".into(), "missing README.md".into()],
        };
        assert_eq!(err.to_string(), "Invalid migration 5-bad: bad name; missing README.md");
    }
}
