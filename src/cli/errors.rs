//! CLI-specific error types
//!
//! Every CLI failure is reported as `CODE: message` on stderr with a
//! non-zero exit.

use std::io;

use thiserror::Error;

use crate::config::ConfigError;
use crate::errors::ErrorKind;
use crate::migration::{MigrationError, TrackerError};
use crate::publication::PublicationError;
use crate::search::SearchError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Publication(#[from] PublicationError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error("Migration run failed: {0}")]
    RunFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP server failed: {0}")]
    Serve(String),
}

impl CliError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CliError::Config(e) => e.kind(),
            CliError::Publication(e) => e.kind(),
            CliError::Search(e) => e.kind(),
            CliError::Migration(e) => e.kind(),
            CliError::Tracker(e) => e.kind(),
            CliError::RunFailed(_) => ErrorKind::Validation,
            CliError::Io(_) | CliError::Json(_) | CliError::Serve(_) => ErrorKind::Storage,
        }
    }

    /// Stable code string
    pub fn code_str(&self) -> &'static str {
        self.kind().code()
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        let err: CliError = MigrationError::PreconditionFailed("dirty".into()).into();
        assert_eq!(err.code_str(), "PRECONDITION_FAILED");
        let err: CliError = ConfigError::Invalid("bad".into()).into();
        assert_eq!(err.code_str(), "VALIDATION_ERROR");
    }
}
