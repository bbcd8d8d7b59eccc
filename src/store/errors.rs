//! # Record Store Errors

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::errors::ErrorKind;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Record already exists: {}", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("Version out of sequence for {subject}: expected {expected}, next is {actual}")]
    OutOfSequence {
        subject: String,
        expected: u64,
        actual: u64,
    },

    #[error("I/O error {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("Corrupted document {}: {reason}", path.display())]
    Corruption { path: PathBuf, reason: String },

    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        StoreError::NotFound { kind, id: id.into() }
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        StoreError::Io {
            context: context.into(),
            source,
        }
    }

    /// I/O failure on a specific path.
    pub fn io_at(action: &str, path: &Path, source: io::Error) -> Self {
        StoreError::Io {
            context: format!("{} {}", action, path.display()),
            source,
        }
    }

    pub fn corruption(path: &Path, reason: impl Into<String>) -> Self {
        StoreError::Corruption {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound { .. } => ErrorKind::NotFound,
            StoreError::AlreadyExists { .. } | StoreError::OutOfSequence { .. } => {
                ErrorKind::Conflict
            }
            StoreError::Io { .. } | StoreError::Corruption { .. } | StoreError::Serialization(_) => {
                ErrorKind::Storage
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(StoreError::not_found("Entity", "x").kind(), ErrorKind::NotFound);
        assert_eq!(
            StoreError::AlreadyExists { path: PathBuf::from("a") }.kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            StoreError::io("reading", io::Error::new(io::ErrorKind::Other, "boom")).kind(),
            ErrorKind::Storage
        );
    }

    #[test]
    fn test_messages() {
        let err = StoreError::not_found("Entity", "entity:person/abc");
        assert_eq!(err.to_string(), "Entity not found: entity:person/abc");
    }
}
