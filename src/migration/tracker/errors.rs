//! # Change Tracker Errors

use std::io;
use std::path::Path;

use thiserror::Error;

use crate::errors::ErrorKind;
use crate::store::StoreError;

pub type TrackerResult<T> = Result<T, TrackerError>;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("I/O error {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    #[error("Corrupted baseline {path}: {reason}")]
    Corruption { path: String, reason: String },

    #[error("Cannot revert migration {migration}: {reason}")]
    NotRevertible { migration: String, reason: String },

    #[error("No commits recorded for migration {0}")]
    NothingToRevert(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TrackerError {
    pub fn io_at(action: &str, path: &Path, source: io::Error) -> Self {
        TrackerError::Io {
            context: format!("{} {}", action, path.display()),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TrackerError::NotRevertible { .. } => ErrorKind::Conflict,
            TrackerError::NothingToRevert(_) => ErrorKind::NotFound,
            TrackerError::Store(e) => e.kind(),
            _ => ErrorKind::Storage,
        }
    }
}
