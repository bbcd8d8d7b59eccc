//! Error taxonomy shared by every subsystem
//!
//! Each subsystem keeps its own error type. All of them classify into a single
//! `ErrorKind`, which carries the stable code shown to API callers and
//! migration operators and the HTTP status the read API maps it to.

use std::fmt;

/// Classification of every error the core can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or incomplete input (field-level detail attached)
    Validation,
    /// Missing entity, relationship, version, author or migration
    NotFound,
    /// Duplicate create or concurrent version sequencing clash
    Conflict,
    /// Relationship endpoint does not resolve to an entity
    Referential,
    /// Storage root is dirty before a migration run
    PreconditionFailed,
    /// Migration re-run without force
    AlreadyApplied,
    /// Underlying I/O or document corruption; fatal to the operation
    Storage,
}

impl ErrorKind {
    /// Returns the stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Referential => "REFERENTIAL_ERROR",
            ErrorKind::PreconditionFailed => "PRECONDITION_FAILED",
            ErrorKind::AlreadyApplied => "ALREADY_APPLIED",
            ErrorKind::Storage => "STORAGE_ERROR",
        }
    }

    /// Returns the HTTP status code the read API uses for this kind.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::Validation => 422,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Referential => 422,
            ErrorKind::PreconditionFailed => 412,
            ErrorKind::AlreadyApplied => 409,
            ErrorKind::Storage => 500,
        }
    }

    /// Storage failures are never retried internally.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ErrorKind::Storage)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ErrorKind::Validation.code(), "VALIDATION_ERROR");
        assert_eq!(ErrorKind::NotFound.code(), "NOT_FOUND");
        assert_eq!(ErrorKind::Conflict.code(), "CONFLICT");
        assert_eq!(ErrorKind::Referential.code(), "REFERENTIAL_ERROR");
        assert_eq!(ErrorKind::PreconditionFailed.code(), "PRECONDITION_FAILED");
        assert_eq!(ErrorKind::AlreadyApplied.code(), "ALREADY_APPLIED");
        assert_eq!(ErrorKind::Storage.code(), "STORAGE_ERROR");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ErrorKind::NotFound.status_code(), 404);
        assert_eq!(ErrorKind::Validation.status_code(), 422);
        assert_eq!(ErrorKind::Conflict.status_code(), 409);
        assert_eq!(ErrorKind::Storage.status_code(), 500);
    }

    #[test]
    fn test_only_storage_is_fatal() {
        assert!(ErrorKind::Storage.is_fatal());
        assert!(!ErrorKind::NotFound.is_fatal());
        assert!(!ErrorKind::Conflict.is_fatal());
    }
}
