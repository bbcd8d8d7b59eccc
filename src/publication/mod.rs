//! Publication Service
//!
//! Validation, referential checks, diffing, per-subject exclusion and
//! ordered ledger writes for every mutation of the corpus.

mod errors;
mod locks;
mod service;

pub use errors::{PublicationError, PublicationResult};
pub use locks::KeyLocks;
pub use service::PublicationService;
