//! Record Store
//!
//! Key-value persistence for entities, relationships and authors, plus the
//! primitives the ledger uses for immutable version files. Owns the file
//! layout and the atomic-write discipline.

pub mod atomic;
pub mod checksum;
mod errors;
mod layout;
mod record;
#[allow(clippy::module_inception)]
mod store;

pub use errors::{StoreError, StoreResult};
pub use layout::{
    Layout, RecordKind, AUTHORS_DIR, ENTITIES_DIR, MIGRATION_LOGS_DIR, RELATIONSHIPS_DIR,
    UNTRACKED_DIRS, VERSIONS_DIR, VERSION_WIDTH,
};
pub use record::Record;
pub use store::{read_json, read_json_opt, to_document_bytes, write_json, RecordStore};
