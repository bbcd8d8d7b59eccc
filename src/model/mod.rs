//! Record types
//!
//! Entities, relationships, authors and versions, with their identity rules
//! and field validation. These are plain serde types; persistence lives in
//! `store`, sequencing in `ledger`.

mod author;
mod entity;
mod identifiers;
mod keys;
mod names;
mod relationship;
pub mod validation;
mod version;

pub use author::Author;
pub use entity::{Attributes, Entity, NewEntity};
pub use identifiers::{Attribution, Contact, ContactKind, ExternalIdentifier, IdentifierScheme};
pub use keys::{
    new_relationship_id, relationship_id_suffix, EntityKey, EntitySubType, EntityType, SubjectRef,
    SubjectType, ENTITY_ID_PREFIX, HISTORY_SEGMENT, RELATIONSHIP_ID_PREFIX,
};
pub use names::{Name, NameKind, NameParts};
pub use relationship::{NewRelationship, Relationship, RelationshipType};
pub use validation::{FieldError, ValidationErrors};
pub use version::{Version, VersionSummary};
