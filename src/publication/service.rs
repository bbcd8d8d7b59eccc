//! Publication Service
//!
//! The only component that mutates records. Every create or update:
//! 1. Validates the input and the author
//! 2. Takes the subject's lock
//! 3. Computes the next version number from the ledger
//! 4. Stamps the record and diffs it against the previous state
//! 5. Commits: intent marker, snapshot, record, marker removal
//!
//! A failure before the snapshot is written persists nothing. Once the
//! snapshot exists the version is committed: if the record cannot be
//! replaced the caller gets `PendingRecovery` and the intent marker stays
//! for `recover()`.

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use super::errors::{PublicationError, PublicationResult};
use super::locks::KeyLocks;
use crate::crash_point::{maybe_crash, points};
use crate::diff::{diff_values, FieldChange};
use crate::ledger::{RecoveryReport, VersionLedger, WriteIntent};
use crate::model::{
    new_relationship_id, Author, Entity, EntityKey, NewEntity, NewRelationship, Relationship,
    FieldError, SubjectRef, ValidationErrors, Version, VersionSummary,
};
use crate::store::{Record, RecordStore, StoreError};

/// Fields excluded from update diffs; they change on every write.
const STAMP_FIELDS: &[&str] = &["version_summary", "created_at"];

#[derive(Debug)]
pub struct PublicationService {
    store: RecordStore,
    ledger: VersionLedger,
    locks: KeyLocks,
}

impl PublicationService {
    pub fn new(store: RecordStore) -> Self {
        let ledger = VersionLedger::new(store.clone());
        Self {
            store,
            ledger,
            locks: KeyLocks::new(),
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn ledger(&self) -> &VersionLedger {
        &self.ledger
    }

    // ===== Authors =====

    /// Registers an author. Identical re-registration is a no-op; different
    /// content under an existing id is a conflict.
    pub fn register_author(&self, author: Author) -> PublicationResult<Author> {
        author.validate()?;
        let lock_key = format!("author:{}", author.id);
        self.locks.with_lock(&lock_key, || -> PublicationResult<Author> {
            match self.store.try_get::<Author>(&author.id)? {
                Some(existing) if existing == author => Ok(existing),
                Some(_) => Err(PublicationError::Conflict(format!(
                    "author '{}' already exists with different details",
                    author.id
                ))),
                None => {
                    self.store.put(&author)?;
                    info!(author = %author.id, "author registered");
                    Ok(author)
                }
            }
        })
    }

    pub fn get_author(&self, id: &str) -> PublicationResult<Author> {
        Ok(self.store.get::<Author>(&id.to_string())?)
    }

    fn require_author(&self, author_id: &str, description: &str) -> PublicationResult<()> {
        let mut errors = ValidationErrors::new();
        if !self.store.exists::<Author>(&author_id.to_string())? {
            errors.push(FieldError::new(
                "author_id",
                format!("unknown author '{}'", author_id),
            ));
        }
        if description.trim().is_empty() {
            errors.push(FieldError::missing("change_description"));
        }
        Ok(errors.into_result()?)
    }

    // ===== Entities =====

    pub fn get_entity(&self, key: &EntityKey) -> PublicationResult<Entity> {
        Ok(self.store.get::<Entity>(key)?)
    }

    pub fn create_entity(
        &self,
        input: NewEntity,
        author_id: &str,
        description: &str,
    ) -> PublicationResult<Entity> {
        input.validate()?;
        self.require_author(author_id, description)?;

        let key = input.key();
        let subject = SubjectRef::Entity(key.clone());
        self.locks.with_lock(&key.id(), || -> PublicationResult<Entity> {
            if self.store.exists::<Entity>(&key)? {
                return Err(PublicationError::Conflict(format!(
                    "entity '{}' already exists",
                    key
                )));
            }

            let summary = self.next_summary(&subject, author_id, description)?;
            let entity = input.into_entity(summary);
            let changes = self.recreate_changes(&subject, &entity)?;
            self.commit(&subject, &entity, changes)?;

            info!(
                entity = %key,
                version = entity.version_summary.version_number,
                author = author_id,
                "entity created"
            );
            Ok(entity)
        })
    }

    /// Replaces an existing entity's content. The key inside `entity`
    /// selects the record; its version stamp and creation time are ignored.
    pub fn update_entity(
        &self,
        entity: Entity,
        author_id: &str,
        description: &str,
    ) -> PublicationResult<Entity> {
        entity.validate()?;
        self.require_author(author_id, description)?;

        let key = entity.key();
        let subject = SubjectRef::Entity(key.clone());
        self.locks.with_lock(&key.id(), || -> PublicationResult<Entity> {
            let current = self
                .store
                .try_get::<Entity>(&key)?
                .ok_or_else(|| PublicationError::not_found("Entity", key.id()))?;

            let mut updated = entity;
            updated.version_summary = self.next_summary(&subject, author_id, description)?;
            updated.created_at = current.created_at;

            let changes = diff_unstamped(&current, &updated)?;
            self.commit(&subject, &updated, changes)?;

            info!(
                entity = %key,
                version = updated.version_summary.version_number,
                author = author_id,
                "entity updated"
            );
            Ok(updated)
        })
    }

    /// Removes the current record; version history is kept.
    pub fn delete_entity(&self, key: &EntityKey) -> PublicationResult<bool> {
        self.locks.with_lock(&key.id(), || -> PublicationResult<bool> {
            let removed = self.store.delete::<Entity>(key)?;
            if removed {
                info!(entity = %key, "entity deleted");
            }
            Ok(removed)
        })
    }

    pub fn get_entity_versions(&self, key: &EntityKey) -> PublicationResult<Vec<Version>> {
        self.versions_of(&SubjectRef::Entity(key.clone()))
    }

    // ===== Relationships =====

    pub fn get_relationship(&self, id: &str) -> PublicationResult<Relationship> {
        Ok(self.store.get::<Relationship>(&id.to_string())?)
    }

    pub fn create_relationship(
        &self,
        input: NewRelationship,
        author_id: &str,
        description: &str,
    ) -> PublicationResult<Relationship> {
        input.validate()?;
        self.require_author(author_id, description)?;

        let id = new_relationship_id();
        let subject = SubjectRef::Relationship(id.clone());
        let source = canonical_entity_id(&input.source_entity_id)?;
        let target = canonical_entity_id(&input.target_entity_id)?;
        let keys = [source.as_str(), target.as_str(), id.as_str()];
        // Endpoints stay locked through the commit; a concurrent delete
        // waits until the relationship is written
        self.locks.with_locks(&keys, || -> PublicationResult<Relationship> {
            self.resolve_endpoints(&source, &target)?;
            let summary = self.next_summary(&subject, author_id, description)?;
            let relationship = input.into_relationship(id.clone(), summary);
            self.commit(&subject, &relationship, Vec::new())?;

            info!(
                relationship = %id,
                kind = relationship.relationship_type.as_str(),
                source = %relationship.source_entity_id,
                target = %relationship.target_entity_id,
                author = author_id,
                "relationship created"
            );
            Ok(relationship)
        })
    }

    pub fn update_relationship(
        &self,
        relationship: Relationship,
        author_id: &str,
        description: &str,
    ) -> PublicationResult<Relationship> {
        relationship.validate()?;
        self.require_author(author_id, description)?;

        let id = relationship.id.clone();
        let subject = SubjectRef::Relationship(id.clone());
        let source = canonical_entity_id(&relationship.source_entity_id)?;
        let target = canonical_entity_id(&relationship.target_entity_id)?;
        let keys = [source.as_str(), target.as_str(), id.as_str()];
        self.locks.with_locks(&keys, || -> PublicationResult<Relationship> {
            self.resolve_endpoints(&source, &target)?;
            let current = self
                .store
                .try_get::<Relationship>(&id)?
                .ok_or_else(|| PublicationError::not_found("Relationship", id.clone()))?;

            let mut updated = relationship;
            updated.version_summary = self.next_summary(&subject, author_id, description)?;
            updated.created_at = current.created_at;

            let changes = diff_unstamped(&current, &updated)?;
            self.commit(&subject, &updated, changes)?;

            info!(
                relationship = %id,
                version = updated.version_summary.version_number,
                author = author_id,
                "relationship updated"
            );
            Ok(updated)
        })
    }

    pub fn delete_relationship(&self, id: &str) -> PublicationResult<bool> {
        self.locks.with_lock(id, || -> PublicationResult<bool> {
            let removed = self.store.delete::<Relationship>(&id.to_string())?;
            if removed {
                info!(relationship = id, "relationship deleted");
            }
            Ok(removed)
        })
    }

    pub fn get_relationship_versions(&self, id: &str) -> PublicationResult<Vec<Version>> {
        self.versions_of(&SubjectRef::Relationship(id.to_string()))
    }

    // ===== Recovery =====

    /// Completes or discards writes interrupted by a crash.
    pub fn recover(&self) -> PublicationResult<RecoveryReport> {
        let report = self.ledger.roll_forward()?;
        if !report.is_empty() {
            warn!(
                rolled_forward = report.rolled_forward.len(),
                discarded = report.discarded.len(),
                already_complete = report.already_complete.len(),
                "recovered interrupted writes"
            );
        }
        Ok(report)
    }

    // ===== Internals =====

    fn versions_of(&self, subject: &SubjectRef) -> PublicationResult<Vec<Version>> {
        let versions = match self.ledger.list_versions(subject) {
            Ok(versions) => versions,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        if versions.is_empty() {
            let kind = match subject {
                SubjectRef::Entity(_) => "Entity",
                SubjectRef::Relationship(_) => "Relationship",
            };
            return Err(PublicationError::not_found(kind, subject.id()));
        }
        Ok(versions)
    }

    fn next_summary(
        &self,
        subject: &SubjectRef,
        author_id: &str,
        description: &str,
    ) -> PublicationResult<VersionSummary> {
        Ok(VersionSummary {
            version_number: self.ledger.next_version(subject)?,
            author_id: author_id.to_string(),
            change_description: description.to_string(),
            created_at: chrono::Utc::now(),
        })
    }

    /// A re-created entity continues its old history; the first version of a
    /// new key has no changes.
    fn recreate_changes(&self, subject: &SubjectRef, entity: &Entity) -> PublicationResult<Vec<FieldChange>> {
        let previous = entity.version_summary.version_number.saturating_sub(1);
        if previous == 0 {
            return Ok(Vec::new());
        }
        let prior = self.ledger.get_version(subject, previous)?;
        Ok(diff_values(&unstamped(prior.snapshot), &unstamped(to_value(entity)?)))
    }

    fn resolve_endpoints(&self, source: &str, target: &str) -> PublicationResult<()> {
        for (field, id) in [("source_entity_id", source), ("target_entity_id", target)] {
            let key: EntityKey = id.parse()?;
            if !self.store.exists::<Entity>(&key)? {
                return Err(PublicationError::Referential {
                    field,
                    id: id.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Ordered write of an already-stamped record.
    fn commit<R: Record>(
        &self,
        subject: &SubjectRef,
        record: &R,
        changes: Vec<FieldChange>,
    ) -> PublicationResult<()> {
        let snapshot = to_value(record)?;
        let summary: VersionSummary = snapshot
            .get("version_summary")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .ok_or_else(|| StoreError::Serialization("record has no version summary".into()))?;

        let intent = WriteIntent::new(
            subject.subject_type(),
            subject.id(),
            summary.version_number,
            self.ledger.relative_record_path(subject)?,
        );
        self.ledger.begin(&intent)?;
        maybe_crash(points::PUBLISH_AFTER_INTENT);

        if let Err(e) = self.ledger.append_snapshot(subject, &snapshot, &summary, changes) {
            self.ledger.complete(&intent)?;
            return Err(e.into());
        }
        maybe_crash(points::PUBLISH_AFTER_SNAPSHOT);

        // Committed from here on. One retry, then the marker is left for recovery
        if let Err(first) = self.store.put(record) {
            warn!(subject = %subject, version = summary.version_number, error = %first, "record write failed after snapshot, retrying");
            if let Err(source) = self.store.put(record) {
                return Err(PublicationError::PendingRecovery {
                    subject: subject.id(),
                    version: summary.version_number,
                    source,
                });
            }
        }
        maybe_crash(points::PUBLISH_AFTER_RECORD);

        self.ledger.complete(&intent)?;
        Ok(())
    }
}

/// Lock key of a relationship endpoint; matches the entity writers' key.
fn canonical_entity_id(id: &str) -> PublicationResult<String> {
    Ok(id.parse::<EntityKey>()?.id())
}

fn to_value<T: Serialize>(value: &T) -> PublicationResult<Value> {
    serde_json::to_value(value)
        .map_err(|e| PublicationError::Storage(StoreError::Serialization(e.to_string())))
}

fn unstamped(mut value: Value) -> Value {
    if let Value::Object(map) = &mut value {
        for field in STAMP_FIELDS {
            map.remove(*field);
        }
    }
    value
}

fn diff_unstamped<T: Serialize>(before: &T, after: &T) -> PublicationResult<Vec<FieldChange>> {
    Ok(diff_values(&unstamped(to_value(before)?), &unstamped(to_value(after)?)))
}
