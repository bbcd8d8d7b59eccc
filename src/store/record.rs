//! Record kinds the store persists

use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::errors::{StoreError, StoreResult};
use super::layout::{Layout, RecordKind};
use crate::model::validation::is_valid_slug;
use crate::model::{Author, Entity, EntityKey, Relationship};

/// A current-state document addressed by a typed key.
pub trait Record: Serialize + DeserializeOwned {
    type Key;

    const KIND: RecordKind;

    fn key(&self) -> Self::Key;

    /// Canonical key string; listings are ordered by it.
    fn key_string(key: &Self::Key) -> String;

    fn record_path(layout: &Layout, key: &Self::Key) -> StoreResult<PathBuf>;
}

impl Record for Entity {
    type Key = EntityKey;

    const KIND: RecordKind = RecordKind::Entity;

    fn key(&self) -> EntityKey {
        Entity::key(self)
    }

    fn key_string(key: &EntityKey) -> String {
        key.id()
    }

    fn record_path(layout: &Layout, key: &EntityKey) -> StoreResult<PathBuf> {
        Ok(layout.entity_path(key))
    }
}

impl Record for Relationship {
    type Key = String;

    const KIND: RecordKind = RecordKind::Relationship;

    fn key(&self) -> String {
        self.id.clone()
    }

    fn key_string(key: &String) -> String {
        key.clone()
    }

    fn record_path(layout: &Layout, key: &String) -> StoreResult<PathBuf> {
        layout
            .relationship_path(key)
            .ok_or_else(|| StoreError::not_found(RecordKind::Relationship.label(), key.clone()))
    }
}

impl Record for Author {
    type Key = String;

    const KIND: RecordKind = RecordKind::Author;

    fn key(&self) -> String {
        self.id.clone()
    }

    fn key_string(key: &String) -> String {
        key.clone()
    }

    fn record_path(layout: &Layout, key: &String) -> StoreResult<PathBuf> {
        if !is_valid_slug(key) {
            return Err(StoreError::not_found(RecordKind::Author.label(), key.clone()));
        }
        Ok(layout.author_path(key))
    }
}
