//! Execution context handed to a migration procedure
//!
//! Gives the procedure read access to files in its own folder, the search
//! and publication services, the normalization boundary, and a log. Every
//! write made through the context is attributed to the migration's author
//! and change description.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use tracing::info;

use super::discovery::Migration;
use super::errors::{MigrationError, MigrationResult};
use crate::model::{
    Entity, EntityKey, NewEntity, NewRelationship, Relationship,
};
use crate::normalize::{NormalizationRequest, NormalizedCandidate, Normalizer};
use crate::publication::PublicationService;
use crate::search::SearchService;

pub struct MigrationContext {
    migration: Migration,
    author_id: String,
    change_description: String,
    publication: Arc<PublicationService>,
    search: Arc<SearchService>,
    normalizer: Arc<dyn Normalizer>,
    logs: Mutex<Vec<String>>,
}

impl MigrationContext {
    pub fn new(
        migration: Migration,
        publication: Arc<PublicationService>,
        search: Arc<SearchService>,
        normalizer: Arc<dyn Normalizer>,
    ) -> Self {
        let author_id = migration.author_id();
        let change_description = migration.change_description();
        Self {
            migration,
            author_id,
            change_description,
            publication,
            search,
            normalizer,
            logs: Mutex::new(Vec::new()),
        }
    }

    pub fn migration(&self) -> &Migration {
        &self.migration
    }

    pub fn author_id(&self) -> &str {
        &self.author_id
    }

    pub fn change_description(&self) -> &str {
        &self.change_description
    }

    pub fn publication(&self) -> &PublicationService {
        &self.publication
    }

    pub fn search(&self) -> &SearchService {
        &self.search
    }

    // ===== Folder files =====

    /// Resolves `relative` inside the migration folder. Absolute paths and
    /// `..` segments are rejected.
    pub fn resolve(&self, relative: &str) -> MigrationResult<PathBuf> {
        let path = Path::new(relative);
        let escapes = path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if relative.is_empty() || escapes {
            return Err(MigrationError::data(
                relative,
                "path must stay inside the migration folder",
            ));
        }
        Ok(self.migration.folder.join(path))
    }

    pub fn read_text(&self, relative: &str) -> MigrationResult<String> {
        let path = self.resolve(relative)?;
        fs::read_to_string(&path).map_err(|e| MigrationError::data(relative, e))
    }

    pub fn read_json<T: DeserializeOwned>(&self, relative: &str) -> MigrationResult<T> {
        let text = self.read_text(relative)?;
        serde_json::from_str(&text).map_err(|e| MigrationError::data(relative, e))
    }

    /// Reads a headered CSV file into rows of `T`.
    pub fn read_csv<T: DeserializeOwned>(&self, relative: &str) -> MigrationResult<Vec<T>> {
        let path = self.resolve(relative)?;
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&path)
            .map_err(|e| MigrationError::data(relative, e))?;
        reader
            .deserialize()
            .collect::<Result<Vec<T>, _>>()
            .map_err(|e| MigrationError::data(relative, e))
    }

    // ===== Log =====

    pub fn log(&self, line: impl Into<String>) {
        let line = line.into();
        info!(migration = %self.migration.full_name, line = %line, "migration log");
        if let Ok(mut logs) = self.logs.lock() {
            logs.push(line);
        }
    }

    pub fn logs(&self) -> Vec<String> {
        self.logs.lock().map(|l| l.clone()).unwrap_or_default()
    }

    // ===== Normalization =====

    pub fn normalize(&self, request: &NormalizationRequest) -> MigrationResult<NormalizedCandidate> {
        Ok(self.normalizer.normalize(request)?)
    }

    // ===== Publication, attributed to the migration =====

    pub fn create_entity(&self, input: NewEntity) -> MigrationResult<Entity> {
        Ok(self
            .publication
            .create_entity(input, &self.author_id, &self.change_description)?)
    }

    pub fn update_entity(&self, entity: Entity) -> MigrationResult<Entity> {
        Ok(self
            .publication
            .update_entity(entity, &self.author_id, &self.change_description)?)
    }

    pub fn delete_entity(&self, key: &EntityKey) -> MigrationResult<bool> {
        Ok(self.publication.delete_entity(key)?)
    }

    pub fn create_relationship(&self, input: NewRelationship) -> MigrationResult<Relationship> {
        Ok(self
            .publication
            .create_relationship(input, &self.author_id, &self.change_description)?)
    }

    pub fn update_relationship(&self, relationship: Relationship) -> MigrationResult<Relationship> {
        Ok(self.publication.update_relationship(
            relationship,
            &self.author_id,
            &self.change_description,
        )?)
    }

    pub fn delete_relationship(&self, id: &str) -> MigrationResult<bool> {
        Ok(self.publication.delete_relationship(id)?)
    }

    /// Current entity, `None` if absent.
    pub fn find_entity(&self, key: &EntityKey) -> MigrationResult<Option<Entity>> {
        Ok(self.publication.store().try_get::<Entity>(key)?)
    }
}
