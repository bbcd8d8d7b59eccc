//! Search Service
//!
//! Read-only views over the record store. Never locks; results are ordered
//! by canonical id and paginated after filtering, so `total` always counts
//! every match.

use crate::ledger::VersionLedger;
use crate::model::{Author, Entity, EntityKey, Relationship, SubjectRef, Version};
use crate::store::RecordStore;

use super::errors::{SearchError, SearchResult};
use super::filters::{EntityFilter, RelationshipFilter};
use super::query::{clamp_limit, EntityQuery, Page, RelationshipQuery, DEFAULT_MAX_PAGE_SIZE};

#[derive(Debug, Clone)]
pub struct SearchService {
    store: RecordStore,
    ledger: VersionLedger,
    max_page_size: usize,
}

impl SearchService {
    pub fn new(store: RecordStore) -> Self {
        Self::with_max_page_size(store, DEFAULT_MAX_PAGE_SIZE)
    }

    pub fn with_max_page_size(store: RecordStore, max_page_size: usize) -> Self {
        let ledger = VersionLedger::new(store.clone());
        Self {
            store,
            ledger,
            max_page_size: max_page_size.max(1),
        }
    }

    pub fn max_page_size(&self) -> usize {
        self.max_page_size
    }

    pub fn search_entities(&self, query: &EntityQuery) -> SearchResult<Page<Entity>> {
        let filter = EntityFilter {
            needle: query
                .query
                .as_deref()
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .map(str::to_lowercase),
            entity_type: query.entity_type,
            sub_type: query.sub_type,
            attributes: query.attributes.clone(),
        };
        let limit = clamp_limit(query.limit, self.max_page_size);
        let (results, total) =
            self.store
                .list::<Entity, _>(|e| filter.matches(e), Some(limit), query.offset)?;
        Ok(Page {
            results,
            total,
            limit,
            offset: query.offset,
        })
    }

    pub fn search_relationships(&self, query: &RelationshipQuery) -> SearchResult<Page<Relationship>> {
        let filter = RelationshipFilter {
            relationship_type: query.relationship_type,
            source: query.source.clone(),
            target: query.target.clone(),
            active_on: query.active_on,
            currently_active: query.currently_active,
        };
        let limit = clamp_limit(query.limit, self.max_page_size);
        let (results, total) = self.store.list::<Relationship, _>(
            |r| filter.matches(r),
            Some(limit),
            query.offset,
        )?;
        Ok(Page {
            results,
            total,
            limit,
            offset: query.offset,
        })
    }

    pub fn get_entity(&self, key: &EntityKey) -> SearchResult<Entity> {
        Ok(self.store.get::<Entity>(key)?)
    }

    /// Looks an entity up by its canonical id string.
    pub fn get_entity_by_id(&self, id: &str) -> SearchResult<Entity> {
        let key: EntityKey = id.parse()?;
        self.get_entity(&key)
    }

    pub fn get_relationship(&self, id: &str) -> SearchResult<Relationship> {
        Ok(self.store.get::<Relationship>(&id.to_string())?)
    }

    pub fn get_author(&self, id: &str) -> SearchResult<Author> {
        Ok(self.store.get::<Author>(&id.to_string())?)
    }

    pub fn get_entity_versions(&self, key: &EntityKey) -> SearchResult<Vec<Version>> {
        self.versions(&SubjectRef::Entity(key.clone()), "Entity")
    }

    pub fn get_relationship_versions(&self, id: &str) -> SearchResult<Vec<Version>> {
        self.versions(&SubjectRef::Relationship(id.to_string()), "Relationship")
    }

    pub fn count_entities(&self) -> SearchResult<usize> {
        Ok(self.store.count::<Entity>()?)
    }

    pub fn count_relationships(&self) -> SearchResult<usize> {
        Ok(self.store.count::<Relationship>()?)
    }

    fn versions(&self, subject: &SubjectRef, kind: &'static str) -> SearchResult<Vec<Version>> {
        let versions = match self.ledger.list_versions(subject) {
            Ok(versions) => versions,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        if versions.is_empty() {
            return Err(SearchError::NotFound {
                kind,
                id: subject.id(),
            });
        }
        Ok(versions)
    }
}
