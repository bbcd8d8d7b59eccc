//! Service wiring
//!
//! Opening a storage root:
//! 1. Create the layout directories
//! 2. Roll forward writes interrupted by a crash
//! 3. Share one store between the publication and search services

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::config::{Config, ConfigResult};
use crate::ledger::RecoveryReport;
use crate::migration::{EngineOptions, MigrationEngine, TrackerKind};
use crate::publication::{PublicationResult, PublicationService};
use crate::search::SearchService;
use crate::store::RecordStore;

#[derive(Clone)]
pub struct Services {
    pub store: RecordStore,
    pub publication: Arc<PublicationService>,
    pub search: Arc<SearchService>,
}

impl Services {
    /// Opens the root with the default page size.
    pub fn open(root: impl Into<PathBuf>) -> PublicationResult<(Self, RecoveryReport)> {
        Self::open_with(root, crate::search::DEFAULT_MAX_PAGE_SIZE)
    }

    pub fn open_with(
        root: impl Into<PathBuf>,
        max_page_size: usize,
    ) -> PublicationResult<(Self, RecoveryReport)> {
        let store = RecordStore::open(root)?;
        let publication = PublicationService::new(store.clone());
        let report = publication.recover()?;
        let search = SearchService::with_max_page_size(store.clone(), max_page_size);
        info!(root = %store.root().display(), "storage opened");

        Ok((
            Self {
                store,
                publication: Arc::new(publication),
                search: Arc::new(search),
            },
            report,
        ))
    }

    pub fn from_config(config: &Config) -> PublicationResult<(Self, RecoveryReport)> {
        Self::open_with(&config.storage_root, config.max_page_size)
    }

    /// Migration engine over these services with the given tracker.
    pub fn migration_engine(
        &self,
        migrations_root: impl Into<PathBuf>,
        tracker: TrackerKind,
        options: EngineOptions,
    ) -> MigrationEngine {
        MigrationEngine::new(
            migrations_root,
            Arc::clone(&self.publication),
            Arc::clone(&self.search),
            tracker.open(self.store.root()),
        )
        .with_options(options)
    }

    pub fn engine_from_config(&self, config: &Config) -> ConfigResult<MigrationEngine> {
        let tracker = config.tracker_kind()?;
        Ok(self.migration_engine(
            &config.migrations_root,
            tracker,
            EngineOptions {
                commit_batch_size: config.commit_batch_size,
                commit_batch_threshold: config.commit_batch_threshold,
            },
        ))
    }
}
