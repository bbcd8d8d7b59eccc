//! Migration Engine
//!
//! Runs discovered migrations, at most once each:
//! 1. Skip when a Migration Log marks the migration applied (unless forced)
//! 2. Refuse to start unless the change tracker reports a clean state
//! 3. Register the migration's author and run its procedure
//! 4. On failure, record the run under `.migration-failures/` and stop
//! 5. On success, derive statistics and diffs from the tracker, write the
//!    Migration Log, then commit everything (in batches when large)
//!
//! Runs are serialized by an engine-wide lock. The applied set is cached per
//! engine and dropped after every run and rollback.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use super::context::MigrationContext;
use super::discovery::{discover, Discovery, InvalidMigration, Migration};
use super::errors::{MigrationError, MigrationResult};
use super::log::{compute_diffs, MigrationLogStore, MigrationMetadata, MigrationStats, RunStatus};
use super::procedure::ProcedureRegistry;
use super::tracker::{Change, ChangeTracker};
use crate::crash_point::{maybe_crash, points};
use crate::model::Author;
use crate::normalize::{Normalizer, UnavailableNormalizer};
use crate::publication::PublicationService;
use crate::search::SearchService;

pub const DEFAULT_COMMIT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_COMMIT_BATCH_THRESHOLD: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Files per commit when batching
    pub commit_batch_size: usize,
    /// Batching starts above this many changed files
    pub commit_batch_threshold: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            commit_batch_size: DEFAULT_COMMIT_BATCH_SIZE,
            commit_batch_threshold: DEFAULT_COMMIT_BATCH_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub force: bool,
    pub dry_run: bool,
    /// Stop `run_pending` at the first failed migration
    pub stop_on_failure: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            force: false,
            dry_run: false,
            stop_on_failure: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationStatus {
    Completed,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationReport {
    pub migration: String,
    pub status: MigrationStatus,
    pub forced: bool,
    pub dry_run: bool,
    pub duration_seconds: f64,
    pub statistics: MigrationStats,
    pub logs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Tracker commits written
    pub commits: usize,
}

impl MigrationReport {
    fn skipped(migration: &Migration) -> Self {
        Self {
            migration: migration.full_name.clone(),
            status: MigrationStatus::Skipped,
            forced: false,
            dry_run: false,
            duration_seconds: 0.0,
            statistics: MigrationStats::default(),
            logs: Vec::new(),
            error: None,
            commits: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub reports: Vec<MigrationReport>,
    pub invalid: Vec<InvalidMigration>,
    pub stopped_early: bool,
}

impl BatchReport {
    pub fn count(&self, status: MigrationStatus) -> usize {
        self.reports.iter().filter(|r| r.status == status).count()
    }

    pub fn has_failures(&self) -> bool {
        self.count(MigrationStatus::Failed) > 0
    }
}

pub struct MigrationEngine {
    migrations_root: PathBuf,
    publication: Arc<PublicationService>,
    search: Arc<SearchService>,
    normalizer: Arc<dyn Normalizer>,
    tracker: Box<dyn ChangeTracker>,
    registry: ProcedureRegistry,
    logs: MigrationLogStore,
    options: EngineOptions,
    run_lock: Mutex<()>,
    applied_cache: Mutex<Option<BTreeSet<String>>>,
}

impl MigrationEngine {
    pub fn new(
        migrations_root: impl Into<PathBuf>,
        publication: Arc<PublicationService>,
        search: Arc<SearchService>,
        tracker: Box<dyn ChangeTracker>,
    ) -> Self {
        let logs = MigrationLogStore::new(publication.store().layout().clone());
        Self {
            migrations_root: migrations_root.into(),
            publication,
            search,
            normalizer: Arc::new(UnavailableNormalizer),
            tracker,
            registry: ProcedureRegistry::new(),
            logs,
            options: EngineOptions::default(),
            run_lock: Mutex::new(()),
            applied_cache: Mutex::new(None),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_normalizer(mut self, normalizer: Arc<dyn Normalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_registry(mut self, registry: ProcedureRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry_mut(&mut self) -> &mut ProcedureRegistry {
        &mut self.registry
    }

    pub fn tracker(&self) -> &dyn ChangeTracker {
        self.tracker.as_ref()
    }

    pub fn log_store(&self) -> &MigrationLogStore {
        &self.logs
    }

    pub fn migrations_root(&self) -> &PathBuf {
        &self.migrations_root
    }

    // ===== Discovery and applicability =====

    pub fn discover(&self) -> MigrationResult<Discovery> {
        discover(&self.migrations_root)
    }

    /// Applied migration names, from the cache when warm.
    pub fn applied(&self) -> MigrationResult<BTreeSet<String>> {
        let mut cache = self.cache();
        if let Some(applied) = cache.as_ref() {
            return Ok(applied.clone());
        }
        let applied = self.logs.applied_names()?;
        *cache = Some(applied.clone());
        Ok(applied)
    }

    pub fn is_applied(&self, name: &str) -> MigrationResult<bool> {
        Ok(self.applied()?.contains(name))
    }

    /// Valid migrations not yet applied, ascending.
    pub fn pending(&self) -> MigrationResult<Vec<Migration>> {
        let applied = self.applied()?;
        Ok(self
            .discover()?
            .valid
            .into_iter()
            .filter(|m| !applied.contains(&m.full_name))
            .collect())
    }

    /// Looks a migration up by full name or 3-digit prefix.
    pub fn find(&self, name: &str) -> MigrationResult<Migration> {
        let discovery = self.discover()?;
        if let Some(migration) = discovery.find(name) {
            return Ok(migration.clone());
        }
        match discovery.find_invalid(name) {
            Some(invalid) => Err(MigrationError::Invalid {
                name: invalid.name.clone(),
                errors: invalid.errors.clone(),
            }),
            None => Err(MigrationError::NotFound(name.to_string())),
        }
    }

    fn cache(&self) -> MutexGuard<'_, Option<BTreeSet<String>>> {
        self.applied_cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn invalidate_cache(&self) {
        *self.cache() = None;
    }

    fn lock_runs(&self) -> MutexGuard<'_, ()> {
        self.run_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ===== Running =====

    pub fn run_migration(&self, name: &str, options: RunOptions) -> MigrationResult<MigrationReport> {
        let _guard = self.lock_runs();
        let migration = self.find(name)?;
        let report = self.execute(&migration, options);
        self.invalidate_cache();
        report
    }

    /// Runs every valid migration in prefix order. Applied ones are skipped
    /// unless forced.
    pub fn run_pending(&self, options: RunOptions) -> MigrationResult<BatchReport> {
        let _guard = self.lock_runs();
        let discovery = self.discover()?;
        let mut batch = BatchReport {
            invalid: discovery.invalid.clone(),
            ..Default::default()
        };

        for migration in &discovery.valid {
            let result = self.execute(migration, options);
            self.invalidate_cache();
            let report = result?;
            let failed = report.status == MigrationStatus::Failed;
            batch.reports.push(report);

            if failed {
                if options.stop_on_failure {
                    batch.stopped_early = true;
                    break;
                }
                // Later migrations need a clean state
                if !options.dry_run {
                    let leftovers = self.tracker.changes()?;
                    self.tracker.discard(&leftovers)?;
                }
            }
        }

        info!(
            completed = batch.count(MigrationStatus::Completed),
            skipped = batch.count(MigrationStatus::Skipped),
            failed = batch.count(MigrationStatus::Failed),
            invalid = batch.invalid.len(),
            "migration batch finished"
        );
        Ok(batch)
    }

    fn execute(&self, migration: &Migration, options: RunOptions) -> MigrationResult<MigrationReport> {
        let name = migration.full_name.as_str();

        if !options.force && self.is_applied(name)? {
            info!(migration = name, "migration already applied, skipping");
            return Ok(MigrationReport::skipped(migration));
        }

        let dirty = self.tracker.changes()?;
        if !dirty.is_empty() {
            return Err(MigrationError::PreconditionFailed(format!(
                "{} uncommitted change(s) in the storage root (first: {}); commit or discard them before running {}",
                dirty.len(),
                dirty[0].path,
                name
            )));
        }

        let procedure = self.registry.resolve(migration)?;
        let content_digest = migration.content_digest()?;

        info!(
            migration = name,
            forced = options.force,
            dry_run = options.dry_run,
            "running migration"
        );
        let started = Instant::now();
        let executed_at = Utc::now();

        self.publication.register_author(Author {
            id: migration.author_id(),
            name: format!("Migration {}", name),
            contact: Some(migration.manifest.author.clone()),
        })?;

        let ctx = MigrationContext::new(
            migration.clone(),
            Arc::clone(&self.publication),
            Arc::clone(&self.search),
            Arc::clone(&self.normalizer),
        );
        let outcome = procedure.run(&ctx);
        maybe_crash(points::MIGRATION_AFTER_PROCEDURE);

        let logs = ctx.logs();
        let changes = self.tracker.changes()?;
        let statistics = MigrationStats::from_changes(&changes);
        let duration_seconds = started.elapsed().as_secs_f64();

        let metadata = |status: RunStatus| MigrationMetadata {
            migration_name: name.to_string(),
            author: migration.manifest.author.clone(),
            date: migration.manifest.date.clone(),
            description: migration.manifest.description.clone(),
            executed_at,
            duration_seconds,
            status,
            forced: options.force,
            statistics,
            content_digest: content_digest.clone(),
        };
        let mut report = MigrationReport {
            migration: name.to_string(),
            status: MigrationStatus::Completed,
            forced: options.force,
            dry_run: options.dry_run,
            duration_seconds,
            statistics,
            logs: logs.clone(),
            error: None,
            commits: 0,
        };

        if let Err(e) = outcome {
            let message = e.to_string();
            error!(migration = name, error = %message, "migration failed");
            let record = self.logs.write_failure(&metadata(RunStatus::Failed), &message, &logs)?;
            if options.dry_run {
                self.tracker.discard(&changes)?;
            } else {
                warn!(
                    migration = name,
                    changes = changes.len(),
                    record = %record.display(),
                    "failed migration left uncommitted changes"
                );
            }
            report.status = MigrationStatus::Failed;
            report.error = Some(message);
            return Ok(report);
        }

        if options.dry_run {
            self.tracker.discard(&changes)?;
            info!(
                migration = name,
                files = statistics.files_changed,
                "dry run finished, changes discarded"
            );
            return Ok(report);
        }

        let diffs = compute_diffs(self.tracker.as_ref(), self.publication.store().layout(), &changes)?;
        let log_paths = self.logs.write(&metadata(RunStatus::Completed), &diffs, &logs)?;
        maybe_crash(points::MIGRATION_AFTER_LOG);

        report.commits = self.commit(name, &changes, log_paths)?;
        info!(
            migration = name,
            entities_created = statistics.entities_created,
            entities_updated = statistics.entities_updated,
            versions_created = statistics.versions_created,
            commits = report.commits,
            duration_seconds,
            "migration completed"
        );
        Ok(report)
    }

    /// Commits data changes and the log, log files in the last batch.
    fn commit(&self, name: &str, changes: &[Change], log_paths: Vec<String>) -> MigrationResult<usize> {
        let log_set: BTreeSet<&str> = log_paths.iter().map(String::as_str).collect();
        let data: Vec<String> = changes
            .iter()
            .map(|c| c.path.clone())
            .filter(|p| !log_set.contains(p.as_str()))
            .collect();

        let total = data.len() + log_paths.len();
        let batches: Vec<Vec<String>> = if total > self.options.commit_batch_threshold && !data.is_empty() {
            let size = self.options.commit_batch_size.max(1);
            let mut batches: Vec<Vec<String>> = data.chunks(size).map(|c| c.to_vec()).collect();
            if let Some(last) = batches.last_mut() {
                last.extend(log_paths);
            }
            batches
        } else {
            let mut all = data;
            all.extend(log_paths);
            vec![all]
        };

        let count = batches.len();
        for (index, paths) in batches.iter().enumerate() {
            let message = if count > 1 {
                format!("Migration: {} (batch {}/{})", name, index + 1, count)
            } else {
                format!("Migration: {}", name)
            };
            self.tracker.commit(paths, &message, Some(name))?;
            if index + 1 < count {
                maybe_crash(points::MIGRATION_BETWEEN_BATCHES);
            }
        }
        Ok(count)
    }

    // ===== Rollback =====

    /// Reverts every tracker commit made for an applied migration, which
    /// also removes its log.
    pub fn rollback(&self, name: &str) -> MigrationResult<usize> {
        let _guard = self.lock_runs();
        let migration = self.find(name)?;
        let name = migration.full_name.as_str();

        if !self.is_applied(name)? {
            return Err(MigrationError::NotApplied(name.to_string()));
        }
        let dirty = self.tracker.changes()?;
        if !dirty.is_empty() {
            return Err(MigrationError::PreconditionFailed(format!(
                "{} uncommitted change(s) in the storage root; commit or discard them before rolling back {}",
                dirty.len(),
                name
            )));
        }

        let result = self.tracker.revert_migration(name);
        self.invalidate_cache();
        let reverted = result?;
        info!(migration = name, commits = reverted, "migration rolled back");
        Ok(reverted)
    }
}
