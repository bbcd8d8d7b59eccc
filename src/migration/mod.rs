//! Migration Engine
//!
//! Ordered, named, run-at-most-once batch changes to the record store.
//! A migration is a folder `NNN-descriptive-name/` under the migrations root;
//! its work runs through the Publication Service, so every change it makes
//! is versioned like any other edit. A Migration Log entry proves it ran.

mod context;
mod discovery;
mod engine;
mod errors;
mod log;
mod manifest;
mod procedure;
mod steps;
pub mod tracker;

pub use context::MigrationContext;
pub use discovery::{discover, Discovery, InvalidMigration, Migration};
pub use engine::{
    BatchReport, EngineOptions, MigrationEngine, MigrationReport, MigrationStatus, RunOptions,
    DEFAULT_COMMIT_BATCH_SIZE, DEFAULT_COMMIT_BATCH_THRESHOLD,
};
pub use errors::{MigrationError, MigrationResult};
pub use log::{
    compute_diffs, render_diffs, FileDiff, MigrationLogStore, MigrationMetadata, MigrationStats,
    RunStatus, CHANGES_DIFF_FILE, CHANGES_JSON_FILE, LOGS_FILE, METADATA_FILE,
};
pub use manifest::{MigrationManifest, MANIFEST_FILE, README_FILE};
pub use procedure::{MigrationProcedure, ProcedureRegistry};
pub use steps::{Step, StepsProcedure};
pub use tracker::{Change, ChangeStatus, ChangeTracker, TrackerError, TrackerKind};
