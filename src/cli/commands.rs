//! CLI command implementations
//!
//! Every command:
//! 1. Loads and validates the config
//! 2. Installs logging
//! 3. Opens the storage root (running crash recovery)
//! 4. Prints one JSON response to stdout

use std::path::Path;

use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::config::Config;
use crate::http_server::HttpServer;
use crate::migration::{MigrationEngine, MigrationStatus, RunOptions};
use crate::model::EntityKey;
use crate::observability::init_logging;
use crate::search::SearchError;
use crate::services::Services;

use super::args::{Command, EntityAction, MigrateAction, RunArgs};
use super::errors::{CliError, CliResult};
use super::io::write_response;

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(&cli.config, cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(config_path: &Path, cmd: Command) -> CliResult<()> {
    let config = load(config_path)?;
    match cmd {
        Command::Init => init(&config),
        Command::Serve { port } => serve(&config, port),
        Command::Migrate { action } => migrate(&config, action),
        Command::Entity { action } => entity(&config, action),
        Command::Recover => recover(&config),
    }
}

fn load(config_path: &Path) -> CliResult<Config> {
    let config = Config::load(config_path)?;
    init_logging(&config.log_level, config.log_format()?);
    Ok(config)
}

fn open(config: &Config) -> CliResult<Services> {
    let (services, _report) = Services::from_config(config)?;
    Ok(services)
}

fn engine(config: &Config) -> CliResult<MigrationEngine> {
    Ok(open(config)?.engine_from_config(config)?)
}

/// Create the layout and record the initial tracker baseline.
pub fn init(config: &Config) -> CliResult<()> {
    let services = open(config)?;
    let engine = services.engine_from_config(config)?;
    engine.tracker().init()?;
    std::fs::create_dir_all(&config.migrations_root)?;

    info!(root = %config.storage_root.display(), tracker = engine.tracker().name(), "storage initialized");
    write_response(&json!({
        "initialized": true,
        "storage_root": config.storage_root,
        "migrations_root": config.migrations_root,
        "tracker": engine.tracker().name(),
    }))
}

/// Serve the read API until the process is stopped.
pub fn serve(config: &Config, port: Option<u16>) -> CliResult<()> {
    let services = open(config)?;

    let mut http = config.http.clone();
    if let Some(port) = port {
        http.port = port;
    }
    let server = HttpServer::new(http, services.search);

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::Serve(format!("failed to create tokio runtime: {}", e)))?;
    rt.block_on(async { server.start().await })
        .map_err(|e| CliError::Serve(e.to_string()))
}

#[derive(Debug, Serialize)]
struct MigrationRow {
    name: String,
    date: String,
    description: String,
    applied: bool,
}

#[derive(Debug, Serialize)]
struct InvalidRow {
    name: String,
    errors: Vec<String>,
}

pub fn migrate(config: &Config, action: MigrateAction) -> CliResult<()> {
    let engine = engine(config)?;
    match action {
        MigrateAction::List => {
            let discovery = engine.discover()?;
            let applied = engine.applied()?;
            let migrations: Vec<MigrationRow> = discovery
                .valid
                .iter()
                .map(|m| MigrationRow {
                    name: m.full_name.clone(),
                    date: m.manifest.date.clone(),
                    description: m.manifest.description.clone(),
                    applied: applied.contains(&m.full_name),
                })
                .collect();
            let invalid: Vec<InvalidRow> = discovery
                .invalid
                .into_iter()
                .map(|m| InvalidRow {
                    name: m.name,
                    errors: m.errors,
                })
                .collect();
            write_response(&json!({ "migrations": migrations, "invalid": invalid }))
        }
        MigrateAction::Pending => {
            let pending: Vec<String> = engine.pending()?.into_iter().map(|m| m.full_name).collect();
            write_response(&json!({ "pending": pending }))
        }
        MigrateAction::Run(args) => run_migrations(&engine, args),
        MigrateAction::Rollback { name } => {
            let reverted = engine.rollback(&name)?;
            write_response(&json!({ "rolled_back": name, "commits_reverted": reverted }))
        }
    }
}

fn run_migrations(engine: &MigrationEngine, args: RunArgs) -> CliResult<()> {
    let options = RunOptions {
        force: args.force,
        dry_run: args.dry_run,
        stop_on_failure: !args.continue_on_failure,
    };

    match args.name {
        Some(name) => {
            let report = engine.run_migration(&name, options)?;
            write_response(&report)?;
            if report.status == MigrationStatus::Failed {
                return Err(CliError::RunFailed(format!(
                    "{}: {}",
                    report.migration,
                    report.error.unwrap_or_default()
                )));
            }
            Ok(())
        }
        None => {
            let batch = engine.run_pending(options)?;
            write_response(&batch)?;
            if batch.has_failures() {
                let failed: Vec<&str> = batch
                    .reports
                    .iter()
                    .filter(|r| r.status == MigrationStatus::Failed)
                    .map(|r| r.migration.as_str())
                    .collect();
                return Err(CliError::RunFailed(failed.join(", ")));
            }
            Ok(())
        }
    }
}

pub fn entity(config: &Config, action: EntityAction) -> CliResult<()> {
    let services = open(config)?;
    match action {
        EntityAction::Get { id } => {
            let key = id.parse::<EntityKey>().map_err(SearchError::from)?;
            write_response(&services.search.get_entity(&key)?)
        }
        EntityAction::Versions { id } => {
            let key = id.parse::<EntityKey>().map_err(SearchError::from)?;
            write_response(&services.search.get_entity_versions(&key)?)
        }
    }
}

/// Opening the storage root runs recovery; this reports what it did.
pub fn recover(config: &Config) -> CliResult<()> {
    let (_services, report) = Services::from_config(config)?;
    write_response(&report)
}
