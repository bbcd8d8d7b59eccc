//! CLI module for civicdb
//!
//! Provides command-line interface for:
//! - init: Create the storage layout and tracker baseline
//! - serve: Run the read-only HTTP API
//! - migrate: List, run and roll back migrations
//! - entity: Inspect an entity and its history
//! - recover: Roll forward interrupted writes

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command, EntityAction, MigrateAction, RunArgs};
pub use commands::{entity, init, migrate, recover, run, run_command, serve};
pub use errors::{CliError, CliResult};
pub use io::{write_error, write_response};
