//! CLI argument definitions using clap
//!
//! Commands:
//! - civicdb init
//! - civicdb serve [--port N]
//! - civicdb migrate list|pending|run|rollback
//! - civicdb entity get|versions <id>
//! - civicdb recover

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_FILE;

/// civicdb - versioned public-interest records with auditable migrations
#[derive(Parser, Debug)]
#[command(name = "civicdb")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the storage layout and record the initial baseline
    Init,

    /// Serve the read-only HTTP API
    Serve {
        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Discover, run and roll back migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },

    /// Inspect entities
    Entity {
        #[command(subcommand)]
        action: EntityAction,
    },

    /// Roll forward writes interrupted by a crash
    Recover,
}

#[derive(Subcommand, Debug)]
pub enum MigrateAction {
    /// List every discovered migration with its state
    List,

    /// List valid migrations not yet applied
    Pending,

    /// Run one migration, or every pending one
    Run(RunArgs),

    /// Revert an applied migration
    Rollback {
        /// Full name or 3-digit prefix
        name: String,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Run only this migration (full name or 3-digit prefix)
    #[arg(long)]
    pub name: Option<String>,

    /// Re-run even if already applied
    #[arg(long)]
    pub force: bool,

    /// Run, report, then discard every change
    #[arg(long)]
    pub dry_run: bool,

    /// Keep going after a failed migration
    #[arg(long)]
    pub continue_on_failure: bool,
}

#[derive(Subcommand, Debug)]
pub enum EntityAction {
    /// Print the current entity
    Get {
        /// Canonical id, e.g. entity:person/ram-poudel
        id: String,
    },

    /// Print the entity's version history
    Versions {
        id: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_migrate_run() {
        let cli = Cli::try_parse_from([
            "civicdb",
            "--config",
            "/etc/civicdb.json",
            "migrate",
            "run",
            "--name",
            "005-seed-x",
            "--force",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/civicdb.json"));
        match cli.command {
            Command::Migrate {
                action: MigrateAction::Run(args),
            } => {
                assert_eq!(args.name.as_deref(), Some("005-seed-x"));
                assert!(args.force);
                assert!(!args.dry_run);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_default_config_path() {
        let cli = Cli::try_parse_from(["civicdb", "recover"]).unwrap();
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
    }

    #[test]
    fn test_config_after_subcommand() {
        let cli = Cli::try_parse_from(["civicdb", "entity", "get", "entity:person/ram-poudel", "--config", "x.json"])
            .unwrap();
        assert_eq!(cli.config, PathBuf::from("x.json"));
    }
}
