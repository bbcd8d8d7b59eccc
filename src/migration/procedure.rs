//! Migration procedures
//!
//! A migration's work is either a procedure registered in code under the
//! migration's full name, or the `steps` declared in its `migrate.json`.
//! Registered procedures win when both exist.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::context::MigrationContext;
use super::discovery::Migration;
use super::errors::{MigrationError, MigrationResult};
use super::steps::StepsProcedure;

pub trait MigrationProcedure: Send + Sync {
    fn run(&self, ctx: &MigrationContext) -> MigrationResult<()>;
}

impl<F> MigrationProcedure for F
where
    F: Fn(&MigrationContext) -> MigrationResult<()> + Send + Sync,
{
    fn run(&self, ctx: &MigrationContext) -> MigrationResult<()> {
        self(ctx)
    }
}

#[derive(Default, Clone)]
pub struct ProcedureRegistry {
    procedures: BTreeMap<String, Arc<dyn MigrationProcedure>>,
}

impl ProcedureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, procedure: F) -> &mut Self
    where
        F: Fn(&MigrationContext) -> MigrationResult<()> + Send + Sync + 'static,
    {
        self.procedures.insert(name.into(), Arc::new(procedure));
        self
    }

    pub fn register_procedure(
        &mut self,
        name: impl Into<String>,
        procedure: Arc<dyn MigrationProcedure>,
    ) -> &mut Self {
        self.procedures.insert(name.into(), procedure);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.procedures.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.procedures.keys().map(String::as_str)
    }

    /// Procedure for `migration`: registered first, then declared steps.
    pub fn resolve(&self, migration: &Migration) -> MigrationResult<Arc<dyn MigrationProcedure>> {
        if let Some(procedure) = self.procedures.get(&migration.full_name) {
            return Ok(Arc::clone(procedure));
        }
        if !migration.manifest.steps.is_empty() {
            return Ok(Arc::new(StepsProcedure::new(migration.manifest.steps.clone())));
        }
        Err(MigrationError::NoProcedure(migration.full_name.clone()))
    }
}

impl std::fmt::Debug for ProcedureRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcedureRegistry")
            .field("procedures", &self.procedures.keys().collect::<Vec<_>>())
            .finish()
    }
}
