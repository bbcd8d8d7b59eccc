//! Declarative migration steps
//!
//! A migration without registered code may list its work in `migrate.json`:
//!
//! ```json
//! "steps": [
//!   {"action": "import_entities", "file": "parties.json", "skip_if_exists": true},
//!   {"action": "update_entity", "id": "entity:organization/political_party/nepali-congress",
//!    "set_attributes": {"founded": 1947}}
//! ]
//! ```
//!
//! Every step is written to be re-runnable: `skip_if_exists` turns a
//! create into a no-op when the record is already there, and an update
//! that changes nothing writes no version.

use serde::{Deserialize, Serialize};

use super::context::MigrationContext;
use super::errors::{MigrationError, MigrationResult};
use super::procedure::MigrationProcedure;
use crate::model::{Attributes, Author, EntityKey, NewEntity, NewRelationship};
use crate::search::RelationshipQuery;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    RegisterAuthor {
        author: Author,
    },
    CreateEntity {
        entity: NewEntity,
        #[serde(default)]
        skip_if_exists: bool,
    },
    /// JSON array of entities in a file inside the migration folder.
    ImportEntities {
        file: String,
        #[serde(default)]
        skip_if_exists: bool,
    },
    UpdateEntity {
        id: String,
        #[serde(default)]
        set_attributes: Attributes,
        #[serde(default)]
        remove_attributes: Vec<String>,
    },
    DeleteEntity {
        id: String,
    },
    CreateRelationship {
        relationship: NewRelationship,
        /// Skips when a relationship with the same source, target and type
        /// exists.
        #[serde(default)]
        skip_if_exists: bool,
    },
    Log {
        message: String,
    },
}

impl Step {
    pub fn action(&self) -> &'static str {
        match self {
            Step::RegisterAuthor { .. } => "register_author",
            Step::CreateEntity { .. } => "create_entity",
            Step::ImportEntities { .. } => "import_entities",
            Step::UpdateEntity { .. } => "update_entity",
            Step::DeleteEntity { .. } => "delete_entity",
            Step::CreateRelationship { .. } => "create_relationship",
            Step::Log { .. } => "log",
        }
    }

    pub fn apply(&self, ctx: &MigrationContext) -> MigrationResult<()> {
        match self {
            Step::RegisterAuthor { author } => {
                ctx.publication().register_author(author.clone())?;
                ctx.log(format!("registered author {}", author.id));
            }
            Step::CreateEntity {
                entity,
                skip_if_exists,
            } => create_entity(ctx, entity.clone(), *skip_if_exists)?,
            Step::ImportEntities {
                file,
                skip_if_exists,
            } => {
                let entities: Vec<NewEntity> = ctx.read_json(file)?;
                ctx.log(format!("importing {} entities from {}", entities.len(), file));
                for entity in entities {
                    create_entity(ctx, entity, *skip_if_exists)?;
                }
            }
            Step::UpdateEntity {
                id,
                set_attributes,
                remove_attributes,
            } => update_entity(ctx, id, set_attributes, remove_attributes)?,
            Step::DeleteEntity { id } => {
                let key = parse_key(id)?;
                if ctx.delete_entity(&key)? {
                    ctx.log(format!("deleted {}", key));
                } else {
                    ctx.log(format!("{} already absent", key));
                }
            }
            Step::CreateRelationship {
                relationship,
                skip_if_exists,
            } => {
                if *skip_if_exists && relationship_exists(ctx, relationship)? {
                    ctx.log(format!(
                        "skipped existing {} {} -> {}",
                        relationship.relationship_type.as_str(),
                        relationship.source_entity_id,
                        relationship.target_entity_id
                    ));
                    return Ok(());
                }
                let created = ctx.create_relationship(relationship.clone())?;
                ctx.log(format!("created relationship {}", created.id));
            }
            Step::Log { message } => ctx.log(message.clone()),
        }
        Ok(())
    }
}

fn parse_key(id: &str) -> MigrationResult<EntityKey> {
    id.parse::<EntityKey>()
        .map_err(|e| MigrationError::procedure(format!("invalid entity id '{}': {}", id, e)))
}

fn create_entity(ctx: &MigrationContext, entity: NewEntity, skip_if_exists: bool) -> MigrationResult<()> {
    let key = entity.key();
    if skip_if_exists && ctx.find_entity(&key)?.is_some() {
        ctx.log(format!("skipped existing {}", key));
        return Ok(());
    }
    ctx.create_entity(entity)?;
    ctx.log(format!("created {}", key));
    Ok(())
}

fn update_entity(
    ctx: &MigrationContext,
    id: &str,
    set_attributes: &Attributes,
    remove_attributes: &[String],
) -> MigrationResult<()> {
    let key = parse_key(id)?;
    let current = ctx
        .find_entity(&key)?
        .ok_or_else(|| MigrationError::procedure(format!("entity '{}' does not exist", key)))?;

    let mut updated = current.clone();
    for (name, value) in set_attributes {
        updated.attributes.insert(name.clone(), value.clone());
    }
    for name in remove_attributes {
        updated.attributes.remove(name);
    }

    if updated.attributes == current.attributes {
        ctx.log(format!("{} unchanged", key));
        return Ok(());
    }
    let updated = ctx.update_entity(updated)?;
    ctx.log(format!(
        "updated {} to version {}",
        key, updated.version_summary.version_number
    ));
    Ok(())
}

fn relationship_exists(ctx: &MigrationContext, relationship: &NewRelationship) -> MigrationResult<bool> {
    let query = RelationshipQuery {
        relationship_type: Some(relationship.relationship_type),
        source: Some(relationship.source_entity_id.clone()),
        target: Some(relationship.target_entity_id.clone()),
        limit: Some(1),
        ..Default::default()
    };
    Ok(ctx.search().search_relationships(&query)?.total > 0)
}

/// Runs declared steps in order, stopping at the first failure.
#[derive(Debug, Clone)]
pub struct StepsProcedure {
    steps: Vec<Step>,
}

impl StepsProcedure {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }
}

impl MigrationProcedure for StepsProcedure {
    fn run(&self, ctx: &MigrationContext) -> MigrationResult<()> {
        for (index, step) in self.steps.iter().enumerate() {
            step.apply(ctx).map_err(|e| {
                MigrationError::procedure(format!("step {} ({}): {}", index + 1, step.action(), e))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::discovery::Migration;
    use crate::migration::manifest::MigrationManifest;
    use crate::model::{EntityType, Name, NameKind, NameParts};
    use crate::normalize::UnavailableNormalizer;
    use crate::publication::PublicationService;
    use crate::search::SearchService;
    use crate::store::RecordStore;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn context(temp: &TempDir, steps: Vec<Step>) -> MigrationContext {
        let store = RecordStore::open(temp.path().join("data")).unwrap();
        let folder = temp.path().join("migrations/001-seed");
        std::fs::create_dir_all(&folder).unwrap();
        let migration = Migration {
            prefix: 1,
            name: "seed".into(),
            full_name: "001-seed".into(),
            folder,
            manifest: MigrationManifest {
                author: "data@example.org".into(),
                date: "2024-01-01".into(),
                description: "Seed".into(),
                change_description: None,
                steps,
            },
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        };
        let publication = Arc::new(PublicationService::new(store.clone()));
        publication
            .register_author(Author::new(migration.author_id(), "Migration 001-seed"))
            .unwrap();
        MigrationContext::new(
            migration,
            publication,
            Arc::new(SearchService::new(store)),
            Arc::new(UnavailableNormalizer),
        )
    }

    fn person(slug: &str) -> NewEntity {
        NewEntity::new(
            EntityKey::new(EntityType::Person, None, slug),
            vec![Name {
                kind: NameKind::Primary,
                en: Some(NameParts::full("Ram Poudel")),
                ne: None,
            }],
        )
    }

    #[test]
    fn test_parse_steps() {
        let steps: Vec<Step> = serde_json::from_value(json!([
            {"action": "log", "message": "hello"},
            {"action": "delete_entity", "id": "entity:person/ram-poudel"},
            {"action": "import_entities", "file": "people.json"}
        ]))
        .unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[2].action(), "import_entities");
        assert!(matches!(&steps[2], Step::ImportEntities { skip_if_exists: false, .. }));
    }

    #[test]
    fn test_steps_are_rerunnable() {
        let temp = TempDir::new().unwrap();
        let steps = vec![
            Step::CreateEntity {
                entity: person("ram-poudel"),
                skip_if_exists: true,
            },
            Step::UpdateEntity {
                id: "entity:person/ram-poudel".into(),
                set_attributes: [("party".to_string(), json!("congress"))].into_iter().collect(),
                remove_attributes: Vec::new(),
            },
        ];
        let ctx = context(&temp, steps.clone());
        let procedure = StepsProcedure::new(steps);

        procedure.run(&ctx).unwrap();
        procedure.run(&ctx).unwrap();

        let key = EntityKey::new(EntityType::Person, None, "ram-poudel");
        let versions = ctx.publication().get_entity_versions(&key).unwrap();
        assert_eq!(versions.len(), 2);
        assert!(ctx.logs().iter().any(|l| l == "skipped existing entity:person/ram-poudel"));
    }

    #[test]
    fn test_import_from_folder_file() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp, Vec::new());
        let people = vec![person("sita-sharma"), person("hari-thapa")];
        std::fs::write(
            ctx.migration().folder.join("people.json"),
            serde_json::to_vec(&people).unwrap(),
        )
        .unwrap();

        Step::ImportEntities {
            file: "people.json".into(),
            skip_if_exists: false,
        }
        .apply(&ctx)
        .unwrap();
        assert_eq!(ctx.search().count_entities().unwrap(), 2);
    }

    #[test]
    fn test_failing_step_is_numbered() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp, Vec::new());
        let procedure = StepsProcedure::new(vec![
            Step::Log {
                message: "start".into(),
            },
            Step::UpdateEntity {
                id: "entity:person/nobody-here".into(),
                set_attributes: Attributes::new(),
                remove_attributes: Vec::new(),
            },
        ]);
        let err = procedure.run(&ctx).unwrap_err();
        assert!(err.to_string().starts_with("step 2 (update_entity)"));
    }

    #[test]
    fn test_read_outside_folder_rejected() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp, Vec::new());
        assert!(ctx.read_text("../../data/authors/x.json").is_err());
        assert!(ctx.read_text("/etc/passwd").is_err());
    }
}
