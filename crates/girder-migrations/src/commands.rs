//! High-level entry points: detect changes into a new migration file,
//! inspect history, and run migrations.

use girder_backends::DatabaseBackend;
use girder_core::{MigrateError, MigrateResult};
use girder_model::Registry;
use tracing::info;

use crate::autodetector::AutoDetector;
use crate::executor::{MigrationExecutor, PlanStep};
use crate::graph::MigrationGraph;
use crate::loader::{self, MigrationLoader};
use crate::migration::Migration;
use crate::questioner::Questioner;
use crate::schema_editor::SchemaEditor;
use crate::state::ProjectState;

/// Detects schema changes and writes them as a new migration file.
///
/// Returns `None` when the registry already matches migration history.
/// Aborts with [`MigrateError::ConflictingLeaves`] when history has
/// diverged; the conflict must be resolved (by merging or deleting a
/// branch) before new migrations can be recorded.
pub fn make_migrations(
    loader: &mut MigrationLoader,
    registry: &Registry,
    questioner: &dyn Questioner,
    name: Option<&str>,
) -> MigrateResult<Option<Migration>> {
    let graph = loader.load()?;
    let conflicts = loader::find_conflicts(&graph);
    if !conflicts.is_empty() {
        return Err(MigrateError::ConflictingLeaves(conflicts));
    }

    let old_state = graph.project_state()?;
    let new_state = ProjectState::from_registry(registry, true);
    let ops = AutoDetector::new(old_state, new_state).detect_changes(questioner)?;
    if ops.is_empty() {
        info!("no changes detected");
        return Ok(None);
    }

    let initial = graph.is_empty();
    let description = name.unwrap_or(if initial { "initial" } else { "auto" });
    let mut migration = Migration::new(loader.next_name(description));
    migration.initial = initial;
    migration.dependencies = graph.leaf_nodes();
    migration.operations = ops;

    loader.save(&migration)?;
    info!(name = %migration.name, operations = migration.operations.len(), "wrote migration");
    Ok(Some(migration))
}

/// Every migration in replay order with its applied flag, for display.
pub fn show_migration_plan(
    executor: &MigrationExecutor,
    graph: &MigrationGraph,
) -> MigrateResult<Vec<(String, bool)>> {
    Ok(graph
        .replay_order()?
        .into_iter()
        .map(|name| {
            let applied = executor.recorder().is_applied(&name);
            (name, applied)
        })
        .collect())
}

/// Loads migrations from disk, syncs the ledger, and migrates to the
/// given targets (all leaves when empty).
pub async fn migrate(
    loader: &mut MigrationLoader,
    backend: &dyn DatabaseBackend,
    editor: SchemaEditor,
    targets: &[String],
    fake: bool,
) -> MigrateResult<Vec<PlanStep>> {
    let graph = loader.load()?;
    let resolved: Vec<String> = targets
        .iter()
        .map(|t| loader.resolve_target(t))
        .collect::<MigrateResult<_>>()?;

    let mut executor = MigrationExecutor::new(editor);
    executor.recorder().ensure_table(backend).await?;
    executor.recorder_mut().load_from_db(backend).await?;
    executor.migrate(&graph, backend, &resolved, fake).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::questioner::NonInteractiveQuestioner;
    use girder_backends::CollectingBackend;
    use girder_model::{FieldDef, FieldType, ModelMeta};

    fn temp_loader(tag: &str) -> MigrationLoader {
        let dir = std::env::temp_dir().join(format!("girder_commands_test_{tag}"));
        let _ = std::fs::remove_dir_all(&dir);
        MigrationLoader::new(dir)
    }

    fn registry_v1() -> Registry {
        let mut registry = Registry::new();
        registry.register(ModelMeta::new("author", vec![FieldDef::auto_pk()]));
        registry
    }

    fn registry_v2() -> Registry {
        let mut registry = Registry::new();
        registry.register(ModelMeta::new(
            "author",
            vec![
                FieldDef::auto_pk(),
                FieldDef::new("name", FieldType::Text).nullable(),
            ],
        ));
        registry
    }

    #[test]
    fn test_make_migrations_initial_then_followup() {
        let mut loader = temp_loader("flow");

        let first = make_migrations(&mut loader, &registry_v1(), &NonInteractiveQuestioner, None)
            .unwrap()
            .unwrap();
        assert_eq!(first.name, "0001_initial");
        assert!(first.initial);
        assert!(first.dependencies.is_empty());

        // Same registry again: nothing to do.
        let none =
            make_migrations(&mut loader, &registry_v1(), &NonInteractiveQuestioner, None).unwrap();
        assert!(none.is_none());

        let second = make_migrations(
            &mut loader,
            &registry_v2(),
            &NonInteractiveQuestioner,
            Some("add_name"),
        )
        .unwrap()
        .unwrap();
        assert_eq!(second.name, "0002_add_name");
        assert!(!second.initial);
        assert_eq!(second.dependencies, vec!["0001_initial"]);

        std::fs::remove_dir_all(loader.dir()).unwrap();
    }

    #[test]
    fn test_make_migrations_aborts_on_conflicting_leaves() {
        let mut loader = temp_loader("conflict");
        loader.save(&Migration::new("0001_initial").initial()).unwrap();
        loader
            .save(&Migration::new("0002_a").depends_on("0001_initial"))
            .unwrap();
        loader
            .save(&Migration::new("0002_b").depends_on("0001_initial"))
            .unwrap();

        let err = make_migrations(&mut loader, &registry_v1(), &NonInteractiveQuestioner, None)
            .unwrap_err();
        assert!(matches!(
            err,
            MigrateError::ConflictingLeaves(leaves) if leaves == vec!["0002_a", "0002_b"]
        ));
        std::fs::remove_dir_all(loader.dir()).unwrap();
    }

    #[tokio::test]
    async fn test_migrate_runs_written_migrations() {
        let mut loader = temp_loader("migrate");
        make_migrations(&mut loader, &registry_v1(), &NonInteractiveQuestioner, None).unwrap();

        let backend = CollectingBackend::new();
        let plan = migrate(&mut loader, &backend, SchemaEditor::postgres(), &[], false)
            .await
            .unwrap();
        assert_eq!(plan.len(), 1);

        let executed = backend.executed();
        assert!(executed[0].starts_with("CREATE TABLE IF NOT EXISTS girder_migrations"));
        assert!(executed.iter().any(|s| s.starts_with("CREATE TABLE \"author\"")));
        std::fs::remove_dir_all(loader.dir()).unwrap();
    }

    #[tokio::test]
    async fn test_migrate_resolves_prefix_targets() {
        let mut loader = temp_loader("target");
        make_migrations(&mut loader, &registry_v1(), &NonInteractiveQuestioner, None).unwrap();
        make_migrations(
            &mut loader,
            &registry_v2(),
            &NonInteractiveQuestioner,
            Some("add_name"),
        )
        .unwrap();

        let backend = CollectingBackend::new();
        let plan = migrate(
            &mut loader,
            &backend,
            SchemaEditor::postgres(),
            &["0001".to_string()],
            false,
        )
        .await
        .unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].migration, "0001_initial");
        std::fs::remove_dir_all(loader.dir()).unwrap();
    }
}
