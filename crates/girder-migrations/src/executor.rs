//! Plans and runs migrations against a database backend.
//!
//! The executor never mutates the schema without going through the plan:
//! targets resolve to an all-forward or all-backward step list, the whole
//! graph is replayed in memory to reconstruct each migration's starting
//! state, and only then does DDL reach the backend. The applied-migrations
//! ledger lives in the `girder_migrations` table and is written inside the
//! same transaction as the DDL wherever the backend supports that.

use std::collections::BTreeSet;

use chrono::Utc;
use girder_backends::DatabaseBackend;
use girder_core::logging::migration_span;
use girder_core::{MigrateError, MigrateResult};
use girder_model::Value;
use tracing::{debug, info};

use crate::graph::MigrationGraph;
use crate::schema_editor::SchemaEditor;
use crate::state::ProjectState;

/// The ledger table name.
pub const LEDGER_TABLE: &str = "girder_migrations";

/// One planned step: a migration to apply or unapply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStep {
    /// The migration name.
    pub migration: String,
    /// True when the step unapplies the migration.
    pub backwards: bool,
}

impl PlanStep {
    fn forward(name: &str) -> Self {
        Self {
            migration: name.to_string(),
            backwards: false,
        }
    }

    fn backward(name: &str) -> Self {
        Self {
            migration: name.to_string(),
            backwards: true,
        }
    }
}

/// Tracks which migrations the ledger says are applied.
#[derive(Debug, Default, Clone)]
pub struct MigrationRecorder {
    applied: BTreeSet<String>,
}

impl MigrationRecorder {
    /// An empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the ledger table when it does not exist.
    pub async fn ensure_table(&self, backend: &dyn DatabaseBackend) -> MigrateResult<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {LEDGER_TABLE} \
             (name VARCHAR(255) NOT NULL PRIMARY KEY, applied TIMESTAMP NOT NULL)"
        );
        backend.execute(&sql, &[]).await?;
        Ok(())
    }

    /// Replaces the in-memory view with the ledger's contents.
    pub async fn load_from_db(&mut self, backend: &dyn DatabaseBackend) -> MigrateResult<()> {
        let rows = backend
            .query(&format!("SELECT name FROM {LEDGER_TABLE}"), &[])
            .await?;
        self.applied = rows
            .iter()
            .filter_map(|row| row.get("name").and_then(Value::as_text))
            .map(str::to_string)
            .collect();
        debug!(count = self.applied.len(), "loaded applied migrations");
        Ok(())
    }

    /// Records a migration as applied, in the ledger and in memory.
    pub async fn record_applied(
        &mut self,
        backend: &dyn DatabaseBackend,
        name: &str,
    ) -> MigrateResult<()> {
        let sql = format!("INSERT INTO {LEDGER_TABLE} (name, applied) VALUES (?, ?)");
        backend
            .execute(
                &sql,
                &[
                    Value::Text(name.to_string()),
                    Value::DateTime(Utc::now()),
                ],
            )
            .await?;
        self.applied.insert(name.to_string());
        Ok(())
    }

    /// Removes a migration from the ledger and from memory.
    pub async fn record_unapplied(
        &mut self,
        backend: &dyn DatabaseBackend,
        name: &str,
    ) -> MigrateResult<()> {
        let sql = format!("DELETE FROM {LEDGER_TABLE} WHERE name = ?");
        backend
            .execute(&sql, &[Value::Text(name.to_string())])
            .await?;
        self.applied.remove(name);
        Ok(())
    }

    /// The applied set, sorted.
    pub fn applied(&self) -> &BTreeSet<String> {
        &self.applied
    }

    /// Whether `name` is recorded as applied.
    pub fn is_applied(&self, name: &str) -> bool {
        self.applied.contains(name)
    }

    /// Marks a migration applied in memory only. For tests and fakes.
    pub fn mark_applied(&mut self, name: impl Into<String>) {
        self.applied.insert(name.into());
    }
}

/// Runs migration plans.
#[derive(Debug)]
pub struct MigrationExecutor {
    editor: SchemaEditor,
    recorder: MigrationRecorder,
}

impl MigrationExecutor {
    /// Creates an executor with an empty recorder.
    pub fn new(editor: SchemaEditor) -> Self {
        Self {
            editor,
            recorder: MigrationRecorder::new(),
        }
    }

    /// The schema editor in use.
    pub fn editor(&self) -> &SchemaEditor {
        &self.editor
    }

    /// The ledger view.
    pub fn recorder(&self) -> &MigrationRecorder {
        &self.recorder
    }

    /// Mutable ledger access, for seeding applied state.
    pub fn recorder_mut(&mut self) -> &mut MigrationRecorder {
        &mut self.recorder
    }

    /// Errors when the ledger claims a migration is applied while one of
    /// its ancestors is not.
    pub fn check_consistent_history(&self, graph: &MigrationGraph) -> MigrateResult<()> {
        for name in self.recorder.applied() {
            if !graph.contains(name) {
                continue;
            }
            for ancestor in graph.before_lineage(name)? {
                if ancestor != *name && !self.recorder.is_applied(&ancestor) {
                    return Err(MigrateError::ConflictingHistory {
                        applied: name.clone(),
                        unapplied: ancestor,
                    });
                }
            }
        }
        Ok(())
    }

    /// Resolves targets into an ordered step list.
    ///
    /// Per target: `"zero"` unapplies every applied migration; an applied
    /// target unapplies the applied migrations strictly after it; an
    /// unapplied target applies its unapplied ancestors. A plan mixing
    /// forward and backward steps is rejected rather than guessed at.
    pub fn migration_plan(
        &self,
        graph: &MigrationGraph,
        targets: &[String],
    ) -> MigrateResult<Vec<PlanStep>> {
        let targets: Vec<String> = if targets.is_empty() {
            graph.leaf_nodes()
        } else {
            targets.to_vec()
        };

        let mut applied: BTreeSet<String> = self.recorder.applied().clone();
        let mut plan: Vec<PlanStep> = Vec::new();

        for target in &targets {
            if target == "zero" {
                for root in graph.root_nodes() {
                    Self::unapply_descendants_of(graph, &root, &mut applied, &mut plan)?;
                }
            } else if applied.contains(target) {
                for child in graph.children(target) {
                    Self::unapply_descendants_of(graph, &child, &mut applied, &mut plan)?;
                }
            } else {
                graph.require_migration(target)?;
                for ancestor in graph.before_lineage(target)? {
                    if !applied.contains(&ancestor) {
                        plan.push(PlanStep::forward(&ancestor));
                        applied.insert(ancestor);
                    }
                }
            }
        }

        let has_forward = plan.iter().any(|s| !s.backwards);
        let has_backward = plan.iter().any(|s| s.backwards);
        if has_forward && has_backward {
            return Err(MigrateError::MixedPlan);
        }
        Ok(plan)
    }

    /// Queues backward steps for every applied migration at or after
    /// `name`, newest first.
    fn unapply_descendants_of(
        graph: &MigrationGraph,
        name: &str,
        applied: &mut BTreeSet<String>,
        plan: &mut Vec<PlanStep>,
    ) -> MigrateResult<()> {
        let mut lineage = graph.after_lineage(name)?;
        lineage.reverse();
        for descendant in lineage {
            if applied.remove(&descendant) {
                plan.push(PlanStep::backward(&descendant));
            }
        }
        Ok(())
    }

    /// Plans and executes a migration run.
    ///
    /// `fake` touches only the ledger. Each migration runs inside its own
    /// transaction when the backend supports transactional DDL, with the
    /// ledger write as the final statement, so a failure leaves both the
    /// schema and the ledger at the previous migration.
    pub async fn migrate(
        &mut self,
        graph: &MigrationGraph,
        backend: &dyn DatabaseBackend,
        targets: &[String],
        fake: bool,
    ) -> MigrateResult<Vec<PlanStep>> {
        self.check_consistent_history(graph)?;
        let plan = self.migration_plan(graph, targets)?;
        if plan.is_empty() {
            info!("no migrations to run");
            return Ok(plan);
        }

        // Replay the whole graph once to learn each planned migration's
        // starting state; non-targeted migrations contribute state only.
        let mut snapshots = std::collections::BTreeMap::new();
        let mut state = ProjectState::new();
        for name in graph.replay_order()? {
            snapshots.insert(name.clone(), state.clone());
            graph.require_migration(&name)?.mutate_state(&mut state)?;
        }

        for step in &plan {
            let span = migration_span(&step.migration, step.backwards);
            let _guard = span.enter();
            let before = snapshots
                .get(&step.migration)
                .ok_or_else(|| MigrateError::NodeNotFound(step.migration.clone()))?;
            if fake {
                info!(fake = true, "recording only");
                self.record_step(backend, step).await?;
                continue;
            }
            let batches = if step.backwards {
                self.render_backwards(graph, &step.migration, before)?
            } else {
                self.render_forwards(graph, &step.migration, before)?
            };
            self.run_step(backend, step, &batches).await?;
        }
        Ok(plan)
    }

    /// Renders the forward DDL for one migration, one batch per
    /// operation, threading the state through each operation in order.
    fn render_forwards(
        &self,
        graph: &MigrationGraph,
        name: &str,
        before: &ProjectState,
    ) -> MigrateResult<Vec<(String, Vec<String>)>> {
        let migration = graph.require_migration(name)?;
        let mut current = before.clone();
        let mut batches = Vec::new();
        for op in &migration.operations {
            let mut next = current.clone();
            op.mutate_state(&mut next)?;
            let sql = op.database_forwards(&self.editor, &current, &next)?;
            batches.push((op.describe(), sql));
            current = next;
        }
        Ok(batches)
    }

    /// Renders the reverse DDL: operations run in reverse order, each
    /// rolling back from its post-state to its pre-state.
    fn render_backwards(
        &self,
        graph: &MigrationGraph,
        name: &str,
        before: &ProjectState,
    ) -> MigrateResult<Vec<(String, Vec<String>)>> {
        let migration = graph.require_migration(name)?;
        let mut states = vec![before.clone()];
        for op in &migration.operations {
            let mut next = states[states.len() - 1].clone();
            op.mutate_state(&mut next)?;
            states.push(next);
        }

        let mut batches = Vec::new();
        for (idx, op) in migration.operations.iter().enumerate().rev() {
            let sql = op.database_backwards(&self.editor, &states[idx + 1], &states[idx])?;
            batches.push((op.describe(), sql));
        }
        Ok(batches)
    }

    /// Pure plan rendering, for dry runs: every statement each step would
    /// execute, including dialect rebuild notes.
    pub fn plan_sql(
        &self,
        graph: &MigrationGraph,
        targets: &[String],
    ) -> MigrateResult<Vec<(PlanStep, Vec<String>)>> {
        let plan = self.migration_plan(graph, targets)?;
        let mut snapshots = std::collections::BTreeMap::new();
        let mut state = ProjectState::new();
        for name in graph.replay_order()? {
            snapshots.insert(name.clone(), state.clone());
            graph.require_migration(&name)?.mutate_state(&mut state)?;
        }

        let mut rendered = Vec::new();
        for step in plan {
            let before = snapshots
                .get(&step.migration)
                .ok_or_else(|| MigrateError::NodeNotFound(step.migration.clone()))?;
            let batches = if step.backwards {
                self.render_backwards(graph, &step.migration, before)?
            } else {
                self.render_forwards(graph, &step.migration, before)?
            };
            let sql = batches.into_iter().flat_map(|(_, stmts)| stmts).collect();
            rendered.push((step, sql));
        }
        Ok(rendered)
    }

    async fn run_step(
        &mut self,
        backend: &dyn DatabaseBackend,
        step: &PlanStep,
        batches: &[(String, Vec<String>)],
    ) -> MigrateResult<()> {
        let transactional = backend.supports_transactional_ddl();
        if transactional {
            backend.begin().await?;
        }
        for (operation, statements) in batches {
            for sql in statements {
                // Rebuild notes are surfaced in dry runs but never executed.
                if sql.starts_with("--") {
                    debug!(%sql, "skipping comment statement");
                    continue;
                }
                debug!(%sql, "executing");
                if let Err(err) = backend.execute(sql, &[]).await {
                    if transactional {
                        backend.rollback().await?;
                    }
                    return Err(MigrateError::OperationFailed {
                        migration: step.migration.clone(),
                        operation: operation.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        if let Err(err) = self.record_step(backend, step).await {
            if transactional {
                backend.rollback().await?;
            }
            return Err(err);
        }
        if transactional {
            backend.commit().await?;
        }
        info!(backwards = step.backwards, "migration complete");
        Ok(())
    }

    async fn record_step(
        &mut self,
        backend: &dyn DatabaseBackend,
        step: &PlanStep,
    ) -> MigrateResult<()> {
        if step.backwards {
            self.recorder.record_unapplied(backend, &step.migration).await
        } else {
            self.recorder.record_applied(backend, &step.migration).await
        }
    }
}
