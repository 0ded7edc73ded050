//! The migration unit: a named, ordered list of operations plus declared
//! dependencies on other migrations.

use girder_core::MigrateResult;

use crate::operations::Operation;
use crate::state::ProjectState;

/// A single migration.
///
/// Migrations are identified by name (conventionally `<seq>_<description>`,
/// e.g. "0001_initial") and may depend on other migrations. Operations
/// within a migration are applied in order.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Migration {
    /// The migration name; the graph node key and ledger key.
    pub name: String,
    /// Names of migrations this one depends on, in declaration order.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// The operations to apply, in order.
    #[serde(default)]
    pub operations: Vec<Operation>,
    /// Whether this is the first migration of the project.
    #[serde(default)]
    pub initial: bool,
}

impl Migration {
    /// Creates a new empty migration.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            operations: Vec::new(),
            initial: false,
        }
    }

    /// Marks this migration as the initial migration.
    #[must_use]
    pub fn initial(mut self) -> Self {
        self.initial = true;
        self
    }

    /// Adds a dependency on another migration.
    #[must_use]
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(name.into());
        self
    }

    /// Adds an operation.
    #[must_use]
    pub fn operation(mut self, op: Operation) -> Self {
        self.operations.push(op);
        self
    }

    /// Replays every operation's state mutation, in order.
    pub fn mutate_state(&self, state: &mut ProjectState) -> MigrateResult<()> {
        for op in &self.operations {
            op.mutate_state(state)?;
        }
        Ok(())
    }

    /// Whether every operation can be reversed.
    pub fn reversible(&self) -> bool {
        self.operations.iter().all(Operation::reversible)
    }

    /// One-line descriptions of the operations, for plan display.
    pub fn describe(&self) -> Vec<String> {
        self.operations.iter().map(Operation::describe).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ModelState;
    use girder_model::FieldDef;

    #[test]
    fn test_migration_builder() {
        let m = Migration::new("0002_add_author")
            .depends_on("0001_initial")
            .operation(Operation::DeleteModel {
                name: "draft".into(),
            });
        assert_eq!(m.name, "0002_add_author");
        assert_eq!(m.dependencies, vec!["0001_initial"]);
        assert_eq!(m.operations.len(), 1);
        assert!(!m.initial);
    }

    #[test]
    fn test_initial_flag() {
        let m = Migration::new("0001_initial").initial();
        assert!(m.initial);
    }

    #[test]
    fn test_mutate_state_applies_operations_in_order() {
        let m = Migration::new("0001_initial")
            .initial()
            .operation(Operation::CreateModel {
                model: ModelState::new("author", vec![FieldDef::auto_pk()]),
            })
            .operation(Operation::DeleteModel {
                name: "author".into(),
            });

        let mut state = ProjectState::new();
        m.mutate_state(&mut state).unwrap();
        assert!(state.models.is_empty());
    }

    #[test]
    fn test_reversible() {
        let m = Migration::new("0001_initial").operation(Operation::RunSql {
            forwards: "SELECT 1".into(),
            backwards: None,
        });
        assert!(!m.reversible());

        let m = Migration::new("0001_initial").operation(Operation::RunSql {
            forwards: "SELECT 1".into(),
            backwards: Some("SELECT 2".into()),
        });
        assert!(m.reversible());
    }
}
