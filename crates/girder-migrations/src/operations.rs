//! The closed set of schema operations a migration can carry.
//!
//! Every operation does two things: mutate a [`ProjectState`] (so history
//! can be replayed without a database) and render DDL through a
//! [`SchemaEditor`] (so the same history can run against one). The enum is
//! deliberately closed; arbitrary SQL goes through [`Operation::RunSql`].

use girder_core::{MigrateError, MigrateResult};
use girder_model::{FieldDef, FieldType, IndexDef, TriggerDef};

use crate::schema_editor::SchemaEditor;
use crate::state::{ModelState, ProjectState};

/// One reversible (usually) schema change.
///
/// Serialized with an external `type` tag, so migration files read as
/// `{"type": "AddField", "model": "book", ...}`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum Operation {
    /// Create a model's table (plus indexes, triggers, through-tables).
    CreateModel {
        model: ModelState,
    },
    /// Drop a model's table.
    DeleteModel {
        name: String,
    },
    /// Rename a model and its table; relations pointing at it follow.
    RenameModel {
        old_name: String,
        new_name: String,
    },
    /// Add a concrete or relation column to a model.
    AddField {
        model: String,
        field: FieldDef,
    },
    /// Remove a field and its column.
    RemoveField {
        model: String,
        name: String,
    },
    /// Replace a field's definition in place.
    AlterField {
        model: String,
        field: FieldDef,
    },
    /// Rename a field; the column follows unless explicitly overridden.
    RenameField {
        model: String,
        old_name: String,
        new_name: String,
    },
    /// Add a many-to-many field (creates the through-table when auto).
    AddManyToMany {
        model: String,
        field: FieldDef,
    },
    /// Remove a many-to-many field (drops the through-table when auto).
    RemoveManyToMany {
        model: String,
        name: String,
    },
    /// Add a named multi-column index.
    AddIndex {
        model: String,
        index: IndexDef,
    },
    /// Remove a named index.
    RemoveIndex {
        model: String,
        name: String,
    },
    /// Replace a model's `unique_together` groups.
    AlterUniqueTogether {
        model: String,
        unique_together: Vec<Vec<String>>,
    },
    /// Attach triggers to a model.
    AddTriggers {
        model: String,
        triggers: Vec<TriggerDef>,
    },
    /// Detach triggers by name.
    RemoveTriggers {
        model: String,
        names: Vec<String>,
    },
    /// Raw SQL with an optional reverse statement.
    RunSql {
        forwards: String,
        #[serde(default)]
        backwards: Option<String>,
    },
}

impl Operation {
    /// A one-line human description, for plan output.
    pub fn describe(&self) -> String {
        match self {
            Self::CreateModel { model } => format!("Create model {}", model.name),
            Self::DeleteModel { name } => format!("Delete model {name}"),
            Self::RenameModel { old_name, new_name } => {
                format!("Rename model {old_name} to {new_name}")
            }
            Self::AddField { model, field } => format!("Add field {} to {model}", field.name),
            Self::RemoveField { model, name } => format!("Remove field {name} from {model}"),
            Self::AlterField { model, field } => format!("Alter field {} on {model}", field.name),
            Self::RenameField {
                model,
                old_name,
                new_name,
            } => format!("Rename field {old_name} on {model} to {new_name}"),
            Self::AddManyToMany { model, field } => {
                format!("Add many-to-many {} to {model}", field.name)
            }
            Self::RemoveManyToMany { model, name } => {
                format!("Remove many-to-many {name} from {model}")
            }
            Self::AddIndex { model, index } => format!("Add index {} on {model}", index.name),
            Self::RemoveIndex { model, name } => format!("Remove index {name} from {model}"),
            Self::AlterUniqueTogether { model, .. } => {
                format!("Alter unique_together on {model}")
            }
            Self::AddTriggers { model, triggers } => {
                format!("Add {} trigger(s) to {model}", triggers.len())
            }
            Self::RemoveTriggers { model, names } => {
                format!("Remove {} trigger(s) from {model}", names.len())
            }
            Self::RunSql { .. } => "Run raw SQL".to_string(),
        }
    }

    /// Whether the operation can run backwards.
    pub fn reversible(&self) -> bool {
        !matches!(
            self,
            Self::RunSql {
                backwards: None,
                ..
            }
        )
    }

    /// Applies this operation's effect to the in-memory state.
    pub fn mutate_state(&self, state: &mut ProjectState) -> MigrateResult<()> {
        match self {
            Self::CreateModel { model } => {
                state.add_model(model.clone());
                Ok(())
            }
            Self::DeleteModel { name } => state.remove_model(name).map(|_| ()),
            Self::RenameModel { old_name, new_name } => {
                let mut model = state.remove_model(old_name)?;
                model.name = new_name.to_lowercase();
                state.add_model(model);
                retarget_relations(state, old_name, new_name);
                Ok(())
            }
            Self::AddField { model, field } | Self::AddManyToMany { model, field } => {
                let model_state = require_model_mut(state, model)?;
                model_state.fields.push(field.clone());
                Ok(())
            }
            Self::RemoveField { model, name } | Self::RemoveManyToMany { model, name } => {
                let model_state = require_model_mut(state, model)?;
                model_state
                    .remove_field(name)
                    .map(|_| ())
                    .ok_or_else(|| MigrateError::UnknownField {
                        model: model.clone(),
                        field: name.clone(),
                    })
            }
            Self::AlterField { model, field } => {
                let model_state = require_model_mut(state, model)?;
                let slot = model_state.field_mut(&field.name).ok_or_else(|| {
                    MigrateError::UnknownField {
                        model: model.clone(),
                        field: field.name.clone(),
                    }
                })?;
                *slot = field.clone();
                Ok(())
            }
            Self::RenameField {
                model,
                old_name,
                new_name,
            } => {
                let model_state = require_model_mut(state, model)?;
                let field = model_state.field_mut(old_name).ok_or_else(|| {
                    MigrateError::UnknownField {
                        model: model.clone(),
                        field: old_name.clone(),
                    }
                })?;
                // A column that tracked the field name keeps tracking it.
                if field.column == *old_name {
                    field.column = new_name.clone();
                }
                field.name = new_name.clone();
                Ok(())
            }
            Self::AddIndex { model, index } => {
                let model_state = require_model_mut(state, model)?;
                model_state.options.indexes.push(index.clone());
                Ok(())
            }
            Self::RemoveIndex { model, name } => {
                let model_state = require_model_mut(state, model)?;
                model_state.options.indexes.retain(|i| i.name != *name);
                Ok(())
            }
            Self::AlterUniqueTogether {
                model,
                unique_together,
            } => {
                let model_state = require_model_mut(state, model)?;
                model_state.options.unique_together = unique_together.clone();
                Ok(())
            }
            Self::AddTriggers { model, triggers } => {
                let model_state = require_model_mut(state, model)?;
                model_state.options.triggers.extend(triggers.iter().cloned());
                Ok(())
            }
            Self::RemoveTriggers { model, names } => {
                let model_state = require_model_mut(state, model)?;
                model_state
                    .options
                    .triggers
                    .retain(|t| !names.contains(&t.name));
                Ok(())
            }
            Self::RunSql { .. } => Ok(()),
        }
    }

    /// Renders the forward DDL.
    ///
    /// `from_state` is the schema before this operation, `to_state` the
    /// schema after; relation targets resolve against whichever side they
    /// exist on.
    pub fn database_forwards(
        &self,
        editor: &SchemaEditor,
        from_state: &ProjectState,
        to_state: &ProjectState,
    ) -> MigrateResult<Vec<String>> {
        match self {
            Self::CreateModel { model } => editor.create_model(to_state, &model.name),
            Self::DeleteModel { name } => editor.delete_model(from_state, name),
            Self::RenameModel { old_name, new_name } => {
                let old_model = from_state.require_model(old_name)?;
                let new_model = to_state.require_model(new_name)?;
                Ok(rename_model_sql(editor, old_model, new_model))
            }
            Self::AddField { model, field } => editor.add_field(to_state, model, field),
            Self::RemoveField { model, name } => editor.remove_field(from_state, model, name),
            Self::AlterField { model, field } => {
                let old = require_field(from_state, model, &field.name)?;
                editor.alter_field(from_state, model, old, field)
            }
            Self::RenameField {
                model,
                old_name,
                new_name,
            } => {
                let old = require_field(from_state, model, old_name)?;
                let new = require_field(to_state, model, new_name)?;
                Ok(rename_field_sql(
                    editor,
                    from_state.require_model(model)?,
                    old,
                    new,
                ))
            }
            Self::AddManyToMany { model, field } => {
                editor.create_m2m_through(to_state, to_state.require_model(model)?, field)
            }
            Self::RemoveManyToMany { model, name } => {
                let model_state = from_state.require_model(model)?;
                let field = require_field(from_state, model, name)?;
                Ok(editor.drop_m2m_through(model_state, field))
            }
            Self::AddIndex { model, index } => {
                let table = from_state.require_model(model)?.table();
                Ok(vec![editor.dialect().create_index(
                    &index.name,
                    table,
                    &index.fields,
                    index.unique,
                )])
            }
            Self::RemoveIndex { model, name } => {
                let table = from_state.require_model(model)?.table();
                Ok(vec![editor.dialect().drop_index(table, name)])
            }
            Self::AlterUniqueTogether {
                model,
                unique_together,
            } => {
                let model_state = from_state.require_model(model)?;
                Ok(editor.alter_unique_together(
                    model_state.table(),
                    &model_state.options.unique_together,
                    unique_together,
                ))
            }
            Self::AddTriggers { triggers, .. } => Ok(editor.create_triggers(triggers)),
            Self::RemoveTriggers { model, names } => {
                let table = from_state.require_model(model)?.table();
                Ok(editor.drop_triggers(table, names))
            }
            Self::RunSql { forwards, .. } => Ok(vec![forwards.clone()]),
        }
    }

    /// Renders the reverse DDL.
    ///
    /// When unapplying, `from_state` is the schema with this operation
    /// applied and `to_state` the schema it is being rolled back to.
    pub fn database_backwards(
        &self,
        editor: &SchemaEditor,
        from_state: &ProjectState,
        to_state: &ProjectState,
    ) -> MigrateResult<Vec<String>> {
        match self {
            Self::CreateModel { model } => editor.delete_model(from_state, &model.name),
            Self::DeleteModel { name } => editor.create_model(to_state, name),
            Self::RenameModel { old_name, new_name } => {
                let new_model = from_state.require_model(new_name)?;
                let old_model = to_state.require_model(old_name)?;
                Ok(rename_model_sql(editor, new_model, old_model))
            }
            Self::AddField { model, field } => {
                editor.remove_field(from_state, model, &field.name)
            }
            Self::RemoveField { model, name } => {
                let field = require_field(to_state, model, name)?;
                editor.add_field(to_state, model, field)
            }
            Self::AlterField { model, field } => {
                let previous = require_field(to_state, model, &field.name)?;
                editor.alter_field(from_state, model, field, previous)
            }
            Self::RenameField {
                model,
                old_name,
                new_name,
            } => {
                let new = require_field(from_state, model, new_name)?;
                let old = require_field(to_state, model, old_name)?;
                Ok(rename_field_sql(
                    editor,
                    from_state.require_model(model)?,
                    new,
                    old,
                ))
            }
            Self::AddManyToMany { model, field } => {
                Ok(editor.drop_m2m_through(from_state.require_model(model)?, field))
            }
            Self::RemoveManyToMany { model, name } => {
                let model_state = to_state.require_model(model)?;
                let field = require_field(to_state, model, name)?;
                editor.create_m2m_through(to_state, model_state, field)
            }
            Self::AddIndex { model, index } => {
                let table = from_state.require_model(model)?.table();
                Ok(vec![editor.dialect().drop_index(table, &index.name)])
            }
            Self::RemoveIndex { model, name } => {
                let model_state = to_state.require_model(model)?;
                let index = model_state
                    .options
                    .indexes
                    .iter()
                    .find(|i| i.name == *name)
                    .ok_or_else(|| {
                        MigrateError::IrreversibleOperation(format!(
                            "index {name} on {model} has no recorded definition"
                        ))
                    })?;
                Ok(vec![editor.dialect().create_index(
                    &index.name,
                    model_state.table(),
                    &index.fields,
                    index.unique,
                )])
            }
            Self::AlterUniqueTogether {
                model,
                unique_together,
            } => {
                let previous = to_state.require_model(model)?;
                Ok(editor.alter_unique_together(
                    previous.table(),
                    unique_together,
                    &previous.options.unique_together,
                ))
            }
            Self::AddTriggers { model, triggers } => {
                let table = from_state.require_model(model)?.table();
                let names: Vec<String> = triggers.iter().map(|t| t.name.clone()).collect();
                Ok(editor.drop_triggers(table, &names))
            }
            Self::RemoveTriggers { model, names } => {
                let previous = to_state.require_model(model)?;
                let mut restored = Vec::new();
                for name in names {
                    let trigger = previous
                        .options
                        .triggers
                        .iter()
                        .find(|t| t.name == *name)
                        .ok_or_else(|| {
                            MigrateError::IrreversibleOperation(format!(
                                "trigger {name} on {model} has no recorded definition"
                            ))
                        })?;
                    restored.push(trigger.clone());
                }
                Ok(editor.create_triggers(&restored))
            }
            Self::RunSql { backwards, .. } => backwards.as_ref().map(|sql| vec![sql.clone()]).ok_or_else(
                || MigrateError::IrreversibleOperation("raw SQL with no reverse".to_string()),
            ),
        }
    }
}

fn require_model_mut<'a>(
    state: &'a mut ProjectState,
    name: &str,
) -> MigrateResult<&'a mut ModelState> {
    state
        .get_model_mut(name)
        .ok_or_else(|| MigrateError::UnknownModel(name.to_string()))
}

fn require_field<'a>(
    state: &'a ProjectState,
    model: &str,
    field: &str,
) -> MigrateResult<&'a FieldDef> {
    state
        .require_model(model)?
        .field(field)
        .ok_or_else(|| MigrateError::UnknownField {
            model: model.to_string(),
            field: field.to_string(),
        })
}

/// Repoints every relation targeting `old` at `new`.
fn retarget_relations(state: &mut ProjectState, old: &str, new: &str) {
    let old = old.to_lowercase();
    let new = new.to_lowercase();
    for model in state.models.values_mut() {
        for field in &mut model.fields {
            match &mut field.field_type {
                FieldType::ForeignKey { to, .. } | FieldType::ManyToMany { to, .. }
                    if to.to_lowercase() == old =>
                {
                    *to = new.clone();
                }
                _ => {}
            }
            if let FieldType::ManyToMany {
                through: Some(through),
                ..
            } = &mut field.field_type
            {
                if through.to_lowercase() == old {
                    *through = new.clone();
                }
            }
        }
    }
}

/// Table renames for a model rename: the main table (when the name
/// changed) plus every auto-created through-table, which embeds the
/// owning table's name.
fn rename_model_sql(editor: &SchemaEditor, old: &ModelState, new: &ModelState) -> Vec<String> {
    let mut statements = Vec::new();
    if old.table() != new.table() {
        statements.extend(editor.rename_table(old.table(), new.table()));
        for field in &old.fields {
            if let FieldType::ManyToMany { through: None, .. } = &field.field_type {
                statements.extend(editor.rename_table(
                    &format!("{}_{}", old.table(), field.name),
                    &format!("{}_{}", new.table(), field.name),
                ));
            }
        }
    }
    statements
}

/// Column (or through-table) renames for a field rename.
fn rename_field_sql(
    editor: &SchemaEditor,
    model: &ModelState,
    old: &FieldDef,
    new: &FieldDef,
) -> Vec<String> {
    if let FieldType::ManyToMany { through, .. } = &old.field_type {
        if through.is_none() && old.name != new.name {
            return editor.rename_table(
                &format!("{}_{}", model.table(), old.name),
                &format!("{}_{}", model.table(), new.name),
            );
        }
        return Vec::new();
    }
    if old.column == new.column {
        return Vec::new();
    }
    editor.rename_column(model.table(), &old.column, &new.column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use girder_model::{OnDelete, Value};

    fn author() -> ModelState {
        ModelState::new(
            "author",
            vec![
                FieldDef::auto_pk(),
                FieldDef::new("name", FieldType::Char { max_length: 100 }),
            ],
        )
    }

    fn book() -> ModelState {
        ModelState::new(
            "book",
            vec![
                FieldDef::auto_pk(),
                FieldDef::new(
                    "author",
                    FieldType::ForeignKey {
                        to: "author".into(),
                        on_delete: OnDelete::Cascade,
                        db_constraint: true,
                    },
                )
                .column("author_id"),
            ],
        )
    }

    fn two_model_state() -> ProjectState {
        let mut state = ProjectState::new();
        state.add_model(author());
        state.add_model(book());
        state
    }

    // ── state mutation ──────────────────────────────────────────────

    #[test]
    fn test_create_and_delete_model_state() {
        let mut state = ProjectState::new();
        Operation::CreateModel { model: author() }
            .mutate_state(&mut state)
            .unwrap();
        assert!(state.get_model("author").is_some());

        Operation::DeleteModel {
            name: "author".into(),
        }
        .mutate_state(&mut state)
        .unwrap();
        assert!(state.get_model("author").is_none());
    }

    #[test]
    fn test_rename_model_retargets_relations() {
        let mut state = two_model_state();
        Operation::RenameModel {
            old_name: "author".into(),
            new_name: "writer".into(),
        }
        .mutate_state(&mut state)
        .unwrap();

        assert!(state.get_model("author").is_none());
        assert!(state.get_model("writer").is_some());
        let fk = state.get_model("book").unwrap().field("author").unwrap();
        assert_eq!(fk.field_type.relation_target(), Some("writer"));
    }

    #[test]
    fn test_rename_field_column_follows() {
        let mut state = two_model_state();
        Operation::RenameField {
            model: "author".into(),
            old_name: "name".into(),
            new_name: "full_name".into(),
        }
        .mutate_state(&mut state)
        .unwrap();

        let field = state.get_model("author").unwrap().field("full_name").unwrap();
        assert_eq!(field.column, "full_name");
    }

    #[test]
    fn test_rename_field_keeps_explicit_column() {
        let mut state = ProjectState::new();
        state.add_model(ModelState::new(
            "author",
            vec![FieldDef::new("name", FieldType::Text).column("author_name")],
        ));
        Operation::RenameField {
            model: "author".into(),
            old_name: "name".into(),
            new_name: "full_name".into(),
        }
        .mutate_state(&mut state)
        .unwrap();

        let field = state.get_model("author").unwrap().field("full_name").unwrap();
        assert_eq!(field.column, "author_name");
    }

    #[test]
    fn test_alter_missing_field_errors() {
        let mut state = two_model_state();
        let err = Operation::AlterField {
            model: "author".into(),
            field: FieldDef::new("missing", FieldType::Text),
        }
        .mutate_state(&mut state)
        .unwrap_err();
        assert!(matches!(err, MigrateError::UnknownField { .. }));
    }

    #[test]
    fn test_unique_together_and_triggers_mutation() {
        let mut state = two_model_state();
        Operation::AlterUniqueTogether {
            model: "book".into(),
            unique_together: vec![vec!["author_id".into()]],
        }
        .mutate_state(&mut state)
        .unwrap();
        Operation::AddTriggers {
            model: "book".into(),
            triggers: vec![TriggerDef {
                name: "book_audit".into(),
                sql: "CREATE TRIGGER book_audit ...".into(),
            }],
        }
        .mutate_state(&mut state)
        .unwrap();

        let book = state.get_model("book").unwrap();
        assert_eq!(book.options.unique_together, vec![vec!["author_id".to_string()]]);
        assert_eq!(book.options.triggers.len(), 1);

        Operation::RemoveTriggers {
            model: "book".into(),
            names: vec!["book_audit".into()],
        }
        .mutate_state(&mut state)
        .unwrap();
        assert!(state.get_model("book").unwrap().options.triggers.is_empty());
    }

    // ── DDL rendering ───────────────────────────────────────────────

    fn apply(op: &Operation, from: &ProjectState) -> ProjectState {
        let mut to = from.clone();
        op.mutate_state(&mut to).unwrap();
        to
    }

    #[test]
    fn test_add_field_forwards_and_backwards() {
        let editor = SchemaEditor::postgres();
        let from = two_model_state();
        let op = Operation::AddField {
            model: "author".into(),
            field: FieldDef::new("bio", FieldType::Text).nullable(),
        };
        let to = apply(&op, &from);

        let fwd = op.database_forwards(&editor, &from, &to).unwrap();
        assert_eq!(fwd, vec!["ALTER TABLE \"author\" ADD COLUMN \"bio\" TEXT"]);

        let back = op.database_backwards(&editor, &to, &from).unwrap();
        assert_eq!(back, vec!["ALTER TABLE \"author\" DROP COLUMN \"bio\""]);
    }

    #[test]
    fn test_remove_field_backwards_restores_definition() {
        let editor = SchemaEditor::postgres();
        let mut from = two_model_state();
        from.get_model_mut("author")
            .unwrap()
            .fields
            .push(FieldDef::new("rating", FieldType::Integer).default(Value::Int(0)));
        let op = Operation::RemoveField {
            model: "author".into(),
            name: "rating".into(),
        };
        let to = apply(&op, &from);

        let back = op.database_backwards(&editor, &to, &from).unwrap();
        assert_eq!(
            back,
            vec!["ALTER TABLE \"author\" ADD COLUMN \"rating\" INTEGER NOT NULL DEFAULT 0"]
        );
    }

    #[test]
    fn test_rename_model_forwards_renames_table() {
        let editor = SchemaEditor::postgres();
        let from = two_model_state();
        let op = Operation::RenameModel {
            old_name: "author".into(),
            new_name: "writer".into(),
        };
        let to = apply(&op, &from);

        let fwd = op.database_forwards(&editor, &from, &to).unwrap();
        assert_eq!(fwd, vec!["ALTER TABLE \"author\" RENAME TO \"writer\""]);

        let back = op.database_backwards(&editor, &to, &from).unwrap();
        assert_eq!(back, vec!["ALTER TABLE \"writer\" RENAME TO \"author\""]);
    }

    #[test]
    fn test_run_sql_without_reverse_is_irreversible() {
        let editor = SchemaEditor::postgres();
        let state = ProjectState::new();
        let op = Operation::RunSql {
            forwards: "UPDATE author SET name = trim(name)".into(),
            backwards: None,
        };
        assert!(!op.reversible());
        assert!(matches!(
            op.database_backwards(&editor, &state, &state),
            Err(MigrateError::IrreversibleOperation(_))
        ));
    }

    #[test]
    fn test_serde_round_trip_tagged() {
        let op = Operation::AddField {
            model: "book".into(),
            field: FieldDef::new("title", FieldType::Char { max_length: 200 }),
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["type"], "AddField");
        assert_eq!(json["model"], "book");
        let back: Operation = serde_json::from_value(json).unwrap();
        assert_eq!(back, op);
    }

    #[test]
    fn test_alter_field_uses_previous_definition() {
        let editor = SchemaEditor::postgres();
        let from = two_model_state();
        let op = Operation::AlterField {
            model: "author".into(),
            field: FieldDef::new("name", FieldType::Char { max_length: 100 }).unique(),
        };
        let to = apply(&op, &from);

        let fwd = op.database_forwards(&editor, &from, &to).unwrap();
        assert_eq!(
            fwd,
            vec!["ALTER TABLE \"author\" ADD CONSTRAINT \"author_name_uniq\" UNIQUE (\"name\")"]
        );
        // The reverse drops what the forward added.
        let back = op.database_backwards(&editor, &to, &from).unwrap();
        assert_eq!(
            back,
            vec!["ALTER TABLE \"author\" DROP CONSTRAINT \"author_name_uniq\""]
        );
    }
}
