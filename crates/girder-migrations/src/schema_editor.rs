//! Dialect-independent DDL orchestration.
//!
//! The editor turns one logical change (create/alter/drop model or field)
//! into an ordered list of SQL statements, using a [`SqlDialect`] for the
//! vendor syntax. It never touches a connection; the executor decides
//! whether the statements run or are merely collected for display.

use girder_core::{MigrateError, MigrateResult};
use girder_model::{FieldDef, FieldType, OnDelete};

use crate::dialect::{MySqlDialect, PostgresDialect, SqlDialect, SqliteDialect};
use crate::state::{ModelState, ProjectState};

/// A reverse foreign key discovered while altering a primary key:
/// (referencing table, referencing column, on-delete action).
type ReverseFk = (String, String, OnDelete);

/// Translates logical schema changes into DDL statement sequences.
#[derive(Debug)]
pub struct SchemaEditor {
    dialect: Box<dyn SqlDialect>,
}

impl SchemaEditor {
    /// Creates an editor over the given dialect.
    pub fn new(dialect: Box<dyn SqlDialect>) -> Self {
        Self { dialect }
    }

    /// A PostgreSQL editor.
    pub fn postgres() -> Self {
        Self::new(Box::new(PostgresDialect))
    }

    /// A SQLite editor.
    pub fn sqlite() -> Self {
        Self::new(Box::new(SqliteDialect))
    }

    /// A MySQL editor.
    pub fn mysql() -> Self {
        Self::new(Box::new(MySqlDialect))
    }

    /// The underlying dialect.
    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }

    // ── Naming conventions ──────────────────────────────────────────

    fn fk_name(table: &str, column: &str) -> String {
        format!("{table}_{column}_fk")
    }

    fn uniq_name(table: &str, column: &str) -> String {
        format!("{table}_{column}_uniq")
    }

    fn idx_name(table: &str, column: &str) -> String {
        format!("{table}_{column}_idx")
    }

    fn through_table(model_table: &str, field_name: &str) -> String {
        format!("{model_table}_{field_name}")
    }

    fn uniq_together_name(table: &str, group: &[String]) -> String {
        format!("{table}_{}_uniq", group.join("_"))
    }

    // ── Type resolution ─────────────────────────────────────────────

    /// The storage kind a field occupies in its own table. Foreign keys
    /// store their target's primary-key kind (auto keys store as plain
    /// big integers).
    fn storage_kind(
        &self,
        state: &ProjectState,
        field_type: &FieldType,
    ) -> MigrateResult<FieldType> {
        match field_type {
            FieldType::ForeignKey { to, .. } => {
                let target = state.require_model(to)?;
                let pk_kind = target
                    .primary_key()
                    .map_or(FieldType::BigAuto, |f| f.field_type.clone());
                Ok(match pk_kind {
                    FieldType::BigAuto => FieldType::BigInteger,
                    other => other,
                })
            }
            other => Ok(other.clone()),
        }
    }

    /// The rendered column type for a field.
    pub fn column_type(&self, state: &ProjectState, field: &FieldDef) -> MigrateResult<String> {
        let kind = self.storage_kind(state, &field.field_type)?;
        Ok(self.dialect.column_type(&kind))
    }

    /// One column definition fragment: name, type, constraints.
    fn column_def(&self, state: &ProjectState, field: &FieldDef) -> MigrateResult<String> {
        let name = self.dialect.quote(&field.column);
        if field.primary_key && field.field_type == FieldType::BigAuto {
            return Ok(format!("{name} {}", self.dialect.auto_pk_sql()));
        }

        let mut def = format!("{name} {}", self.column_type(state, field)?);
        if field.primary_key {
            def.push_str(" PRIMARY KEY");
        }
        if !field.null {
            def.push_str(" NOT NULL");
        }
        if field.unique && !field.primary_key {
            def.push_str(" UNIQUE");
        }
        if let Some(default) = &field.default {
            def.push_str(&format!(" DEFAULT {}", default.to_sql_literal()));
        }
        Ok(def)
    }

    fn fk_target(&self, state: &ProjectState, to: &str) -> MigrateResult<(String, String)> {
        let target = state.require_model(to)?;
        let pk_column = target
            .primary_key()
            .map_or_else(|| "id".to_string(), |f| f.column.clone());
        Ok((target.table().to_string(), pk_column))
    }

    // ── Model-level changes ─────────────────────────────────────────

    /// DDL for creating a model's table, its indexes and triggers, and
    /// finally its auto-created many-to-many through-tables.
    ///
    /// Through-tables come last so every referenced primary key exists
    /// before its foreign keys.
    pub fn create_model(&self, state: &ProjectState, name: &str) -> MigrateResult<Vec<String>> {
        let model = state.require_model(name)?;
        let table = model.table();

        let mut clauses = Vec::new();
        for field in &model.fields {
            if !field.field_type.has_column() {
                continue;
            }
            clauses.push(self.column_def(state, field)?);
        }
        for field in &model.fields {
            if let FieldType::ForeignKey {
                to,
                on_delete,
                db_constraint: true,
            } = &field.field_type
            {
                let (ref_table, ref_column) = self.fk_target(state, to)?;
                clauses.push(format!(
                    "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {}",
                    self.dialect.quote(&Self::fk_name(table, &field.column)),
                    self.dialect.quote(&field.column),
                    self.dialect.quote(&ref_table),
                    self.dialect.quote(&ref_column),
                    self.dialect.on_delete_sql(*on_delete)
                ));
            }
        }
        for group in &model.options.unique_together {
            let cols = group
                .iter()
                .map(|c| self.dialect.quote(c))
                .collect::<Vec<_>>()
                .join(", ");
            clauses.push(format!(
                "CONSTRAINT {} UNIQUE ({cols})",
                self.dialect.quote(&Self::uniq_together_name(table, group))
            ));
        }

        let mut statements = vec![format!(
            "CREATE TABLE {} ({})",
            self.dialect.quote(table),
            clauses.join(", ")
        )];

        for field in &model.fields {
            if field.db_index && !field.unique && field.field_type.has_column() {
                statements.push(self.dialect.create_index(
                    &Self::idx_name(table, &field.column),
                    table,
                    &[field.column.clone()],
                    false,
                ));
            }
        }
        for index in &model.options.indexes {
            statements
                .push(self.dialect.create_index(&index.name, table, &index.fields, index.unique));
        }
        for trigger in &model.options.triggers {
            statements.push(trigger.sql.clone());
        }

        for field in &model.fields {
            statements.extend(self.create_m2m_through(state, model, field)?);
        }

        Ok(statements)
    }

    /// DDL for dropping a model: auto-created through-tables first, then
    /// the table itself.
    pub fn delete_model(&self, state: &ProjectState, name: &str) -> MigrateResult<Vec<String>> {
        let model = state.require_model(name)?;
        let mut statements = Vec::new();
        for field in &model.fields {
            statements.extend(self.drop_m2m_through(model, field));
        }
        statements.push(format!("DROP TABLE {}", self.dialect.quote(model.table())));
        Ok(statements)
    }

    /// DDL for renaming a model's table.
    pub fn rename_table(&self, old: &str, new: &str) -> Vec<String> {
        vec![self.dialect.rename_table(old, new)]
    }

    /// DDL for moving between two `unique_together` configurations:
    /// drop the groups that disappeared, add the new ones.
    pub fn alter_unique_together(
        &self,
        table: &str,
        old: &[Vec<String>],
        new: &[Vec<String>],
    ) -> Vec<String> {
        let mut statements = Vec::new();
        for group in old {
            if !new.contains(group) {
                statements.push(
                    self.dialect
                        .drop_unique(table, &Self::uniq_together_name(table, group)),
                );
            }
        }
        for group in new {
            if !old.contains(group) {
                let cols = group
                    .iter()
                    .map(|c| self.dialect.quote(c))
                    .collect::<Vec<_>>()
                    .join(", ");
                statements.push(format!(
                    "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({cols})",
                    self.dialect.quote(table),
                    self.dialect.quote(&Self::uniq_together_name(table, group))
                ));
            }
        }
        statements
    }

    // ── Field-level changes ─────────────────────────────────────────

    /// DDL for adding one field to an existing model.
    pub fn add_field(
        &self,
        state: &ProjectState,
        model_name: &str,
        field: &FieldDef,
    ) -> MigrateResult<Vec<String>> {
        let model = state.require_model(model_name)?;
        let table = model.table();

        if field.field_type.is_many_to_many() {
            return self.create_m2m_through(state, model, field);
        }

        let mut statements = vec![format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.dialect.quote(table),
            self.column_def(state, field)?
        )];

        if let FieldType::ForeignKey {
            to,
            on_delete,
            db_constraint: true,
        } = &field.field_type
        {
            let (ref_table, ref_column) = self.fk_target(state, to)?;
            statements.push(self.dialect.add_foreign_key(
                table,
                &Self::fk_name(table, &field.column),
                &field.column,
                &ref_table,
                &ref_column,
                *on_delete,
            ));
        }
        if field.db_index && !field.unique {
            statements.push(self.dialect.create_index(
                &Self::idx_name(table, &field.column),
                table,
                &[field.column.clone()],
                false,
            ));
        }
        Ok(statements)
    }

    /// DDL for removing one field. A constrained relation drops its FK
    /// constraint before the column goes.
    pub fn remove_field(
        &self,
        state: &ProjectState,
        model_name: &str,
        field_name: &str,
    ) -> MigrateResult<Vec<String>> {
        let model = state.require_model(model_name)?;
        let table = model.table();
        let field = model.field(field_name).ok_or_else(|| MigrateError::UnknownField {
            model: model_name.to_string(),
            field: field_name.to_string(),
        })?;

        if field.field_type.is_many_to_many() {
            return Ok(self.drop_m2m_through(model, field));
        }

        let mut statements = Vec::new();
        if matches!(
            field.field_type,
            FieldType::ForeignKey {
                db_constraint: true,
                ..
            }
        ) {
            statements.push(
                self.dialect
                    .drop_foreign_key(table, &Self::fk_name(table, &field.column)),
            );
        }
        statements.push(format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.dialect.quote(table),
            self.dialect.quote(&field.column)
        ));
        Ok(statements)
    }

    /// DDL for renaming a column.
    pub fn rename_column(&self, table: &str, old: &str, new: &str) -> Vec<String> {
        vec![self.dialect.rename_column(table, old, new)]
    }

    /// DDL for altering one field in place.
    ///
    /// The step order below is load-bearing; each step is independently
    /// skippable but their relative order must not change.
    pub fn alter_field(
        &self,
        state: &ProjectState,
        model_name: &str,
        old: &FieldDef,
        new: &FieldDef,
    ) -> MigrateResult<Vec<String>> {
        let model = state.require_model(model_name)?;
        let table = model.table();

        let old_concrete = old.field_type.has_column();
        let new_concrete = new.field_type.has_column();
        if !old_concrete || !new_concrete {
            return self.alter_m2m(model, model_name, old, new);
        }

        let old_type = self.column_type(state, old)?;
        let new_type = self.column_type(state, new)?;
        let type_changed = old_type != new_type;

        let mut statements = Vec::new();
        let mut dropped_fks = false;
        let mut dropped_reverse: Vec<ReverseFk> = Vec::new();

        // 1. Drop the existing FK constraint.
        if matches!(
            old.field_type,
            FieldType::ForeignKey {
                db_constraint: true,
                ..
            }
        ) {
            statements.push(
                self.dialect
                    .drop_foreign_key(table, &Self::fk_name(table, &old.column)),
            );
            dropped_fks = true;
        }

        // 2. Drop the unique constraint.
        if (old.unique && !new.unique) || (!old.primary_key && new.primary_key && old.unique) {
            statements.push(
                self.dialect
                    .drop_unique(table, &Self::uniq_name(table, &old.column)),
            );
        }

        // 3. A type change on a primary key invalidates every FK
        //    pointing at it; drop them all.
        if old.primary_key && new.primary_key && type_changed {
            for other in state.models.values() {
                for field in &other.fields {
                    if let FieldType::ForeignKey {
                        to,
                        on_delete,
                        db_constraint: true,
                    } = &field.field_type
                    {
                        if to.to_lowercase() == model.name {
                            let other_table = other.table().to_string();
                            statements.push(self.dialect.drop_foreign_key(
                                &other_table,
                                &Self::fk_name(&other_table, &field.column),
                            ));
                            dropped_reverse.push((other_table, field.column.clone(), *on_delete));
                        }
                    }
                }
            }
        }

        // 4. Drop the index, unless a unique constraint covers it.
        if old.db_index && !new.db_index && !old.unique && !new.unique {
            statements.push(
                self.dialect
                    .drop_index(table, &Self::idx_name(table, &old.column)),
            );
        }

        // 5. Rename the column.
        if old.column != new.column {
            statements.push(self.dialect.rename_column(table, &old.column, &new.column));
        }
        let column = new.column.as_str();

        // 6. Type, nullability, and default changes. Backfill happens in
        //    a separate pass before NOT NULL so no existing row violates
        //    the constraint mid-migration.
        if type_changed {
            statements.extend(self.dialect.alter_column_type(table, column, &new_type));
        }
        if old.null && !new.null {
            if let Some(default) = &new.default {
                statements.push(format!(
                    "UPDATE {} SET {} = {} WHERE {} IS NULL",
                    self.dialect.quote(table),
                    self.dialect.quote(column),
                    default.to_sql_literal(),
                    self.dialect.quote(column)
                ));
            }
            statements.extend(self.dialect.set_not_null(table, column, &new_type));
        } else if !old.null && new.null {
            statements.extend(self.dialect.drop_not_null(table, column, &new_type));
        }
        if new.default != old.default {
            match &new.default {
                Some(default) => statements.extend(self.dialect.set_default(
                    table,
                    column,
                    &default.to_sql_literal(),
                )),
                None => statements.extend(self.dialect.drop_default(table, column)),
            }
        }

        // 7. Re-add the unique constraint.
        if (!old.unique && new.unique) || (old.primary_key && !new.primary_key && new.unique) {
            statements.push(
                self.dialect
                    .add_unique(table, &Self::uniq_name(table, column), column),
            );
        }

        // 8. Re-add the index.
        if !old.db_index && new.db_index && !new.unique {
            statements.push(self.dialect.create_index(
                &Self::idx_name(table, column),
                table,
                &[column.to_string()],
                false,
            ));
        }

        // 9. Re-add the FK constraint.
        let old_constrained = matches!(
            old.field_type,
            FieldType::ForeignKey {
                db_constraint: true,
                ..
            }
        );
        if let FieldType::ForeignKey {
            to,
            on_delete,
            db_constraint: true,
        } = &new.field_type
        {
            if dropped_fks || !old_constrained {
                let (ref_table, ref_column) = self.fk_target(state, to)?;
                statements.push(self.dialect.add_foreign_key(
                    table,
                    &Self::fk_name(table, column),
                    column,
                    &ref_table,
                    &ref_column,
                    *on_delete,
                ));
            }
        }

        // 10. Re-create the reverse FKs dropped in step 3, now pointing
        //     at the altered column.
        for (other_table, other_column, on_delete) in dropped_reverse {
            statements.push(self.dialect.add_foreign_key(
                &other_table,
                &Self::fk_name(&other_table, &other_column),
                &other_column,
                table,
                column,
                on_delete,
            ));
        }

        Ok(statements)
    }

    /// The many-to-many alteration path: only an auto-created through
    /// table can be renamed; everything else is a no-op or malformed.
    fn alter_m2m(
        &self,
        model: &ModelState,
        model_name: &str,
        old: &FieldDef,
        new: &FieldDef,
    ) -> MigrateResult<Vec<String>> {
        let old_through = match &old.field_type {
            FieldType::ManyToMany { through, .. } => Some(through),
            _ => None,
        };
        let new_through = match &new.field_type {
            FieldType::ManyToMany { through, .. } => Some(through),
            _ => None,
        };
        match (old_through, new_through) {
            (Some(None), Some(None)) => {
                if old.name == new.name {
                    Ok(Vec::new())
                } else {
                    let table = model.table();
                    Ok(vec![self.dialect.rename_table(
                        &Self::through_table(table, &old.name),
                        &Self::through_table(table, &new.name),
                    )])
                }
            }
            // Explicit through-models own their table; nothing to do here.
            (Some(Some(_)), Some(Some(_))) => Ok(Vec::new()),
            _ => Err(MigrateError::IncompatibleFieldTypes {
                model: model_name.to_string(),
                field: new.name.clone(),
                reason: "cannot alter between a concrete column and a many-to-many relation"
                    .to_string(),
            }),
        }
    }

    // ── Many-to-many through-tables ─────────────────────────────────

    /// DDL for the auto-created join table behind a many-to-many field.
    /// Explicit through-models produce nothing; their model owns the
    /// table.
    pub fn create_m2m_through(
        &self,
        state: &ProjectState,
        model: &ModelState,
        field: &FieldDef,
    ) -> MigrateResult<Vec<String>> {
        let FieldType::ManyToMany { to, through: None } = &field.field_type else {
            return Ok(Vec::new());
        };
        let table = model.table();
        let through = Self::through_table(table, &field.name);
        let (target_table, target_pk) = self.fk_target(state, to)?;
        let own_pk = model
            .primary_key()
            .map_or_else(|| "id".to_string(), |f| f.column.clone());

        let from_col = format!("{}_id", model.name);
        let to_col = format!("{}_id", to.to_lowercase());
        let fk_type = self.dialect.column_type(&FieldType::BigInteger);

        let stmt = format!(
            "CREATE TABLE {} ({} {}, {} {fk_type} NOT NULL, {} {fk_type} NOT NULL, \
             CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE CASCADE, \
             CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE CASCADE, \
             UNIQUE ({}, {}))",
            self.dialect.quote(&through),
            self.dialect.quote("id"),
            self.dialect.auto_pk_sql(),
            self.dialect.quote(&from_col),
            self.dialect.quote(&to_col),
            self.dialect.quote(&Self::fk_name(&through, &from_col)),
            self.dialect.quote(&from_col),
            self.dialect.quote(table),
            self.dialect.quote(&own_pk),
            self.dialect.quote(&Self::fk_name(&through, &to_col)),
            self.dialect.quote(&to_col),
            self.dialect.quote(&target_table),
            self.dialect.quote(&target_pk),
            self.dialect.quote(&from_col),
            self.dialect.quote(&to_col),
        );
        Ok(vec![stmt])
    }

    /// DDL for dropping an auto-created join table.
    pub fn drop_m2m_through(&self, model: &ModelState, field: &FieldDef) -> Vec<String> {
        if let FieldType::ManyToMany { through: None, .. } = &field.field_type {
            let through = Self::through_table(model.table(), &field.name);
            vec![format!("DROP TABLE {}", self.dialect.quote(&through))]
        } else {
            Vec::new()
        }
    }

    // ── Triggers ────────────────────────────────────────────────────

    /// Trigger creation is raw SQL carried by the trigger definition.
    pub fn create_triggers(&self, triggers: &[girder_model::TriggerDef]) -> Vec<String> {
        triggers.iter().map(|t| t.sql.clone()).collect()
    }

    /// DDL for dropping triggers by name.
    pub fn drop_triggers(&self, table: &str, names: &[String]) -> Vec<String> {
        names
            .iter()
            .map(|name| self.dialect.drop_trigger(name, table))
            .collect()
    }
}
