//! SQL dialect template methods.
//!
//! All orchestration (which statements to emit, in what order) lives in
//! [`SchemaEditor`](crate::schema_editor::SchemaEditor); a [`SqlDialect`]
//! only supplies the per-vendor syntax fragments. Default method bodies are
//! PostgreSQL-flavored; SQLite and MySQL override where they differ.
//!
//! SQLite cannot express several ALTERs without a table rebuild; for those
//! the dialect emits a `-- sqlite:` comment statement, which the executor
//! skips, so plans stay inspectable in dry-run output.

use girder_model::{FieldType, OnDelete};

/// Vendor-specific DDL syntax.
pub trait SqlDialect: Send + Sync + std::fmt::Debug {
    /// The dialect name ("postgresql", "sqlite", "mysql").
    fn name(&self) -> &'static str;

    /// Quotes an identifier.
    fn quote(&self, ident: &str) -> String {
        format!("\"{ident}\"")
    }

    /// The column type for a concrete (non-relation) field kind.
    ///
    /// Relation kinds are resolved to their storage kind by the editor
    /// before this is called.
    fn column_type(&self, field_type: &FieldType) -> String;

    /// The full column suffix for the auto primary key, type and
    /// constraints included.
    fn auto_pk_sql(&self) -> &'static str;

    /// Changes a column's type.
    fn alter_column_type(&self, table: &str, column: &str, new_type: &str) -> Vec<String> {
        vec![format!(
            "ALTER TABLE {} ALTER COLUMN {} TYPE {new_type}",
            self.quote(table),
            self.quote(column)
        )]
    }

    /// Adds NOT NULL to a column. `column_type` is supplied for dialects
    /// whose modify syntax restates the type.
    fn set_not_null(&self, table: &str, column: &str, column_type: &str) -> Vec<String> {
        let _ = column_type;
        vec![format!(
            "ALTER TABLE {} ALTER COLUMN {} SET NOT NULL",
            self.quote(table),
            self.quote(column)
        )]
    }

    /// Removes NOT NULL from a column.
    fn drop_not_null(&self, table: &str, column: &str, column_type: &str) -> Vec<String> {
        let _ = column_type;
        vec![format!(
            "ALTER TABLE {} ALTER COLUMN {} DROP NOT NULL",
            self.quote(table),
            self.quote(column)
        )]
    }

    /// Sets a column default. `literal` is already rendered SQL.
    fn set_default(&self, table: &str, column: &str, literal: &str) -> Vec<String> {
        vec![format!(
            "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {literal}",
            self.quote(table),
            self.quote(column)
        )]
    }

    /// Drops a column default.
    fn drop_default(&self, table: &str, column: &str) -> Vec<String> {
        vec![format!(
            "ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT",
            self.quote(table),
            self.quote(column)
        )]
    }

    /// Adds a named foreign key constraint.
    fn add_foreign_key(
        &self,
        table: &str,
        constraint: &str,
        column: &str,
        ref_table: &str,
        ref_column: &str,
        on_delete: OnDelete,
    ) -> String {
        format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {}",
            self.quote(table),
            self.quote(constraint),
            self.quote(column),
            self.quote(ref_table),
            self.quote(ref_column),
            self.on_delete_sql(on_delete)
        )
    }

    /// Drops a named foreign key constraint.
    fn drop_foreign_key(&self, table: &str, constraint: &str) -> String {
        format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            self.quote(table),
            self.quote(constraint)
        )
    }

    /// Adds a named single-column unique constraint.
    fn add_unique(&self, table: &str, constraint: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({})",
            self.quote(table),
            self.quote(constraint),
            self.quote(column)
        )
    }

    /// Drops a named unique constraint.
    fn drop_unique(&self, table: &str, constraint: &str) -> String {
        format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            self.quote(table),
            self.quote(constraint)
        )
    }

    /// Creates an index.
    fn create_index(&self, index: &str, table: &str, columns: &[String], unique: bool) -> String {
        let cols = columns
            .iter()
            .map(|c| self.quote(c))
            .collect::<Vec<_>>()
            .join(", ");
        let kind = if unique { "UNIQUE INDEX" } else { "INDEX" };
        format!(
            "CREATE {kind} {} ON {} ({cols})",
            self.quote(index),
            self.quote(table)
        )
    }

    /// Drops an index.
    fn drop_index(&self, table: &str, index: &str) -> String {
        let _ = table;
        format!("DROP INDEX {}", self.quote(index))
    }

    /// Renames a column.
    fn rename_column(&self, table: &str, old: &str, new: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            self.quote(table),
            self.quote(old),
            self.quote(new)
        )
    }

    /// Renames a table.
    fn rename_table(&self, old: &str, new: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {}",
            self.quote(old),
            self.quote(new)
        )
    }

    /// Drops a trigger.
    fn drop_trigger(&self, trigger: &str, table: &str) -> String {
        format!(
            "DROP TRIGGER {} ON {}",
            self.quote(trigger),
            self.quote(table)
        )
    }

    /// The ON DELETE action keyword.
    fn on_delete_sql(&self, on_delete: OnDelete) -> &'static str {
        match on_delete {
            OnDelete::Cascade => "CASCADE",
            OnDelete::Protect => "RESTRICT",
            OnDelete::SetNull => "SET NULL",
            OnDelete::DoNothing => "NO ACTION",
        }
    }
}

/// PostgreSQL syntax. The trait defaults are already PostgreSQL-flavored.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    fn column_type(&self, field_type: &FieldType) -> String {
        match field_type {
            FieldType::BigAuto | FieldType::BigInteger | FieldType::ForeignKey { .. } => {
                "BIGINT".to_string()
            }
            FieldType::Char { max_length } => format!("VARCHAR({max_length})"),
            FieldType::Text => "TEXT".to_string(),
            FieldType::Integer => "INTEGER".to_string(),
            FieldType::SmallInteger => "SMALLINT".to_string(),
            FieldType::Float => "DOUBLE PRECISION".to_string(),
            FieldType::Decimal {
                max_digits,
                decimal_places,
            } => format!("NUMERIC({max_digits}, {decimal_places})"),
            FieldType::Boolean => "BOOLEAN".to_string(),
            FieldType::Date => "DATE".to_string(),
            FieldType::DateTime => "TIMESTAMP".to_string(),
            FieldType::Uuid => "UUID".to_string(),
            FieldType::Binary => "BYTEA".to_string(),
            FieldType::Json => "JSONB".to_string(),
            FieldType::ManyToMany { .. } => String::new(),
        }
    }

    fn auto_pk_sql(&self) -> &'static str {
        "BIGSERIAL PRIMARY KEY"
    }
}

/// SQLite syntax. Several ALTER forms require a table rebuild and are
/// emitted as skippable comment statements.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDialect;

impl SqliteDialect {
    fn rebuild_note(table: &str, detail: &str) -> Vec<String> {
        vec![format!("-- sqlite: table rebuild required on \"{table}\" to {detail}")]
    }
}

impl SqlDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn column_type(&self, field_type: &FieldType) -> String {
        match field_type {
            FieldType::BigAuto
            | FieldType::Integer
            | FieldType::BigInteger
            | FieldType::SmallInteger
            | FieldType::Boolean
            | FieldType::ForeignKey { .. } => "INTEGER".to_string(),
            FieldType::Char { .. }
            | FieldType::Text
            | FieldType::Date
            | FieldType::DateTime
            | FieldType::Uuid
            | FieldType::Json => "TEXT".to_string(),
            FieldType::Float => "REAL".to_string(),
            FieldType::Decimal { .. } => "NUMERIC".to_string(),
            FieldType::Binary => "BLOB".to_string(),
            FieldType::ManyToMany { .. } => String::new(),
        }
    }

    fn auto_pk_sql(&self) -> &'static str {
        "INTEGER PRIMARY KEY AUTOINCREMENT"
    }

    fn alter_column_type(&self, table: &str, column: &str, new_type: &str) -> Vec<String> {
        Self::rebuild_note(table, &format!("change \"{column}\" to {new_type}"))
    }

    fn set_not_null(&self, table: &str, column: &str, _column_type: &str) -> Vec<String> {
        Self::rebuild_note(table, &format!("make \"{column}\" NOT NULL"))
    }

    fn drop_not_null(&self, table: &str, column: &str, _column_type: &str) -> Vec<String> {
        Self::rebuild_note(table, &format!("make \"{column}\" nullable"))
    }

    fn set_default(&self, table: &str, column: &str, literal: &str) -> Vec<String> {
        Self::rebuild_note(table, &format!("set default {literal} on \"{column}\""))
    }

    fn drop_default(&self, table: &str, column: &str) -> Vec<String> {
        Self::rebuild_note(table, &format!("drop default on \"{column}\""))
    }

    fn drop_foreign_key(&self, table: &str, constraint: &str) -> String {
        format!("-- sqlite: table rebuild required on \"{table}\" to drop constraint \"{constraint}\"")
    }

    fn add_foreign_key(
        &self,
        table: &str,
        constraint: &str,
        _column: &str,
        _ref_table: &str,
        _ref_column: &str,
        _on_delete: OnDelete,
    ) -> String {
        format!("-- sqlite: table rebuild required on \"{table}\" to add constraint \"{constraint}\"")
    }

    fn add_unique(&self, table: &str, constraint: &str, column: &str) -> String {
        // Unique constraints are expressible as unique indexes.
        format!(
            "CREATE UNIQUE INDEX {} ON {} ({})",
            self.quote(constraint),
            self.quote(table),
            self.quote(column)
        )
    }

    fn drop_unique(&self, _table: &str, constraint: &str) -> String {
        format!("DROP INDEX {}", self.quote(constraint))
    }

    fn drop_trigger(&self, trigger: &str, _table: &str) -> String {
        format!("DROP TRIGGER {}", self.quote(trigger))
    }
}

/// MySQL syntax.
#[derive(Debug, Default, Clone, Copy)]
pub struct MySqlDialect;

impl SqlDialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote(&self, ident: &str) -> String {
        format!("`{ident}`")
    }

    fn column_type(&self, field_type: &FieldType) -> String {
        match field_type {
            FieldType::BigAuto | FieldType::BigInteger | FieldType::ForeignKey { .. } => {
                "BIGINT".to_string()
            }
            FieldType::Char { max_length } => format!("VARCHAR({max_length})"),
            FieldType::Text => "TEXT".to_string(),
            FieldType::Integer => "INT".to_string(),
            FieldType::SmallInteger => "SMALLINT".to_string(),
            FieldType::Float => "DOUBLE".to_string(),
            FieldType::Decimal {
                max_digits,
                decimal_places,
            } => format!("DECIMAL({max_digits}, {decimal_places})"),
            FieldType::Boolean => "TINYINT(1)".to_string(),
            FieldType::Date => "DATE".to_string(),
            FieldType::DateTime => "DATETIME".to_string(),
            FieldType::Uuid => "CHAR(36)".to_string(),
            FieldType::Binary => "BLOB".to_string(),
            FieldType::Json => "JSON".to_string(),
            FieldType::ManyToMany { .. } => String::new(),
        }
    }

    fn auto_pk_sql(&self) -> &'static str {
        "BIGINT AUTO_INCREMENT PRIMARY KEY"
    }

    fn alter_column_type(&self, table: &str, column: &str, new_type: &str) -> Vec<String> {
        vec![format!(
            "ALTER TABLE {} MODIFY {} {new_type}",
            self.quote(table),
            self.quote(column)
        )]
    }

    fn set_not_null(&self, table: &str, column: &str, column_type: &str) -> Vec<String> {
        vec![format!(
            "ALTER TABLE {} MODIFY {} {column_type} NOT NULL",
            self.quote(table),
            self.quote(column)
        )]
    }

    fn drop_not_null(&self, table: &str, column: &str, column_type: &str) -> Vec<String> {
        vec![format!(
            "ALTER TABLE {} MODIFY {} {column_type} NULL",
            self.quote(table),
            self.quote(column)
        )]
    }

    fn drop_foreign_key(&self, table: &str, constraint: &str) -> String {
        format!(
            "ALTER TABLE {} DROP FOREIGN KEY {}",
            self.quote(table),
            self.quote(constraint)
        )
    }

    fn drop_unique(&self, table: &str, constraint: &str) -> String {
        format!(
            "ALTER TABLE {} DROP INDEX {}",
            self.quote(table),
            self.quote(constraint)
        )
    }

    fn drop_index(&self, table: &str, index: &str) -> String {
        format!("DROP INDEX {} ON {}", self.quote(index), self.quote(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgres_types() {
        let d = PostgresDialect;
        assert_eq!(d.column_type(&FieldType::Char { max_length: 200 }), "VARCHAR(200)");
        assert_eq!(d.column_type(&FieldType::Json), "JSONB");
        assert_eq!(d.auto_pk_sql(), "BIGSERIAL PRIMARY KEY");
        assert_eq!(
            d.column_type(&FieldType::Decimal {
                max_digits: 10,
                decimal_places: 2
            }),
            "NUMERIC(10, 2)"
        );
    }

    #[test]
    fn test_sqlite_types_and_rebuild_notes() {
        let d = SqliteDialect;
        assert_eq!(d.column_type(&FieldType::Boolean), "INTEGER");
        assert_eq!(d.column_type(&FieldType::Char { max_length: 50 }), "TEXT");
        let stmts = d.alter_column_type("book", "title", "TEXT");
        assert_eq!(stmts.len(), 1);
        assert!(stmts[0].starts_with("-- sqlite:"));
    }

    #[test]
    fn test_mysql_syntax() {
        let d = MySqlDialect;
        assert_eq!(d.quote("book"), "`book`");
        assert_eq!(d.column_type(&FieldType::Boolean), "TINYINT(1)");
        assert_eq!(
            d.drop_foreign_key("book", "book_author_id_fk"),
            "ALTER TABLE `book` DROP FOREIGN KEY `book_author_id_fk`"
        );
        assert_eq!(
            d.set_not_null("book", "title", "VARCHAR(200)"),
            vec!["ALTER TABLE `book` MODIFY `title` VARCHAR(200) NOT NULL"]
        );
    }

    #[test]
    fn test_postgres_fk_statement() {
        let d = PostgresDialect;
        let sql = d.add_foreign_key(
            "book",
            "book_author_id_fk",
            "author_id",
            "author",
            "id",
            OnDelete::Cascade,
        );
        assert_eq!(
            sql,
            "ALTER TABLE \"book\" ADD CONSTRAINT \"book_author_id_fk\" FOREIGN KEY (\"author_id\") REFERENCES \"author\" (\"id\") ON DELETE CASCADE"
        );
    }

    #[test]
    fn test_on_delete_keywords() {
        let d = PostgresDialect;
        assert_eq!(d.on_delete_sql(OnDelete::Cascade), "CASCADE");
        assert_eq!(d.on_delete_sql(OnDelete::Protect), "RESTRICT");
        assert_eq!(d.on_delete_sql(OnDelete::SetNull), "SET NULL");
        assert_eq!(d.on_delete_sql(OnDelete::DoNothing), "NO ACTION");
    }
}
