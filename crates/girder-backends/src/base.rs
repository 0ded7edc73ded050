//! Base database backend trait and the generic result row.

use girder_core::MigrateError;
use girder_model::Value;

/// One result row: column names paired positionally with values.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    /// Creates a row from parallel column and value vectors.
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Looks up a value by column name.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    /// Looks up a value by position.
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// The column names, in result order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

/// The core trait for database backends.
///
/// All methods are async; backends over synchronous drivers (like
/// `rusqlite`) wrap their work in `spawn_blocking` to keep the interface
/// uniform.
#[async_trait::async_trait]
pub trait DatabaseBackend: Send + Sync {
    /// Returns the vendor name (e.g. "sqlite", "postgresql").
    fn vendor(&self) -> &str;

    /// Whether DDL statements participate in transactions on this engine.
    /// When true, the executor wraps each migration in BEGIN/COMMIT so a
    /// failed operation leaves no partial schema change behind.
    fn supports_transactional_ddl(&self) -> bool;

    /// Executes a SQL statement that does not return rows.
    ///
    /// Returns the number of rows affected.
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, MigrateError>;

    /// Executes a SQL query and returns all result rows.
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, MigrateError>;

    /// Begins a transaction.
    async fn begin(&self) -> Result<(), MigrateError>;

    /// Commits the current transaction.
    async fn commit(&self) -> Result<(), MigrateError>;

    /// Rolls back the current transaction.
    async fn rollback(&self) -> Result<(), MigrateError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_lookup_by_name_and_index() {
        let row = Row::new(
            vec!["id".into(), "name".into()],
            vec![Value::Int(1), Value::Text("alpha".into())],
        );
        assert_eq!(row.get("id"), Some(&Value::Int(1)));
        assert_eq!(row.get("name"), Some(&Value::Text("alpha".into())));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.get_index(1), Some(&Value::Text("alpha".into())));
        assert_eq!(row.get_index(5), None);
    }
}
