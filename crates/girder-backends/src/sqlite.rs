//! SQLite database backend using `rusqlite`.
//!
//! All operations run via `tokio::task::spawn_blocking` so the synchronous
//! driver never blocks the async runtime. WAL mode and foreign-key
//! enforcement are enabled on open.

use std::path::PathBuf;
use std::sync::Arc;

use girder_core::MigrateError;
use girder_model::Value;
use tokio::sync::Mutex;

use crate::base::{DatabaseBackend, Row};

/// A SQLite backend over a single `rusqlite` connection guarded by an
/// async mutex.
pub struct SqliteBackend {
    path: PathBuf,
    conn: Arc<Mutex<rusqlite::Connection>>,
}

impl SqliteBackend {
    /// Opens a SQLite database at the given path. `:memory:` creates an
    /// in-memory database.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, MigrateError> {
        let path = path.into();
        let conn = if path.to_str() == Some(":memory:") {
            rusqlite::Connection::open_in_memory()
        } else {
            rusqlite::Connection::open(&path)
        }
        .map_err(|e| MigrateError::Database(format!("SQLite open failed: {e}")))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| MigrateError::Database(format!("Failed to set pragmas: {e}")))?;

        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory database.
    pub fn memory() -> Result<Self, MigrateError> {
        Self::open(":memory:")
    }

    /// Returns the database file path.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn bind_params(
        stmt: &mut rusqlite::Statement<'_>,
        params: &[Value],
    ) -> Result<(), MigrateError> {
        for (i, param) in params.iter().enumerate() {
            let idx = i + 1;
            match param {
                Value::Null => stmt.raw_bind_parameter(idx, rusqlite::types::Null),
                Value::Bool(b) => stmt.raw_bind_parameter(idx, b),
                Value::Int(v) => stmt.raw_bind_parameter(idx, v),
                Value::Float(v) => stmt.raw_bind_parameter(idx, v),
                Value::Text(s) => stmt.raw_bind_parameter(idx, s.as_str()),
                Value::Bytes(b) => stmt.raw_bind_parameter(idx, b.as_slice()),
                Value::Date(d) => stmt.raw_bind_parameter(idx, d.to_string().as_str()),
                Value::DateTime(dt) => {
                    stmt.raw_bind_parameter(idx, dt.to_rfc3339().as_str())
                }
                Value::Uuid(u) => stmt.raw_bind_parameter(idx, u.to_string().as_str()),
                Value::Json(j) => stmt.raw_bind_parameter(idx, j.to_string().as_str()),
            }
            .map_err(|e| MigrateError::Database(format!("Bind error: {e}")))?;
        }
        Ok(())
    }

    fn convert_row(sqlite_row: &rusqlite::Row<'_>, column_names: &[String]) -> Row {
        let values: Vec<Value> = (0..column_names.len())
            .map(|i| {
                let val_ref = sqlite_row
                    .get_ref(i)
                    .unwrap_or(rusqlite::types::ValueRef::Null);
                match val_ref {
                    rusqlite::types::ValueRef::Null => Value::Null,
                    rusqlite::types::ValueRef::Integer(v) => Value::Int(v),
                    rusqlite::types::ValueRef::Real(v) => Value::Float(v),
                    rusqlite::types::ValueRef::Text(b) => {
                        Value::Text(String::from_utf8_lossy(b).to_string())
                    }
                    rusqlite::types::ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
                }
            })
            .collect();

        Row::new(column_names.to_vec(), values)
    }
}

#[async_trait::async_trait]
impl DatabaseBackend for SqliteBackend {
    fn vendor(&self) -> &str {
        "sqlite"
    }

    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, MigrateError> {
        let conn = self.conn.clone();
        let sql = sql.to_string();
        let params = params.to_vec();

        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| MigrateError::Database(format!("{e}")))?;
            Self::bind_params(&mut stmt, &params)?;
            let count = stmt
                .raw_execute()
                .map_err(|e| MigrateError::Database(format!("{e}")))?;
            Ok(count as u64)
        })
        .await
        .map_err(|e| MigrateError::Database(format!("Task join error: {e}")))?
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, MigrateError> {
        let conn = self.conn.clone();
        let sql = sql.to_string();
        let params = params.to_vec();

        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| MigrateError::Database(format!("{e}")))?;

            let column_names: Vec<String> =
                stmt.column_names().into_iter().map(String::from).collect();

            Self::bind_params(&mut stmt, &params)?;

            let mut raw_rows = stmt.raw_query();
            let mut rows = Vec::new();
            while let Some(row) = raw_rows
                .next()
                .map_err(|e| MigrateError::Database(format!("{e}")))?
            {
                rows.push(Self::convert_row(row, &column_names));
            }
            Ok(rows)
        })
        .await
        .map_err(|e| MigrateError::Database(format!("Task join error: {e}")))?
    }

    async fn begin(&self) -> Result<(), MigrateError> {
        self.execute("BEGIN", &[]).await?;
        Ok(())
    }

    async fn commit(&self) -> Result<(), MigrateError> {
        self.execute("COMMIT", &[]).await?;
        Ok(())
    }

    async fn rollback(&self) -> Result<(), MigrateError> {
        self.execute("ROLLBACK", &[]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_open() {
        let backend = SqliteBackend::memory().unwrap();
        assert_eq!(backend.vendor(), "sqlite");
        assert!(backend.supports_transactional_ddl());
        assert_eq!(backend.path().to_str().unwrap(), ":memory:");
    }

    #[tokio::test]
    async fn test_create_insert_query() {
        let backend = SqliteBackend::memory().unwrap();
        backend
            .execute(
                "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, age INTEGER)",
                &[],
            )
            .await
            .unwrap();

        backend
            .execute(
                "INSERT INTO users (name, age) VALUES (?, ?)",
                &[Value::from("Alice"), Value::from(30)],
            )
            .await
            .unwrap();

        let rows = backend
            .query("SELECT id, name, age FROM users", &[])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("name"), Some(&Value::Text("Alice".into())));
        assert_eq!(rows[0].get("age"), Some(&Value::Int(30)));
    }

    #[tokio::test]
    async fn test_null_round_trip() {
        let backend = SqliteBackend::memory().unwrap();
        backend
            .execute("CREATE TABLE t (id INTEGER PRIMARY KEY, bio TEXT)", &[])
            .await
            .unwrap();
        backend
            .execute("INSERT INTO t (bio) VALUES (?)", &[Value::Null])
            .await
            .unwrap();

        let rows = backend.query("SELECT bio FROM t", &[]).await.unwrap();
        assert_eq!(rows[0].get("bio"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_blob_round_trip() {
        let backend = SqliteBackend::memory().unwrap();
        backend
            .execute("CREATE TABLE t (id INTEGER PRIMARY KEY, data BLOB)", &[])
            .await
            .unwrap();

        let blob = vec![0xDE_u8, 0xAD, 0xBE, 0xEF];
        backend
            .execute(
                "INSERT INTO t (data) VALUES (?)",
                &[Value::Bytes(blob.clone())],
            )
            .await
            .unwrap();

        let rows = backend.query("SELECT data FROM t", &[]).await.unwrap();
        assert_eq!(rows[0].get("data"), Some(&Value::Bytes(blob)));
    }

    #[tokio::test]
    async fn test_transaction_rollback_discards() {
        let backend = SqliteBackend::memory().unwrap();
        backend
            .execute("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)", &[])
            .await
            .unwrap();

        backend.begin().await.unwrap();
        backend
            .execute("INSERT INTO t (v) VALUES (?)", &[Value::from("x")])
            .await
            .unwrap();
        backend.rollback().await.unwrap();

        let rows = backend.query("SELECT v FROM t", &[]).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_ddl_inside_transaction_rolls_back() {
        let backend = SqliteBackend::memory().unwrap();
        backend.begin().await.unwrap();
        backend
            .execute("CREATE TABLE phantom (id INTEGER PRIMARY KEY)", &[])
            .await
            .unwrap();
        backend.rollback().await.unwrap();

        let rows = backend
            .query(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'phantom'",
                &[],
            )
            .await
            .unwrap();
        assert!(rows.is_empty());
    }
}
