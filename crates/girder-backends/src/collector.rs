//! An in-memory backend that records every statement it is asked to run.
//!
//! [`CollectingBackend`] runs no real SQL. It exists so plans can be
//! dry-run and so executor behavior (ordering, atomicity, ledger writes)
//! can be tested without a live database. The one piece of state it does
//! keep is a toy applied-migrations ledger: inserts into and deletes from
//! the ledger table update a name set, and `SELECT name FROM` that table
//! answers from it, so repeated migrate runs against the same collector
//! see their own history. An optional failure trigger makes a chosen
//! statement error, for exercising abort paths.

use std::collections::BTreeSet;
use std::sync::Mutex;

use girder_core::MigrateError;
use girder_model::Value;

use crate::base::{DatabaseBackend, Row};

// Mirrors the migration executor's ledger table name.
const LEDGER_TABLE: &str = "girder_migrations";

/// Records executed SQL in memory instead of running it.
#[derive(Debug, Default)]
pub struct CollectingBackend {
    statements: Mutex<Vec<String>>,
    ledger: Mutex<BTreeSet<String>>,
    transactional: bool,
    fail_on: Option<String>,
}

impl CollectingBackend {
    /// Creates a collector that reports no transactional-DDL support.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a collector that reports transactional-DDL support, so the
    /// executor's BEGIN/COMMIT wrapping shows up in the recorded log.
    pub fn transactional() -> Self {
        Self {
            transactional: true,
            ..Self::default()
        }
    }

    /// Makes any statement containing `needle` fail with a database error.
    #[must_use]
    pub fn fail_on(mut self, needle: impl Into<String>) -> Self {
        self.fail_on = Some(needle.into());
        self
    }

    /// All statements seen so far, in execution order.
    pub fn executed(&self) -> Vec<String> {
        self.statements
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Names currently in the toy ledger, sorted.
    pub fn ledger(&self) -> Vec<String> {
        self.ledger
            .lock()
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Tracks ledger-table inserts and deletes by the name parameter.
    fn apply_ledger(&self, sql: &str, params: &[Value]) {
        let Some(name) = params.iter().find_map(Value::as_text) else {
            return;
        };
        if let Ok(mut ledger) = self.ledger.lock() {
            if sql.starts_with(&format!("INSERT INTO {LEDGER_TABLE}")) {
                ledger.insert(name.to_string());
            } else if sql.starts_with(&format!("DELETE FROM {LEDGER_TABLE}")) {
                ledger.remove(name);
            }
        }
    }

    fn record(&self, sql: &str) -> Result<(), MigrateError> {
        if let Some(needle) = &self.fail_on {
            if sql.contains(needle.as_str()) {
                return Err(MigrateError::Database(format!(
                    "simulated failure on: {sql}"
                )));
            }
        }
        if let Ok(mut stmts) = self.statements.lock() {
            stmts.push(sql.to_string());
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DatabaseBackend for CollectingBackend {
    fn vendor(&self) -> &str {
        "collector"
    }

    fn supports_transactional_ddl(&self) -> bool {
        self.transactional
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, MigrateError> {
        self.record(sql)?;
        self.apply_ledger(sql, params);
        Ok(0)
    }

    async fn query(&self, sql: &str, _params: &[Value]) -> Result<Vec<Row>, MigrateError> {
        self.record(sql)?;
        if sql.starts_with(&format!("SELECT name FROM {LEDGER_TABLE}")) {
            let names = self.ledger();
            return Ok(names
                .into_iter()
                .map(|name| Row::new(vec!["name".to_string()], vec![Value::Text(name)]))
                .collect());
        }
        Ok(Vec::new())
    }

    async fn begin(&self) -> Result<(), MigrateError> {
        self.record("BEGIN")?;
        Ok(())
    }

    async fn commit(&self) -> Result<(), MigrateError> {
        self.record("COMMIT")?;
        Ok(())
    }

    async fn rollback(&self) -> Result<(), MigrateError> {
        self.record("ROLLBACK")?;
        Ok(())
    }
}
