//! Core error types for the girder migration engine.
//!
//! This module provides a single error enum [`MigrateError`] covering graph
//! integrity, planning, schema, and execution failures, plus carriers for
//! I/O, serialization, and database errors.

use thiserror::Error;

/// The primary error type for the girder migration engine.
///
/// Variants are grouped by where they arise: building the dependency graph,
/// computing plans, generating schema DDL, and executing against a database.
#[derive(Error, Debug)]
pub enum MigrateError {
    // ── Graph integrity ──────────────────────────────────────────────

    /// A migration was registered twice under the same name.
    #[error("Migration '{0}' is already registered in the graph")]
    DuplicateNode(String),

    /// A dependency refers to a migration the graph does not contain.
    #[error("Migration '{wanted_by}' depends on '{missing}', which is not in the graph")]
    UnknownNode {
        /// The dependency name that could not be found.
        missing: String,
        /// The migration whose dependency list referenced it.
        wanted_by: String,
    },

    /// A migration name was looked up directly and not found.
    #[error("Migration '{0}' not found in the graph")]
    NodeNotFound(String),

    /// The dependency graph contains a cycle.
    #[error("Cyclic dependency detected involving migration '{0}'")]
    CyclicDependency(String),

    /// The applied-migrations ledger contradicts the graph, e.g. a
    /// migration is recorded as applied while one of its ancestors is not.
    #[error("Migration '{applied}' is applied before its dependency '{unapplied}'")]
    ConflictingHistory {
        /// The migration recorded as applied.
        applied: String,
        /// Its ancestor that is missing from the ledger.
        unapplied: String,
    },

    // ── Planning ─────────────────────────────────────────────────────

    /// A target prefix matched zero or several migration names.
    #[error("Target '{prefix}' matched {count} migrations; expected exactly one")]
    AmbiguousTarget {
        /// The prefix the caller asked for.
        prefix: String,
        /// How many names it matched.
        count: usize,
    },

    /// A single plan would both apply and unapply migrations.
    #[error("Migration plan mixes apply and unapply steps; run the targets separately")]
    MixedPlan,

    /// The migrations directory holds more than one leaf, so new migrations
    /// cannot be numbered unambiguously.
    #[error("Conflicting migration leaves: {}", .0.join(", "))]
    ConflictingLeaves(Vec<String>),

    // ── Schema ───────────────────────────────────────────────────────

    /// An operation referenced a model absent from the project state.
    #[error("Model '{0}' does not exist in the project state")]
    UnknownModel(String),

    /// An operation referenced a field absent from its model.
    #[error("Field '{field}' does not exist on model '{model}'")]
    UnknownField {
        /// The model searched.
        model: String,
        /// The missing field name.
        field: String,
    },

    /// An alteration moved a field between kinds that cannot share DDL,
    /// e.g. a concrete column and a many-to-many accessor.
    #[error("Cannot alter field '{field}' on '{model}': {reason}")]
    IncompatibleFieldTypes {
        /// The model holding the field.
        model: String,
        /// The field being altered.
        field: String,
        /// Why the alteration is impossible.
        reason: String,
    },

    /// A backwards plan reached an operation with no reverse.
    #[error("Operation '{0}' is not reversible")]
    IrreversibleOperation(String),

    // ── Execution ────────────────────────────────────────────────────

    /// An operation's DDL failed against the database. The migration is not
    /// recorded in the ledger when this is returned.
    #[error("Migration '{migration}' failed at operation '{operation}': {reason}")]
    OperationFailed {
        /// The migration being applied or unapplied.
        migration: String,
        /// The operation's human description.
        operation: String,
        /// The underlying failure.
        reason: String,
    },

    /// A generic database error from the backend.
    #[error("Database error: {0}")]
    Database(String),

    // ── Carriers ─────────────────────────────────────────────────────

    /// An I/O error while reading or writing migration files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A migration file could not be parsed or written.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A convenience type alias for `Result<T, MigrateError>`.
pub type MigrateResult<T> = Result<T, MigrateError>;
