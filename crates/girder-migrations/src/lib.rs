//! # girder-migrations
//!
//! The migration engine: detects schema changes, records them as JSON
//! migration files, and replays them against a database.
//!
//! ## Modules
//!
//! - [`state`] - Project/model snapshots replayed from history
//! - [`autodetector`] - Diffs two snapshots into operations
//! - [`questioner`] - The policy boundary for ambiguous diffs
//! - [`operations`] - The closed set of schema operations
//! - [`migration`] - The named operation list with dependencies
//! - [`serializer`] - Migration files on disk
//! - [`graph`] - The migration dependency DAG
//! - [`loader`] - Directory discovery and graph assembly
//! - [`dialect`] / [`schema_editor`] - Operations rendered as vendor SQL
//! - [`executor`] - Plans, the applied-migrations ledger, and DDL runs
//! - [`commands`] - `make_migrations` / `migrate` entry points

pub mod autodetector;
pub mod commands;
pub mod dialect;
pub mod executor;
pub mod graph;
pub mod loader;
pub mod migration;
pub mod operations;
pub mod questioner;
pub mod schema_editor;
pub mod serializer;
pub mod state;

pub use autodetector::AutoDetector;
pub use executor::{MigrationExecutor, MigrationRecorder, PlanStep};
pub use graph::MigrationGraph;
pub use loader::MigrationLoader;
pub use migration::Migration;
pub use operations::Operation;
pub use questioner::{NonInteractiveQuestioner, Questioner, ScriptedQuestioner};
pub use schema_editor::SchemaEditor;
pub use state::{ModelState, ProjectState};
