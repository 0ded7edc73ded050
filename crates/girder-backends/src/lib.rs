//! # girder-backends
//!
//! The database connection boundary for the girder migration engine.
//!
//! ## Modules
//!
//! - [`base`] - The async [`DatabaseBackend`] trait and the generic [`Row`]
//! - [`collector`] - An in-memory backend that records statements; used for
//!   dry-runs and hermetic tests
//! - [`sqlite`] - A real backend over `rusqlite` (feature `sqlite`)

pub mod base;
pub mod collector;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use base::{DatabaseBackend, Row};
pub use collector::CollectingBackend;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;
