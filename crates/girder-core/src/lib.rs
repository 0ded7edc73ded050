//! # girder-core
//!
//! Shared foundation for the girder migration crates: the [`MigrateError`]
//! taxonomy every fallible API returns, and tracing-based logging setup.
//!
//! ## Modules
//!
//! - [`error`] - Error types and result alias
//! - [`logging`] - Tracing-based logging integration

pub mod error;
pub mod logging;

// Re-export the most commonly used types at the crate root.
pub use error::{MigrateError, MigrateResult};
pub use logging::{setup_logging, LogConfig};
