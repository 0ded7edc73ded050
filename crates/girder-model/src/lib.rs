//! # girder-model
//!
//! The declared-model layer: field types and definitions, backend-agnostic
//! values, and the explicit model [`Registry`] the migration engine diffs
//! against.
//!
//! ## Modules
//!
//! - [`fields`] - Field types, `ON DELETE` behavior, and field definitions
//! - [`value`] - Backend-agnostic database values
//! - [`registry`] - Model metadata and the explicit registry object

pub mod fields;
pub mod registry;
pub mod value;

pub use fields::{FieldDef, FieldType, OnDelete};
pub use registry::{IndexDef, ModelMeta, ModelOptions, Registry, TriggerDef};
pub use value::Value;
