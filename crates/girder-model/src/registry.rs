//! Model metadata and the explicit model registry.
//!
//! A [`Registry`] is an owned object the caller builds and passes around;
//! there is no process-wide registry. The migration engine diffs a registry
//! against replayed history, and historical project states can build a
//! transient registry of their own for relation resolution.

use std::collections::BTreeMap;

use crate::fields::FieldDef;

/// A named composite index declaration.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct IndexDef {
    /// The index name as it appears in the database.
    pub name: String,
    /// The field names covered, in order.
    pub fields: Vec<String>,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
}

/// A database trigger attached to a model's table.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TriggerDef {
    /// The trigger name.
    pub name: String,
    /// The full CREATE TRIGGER statement.
    pub sql: String,
}

/// Table-level options for a model.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModelOptions {
    /// Explicit table name; `None` means the model name is used.
    pub db_table: Option<String>,
    /// Sets of field names that must be jointly unique.
    pub unique_together: Vec<Vec<String>>,
    /// Composite index declarations.
    pub indexes: Vec<IndexDef>,
    /// Triggers owned by this model's table.
    pub triggers: Vec<TriggerDef>,
}

/// Metadata describing one declared model.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModelMeta {
    /// The model name (conventionally lower-case singular).
    pub name: String,
    /// The model's forward-declared fields, in declaration order.
    pub fields: Vec<FieldDef>,
    /// Table-level options.
    pub options: ModelOptions,
}

impl ModelMeta {
    /// Creates model metadata with default options.
    pub fn new(name: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        Self {
            name: name.into(),
            fields,
            options: ModelOptions::default(),
        }
    }

    /// Sets the table-level options.
    #[must_use]
    pub fn options(mut self, options: ModelOptions) -> Self {
        self.options = options;
        self
    }

    /// The table name: `db_table` when set, otherwise the model name.
    pub fn table(&self) -> &str {
        self.options.db_table.as_deref().unwrap_or(&self.name)
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The primary key field, if one is declared.
    pub fn primary_key(&self) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.primary_key)
    }
}

/// An explicit collection of model declarations.
///
/// Registries are cheap owned values; build one per migration run (or per
/// historical state) rather than sharing a global.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    models: BTreeMap<String, ModelMeta>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a model, replacing any previous declaration of the same
    /// name.
    pub fn register(&mut self, meta: ModelMeta) {
        self.models.insert(meta.name.to_lowercase(), meta);
    }

    /// Looks up a model by name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&ModelMeta> {
        self.models.get(&name.to_lowercase())
    }

    /// All registered models, sorted by name.
    pub fn models(&self) -> impl Iterator<Item = &ModelMeta> {
        self.models.values()
    }

    /// The number of registered models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether the registry holds no models.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
