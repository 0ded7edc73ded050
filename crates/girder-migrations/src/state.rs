//! Project and model state: the in-memory snapshot of "what the schema
//! should look like" at some point in migration history.
//!
//! A [`ProjectState`] is built either by replaying migrations (see
//! [`MigrationGraph::project_state`](crate::graph::MigrationGraph::project_state))
//! or from a live [`Registry`]. Every piece of it is fully owned, so
//! `clone()` is a deep copy: mutating one snapshot can never leak into
//! another. The executor relies on that when it captures "before" snapshots
//! for rollback.

use std::collections::BTreeMap;

use girder_core::{MigrateError, MigrateResult};
use girder_model::{FieldDef, ModelMeta, ModelOptions, Registry};

/// A frozen description of one model: name, ordered fields, and
/// table-level options.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModelState {
    /// The normalized (lower-case) model name.
    pub name: String,
    /// The model's forward-declared fields, in declaration order.
    pub fields: Vec<FieldDef>,
    /// Table-level options.
    #[serde(default)]
    pub options: ModelOptions,
}

impl ModelState {
    /// Creates a model state with default options.
    pub fn new(name: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        Self {
            name: name.into().to_lowercase(),
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

    /// Builds a state from live model metadata.
    ///
    /// Concrete fields are always copied; relation fields only when
    /// `with_relations` is true. Reverse accessors are never captured
    /// because the registry only declares forward fields.
    pub fn from_meta(meta: &ModelMeta, with_relations: bool) -> Self {
        let fields = meta
            .fields
            .iter()
            .filter(|f| with_relations || !f.is_relation())
            .cloned()
            .collect();
        Self {
            name: meta.name.to_lowercase(),
            fields,
            options: meta.options.clone(),
        }
    }

    /// Converts back into live model metadata.
    pub fn to_meta(&self) -> ModelMeta {
        ModelMeta::new(self.name.clone(), self.fields.clone()).options(self.options.clone())
    }

    /// The table name: `db_table` when set, otherwise the model name.
    pub fn table(&self) -> &str {
        self.options.db_table.as_deref().unwrap_or(&self.name)
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Looks up a field mutably by name.
    pub fn field_mut(&mut self, name: &str) -> Option<&mut FieldDef> {
        self.fields.iter_mut().find(|f| f.name == name)
    }

    /// The primary key field, if one is declared.
    pub fn primary_key(&self) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.primary_key)
    }

    /// Removes a field by name, returning it.
    pub fn remove_field(&mut self, name: &str) -> Option<FieldDef> {
        let idx = self.fields.iter().position(|f| f.name == name)?;
        Some(self.fields.remove(idx))
    }
}

/// A snapshot of every model's declared shape at one point in history.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProjectState {
    /// Models keyed by normalized name.
    pub models: BTreeMap<String, ModelState>,
}

impl ProjectState {
    /// Creates an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a state from a live registry.
    pub fn from_registry(registry: &Registry, with_relations: bool) -> Self {
        let mut state = Self::new();
        for meta in registry.models() {
            state.add_model(ModelState::from_meta(meta, with_relations));
        }
        state
    }

    /// Adds (or replaces) a model.
    pub fn add_model(&mut self, model: ModelState) {
        self.models.insert(model.name.clone(), model);
    }

    /// Removes a model, so later lookups fail loudly instead of returning
    /// ghost data.
    pub fn remove_model(&mut self, name: &str) -> MigrateResult<ModelState> {
        self.models
            .remove(&name.to_lowercase())
            .ok_or_else(|| MigrateError::UnknownModel(name.to_string()))
    }

    /// Looks up a model by name.
    pub fn get_model(&self, name: &str) -> Option<&ModelState> {
        self.models.get(&name.to_lowercase())
    }

    /// Looks up a model mutably.
    pub fn get_model_mut(&mut self, name: &str) -> Option<&mut ModelState> {
        self.models.get_mut(&name.to_lowercase())
    }

    /// Like [`get_model`](Self::get_model) but errors when absent.
    pub fn require_model(&self, name: &str) -> MigrateResult<&ModelState> {
        self.get_model(name)
            .ok_or_else(|| MigrateError::UnknownModel(name.to_string()))
    }

    /// Model names in sorted order.
    pub fn model_names(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    /// Builds a transient registry from this state, for one-shot
    /// relationship resolution against historical metadata.
    pub fn registry(&self) -> Registry {
        let mut registry = Registry::new();
        for model in self.models.values() {
            registry.register(model.to_meta());
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use girder_model::{FieldType, OnDelete, Value};

    fn author_meta() -> ModelMeta {
        ModelMeta::new(
            "author",
            vec![
                FieldDef::auto_pk(),
                FieldDef::new("name", FieldType::Char { max_length: 100 }),
            ],
        )
    }

    fn book_meta() -> ModelMeta {
        ModelMeta::new(
            "book",
            vec![
                FieldDef::auto_pk(),
                FieldDef::new("title", FieldType::Char { max_length: 200 }),
                FieldDef::new(
                    "author",
                    FieldType::ForeignKey {
                        to: "author".into(),
                        on_delete: OnDelete::Cascade,
                        db_constraint: true,
                    },
                ),
            ],
        )
    }

    // ── ModelState ──────────────────────────────────────────────────

    #[test]
    fn test_from_meta_copies_all_fields() {
        let state = ModelState::from_meta(&book_meta(), true);
        assert_eq!(state.fields.len(), 3);
        assert!(state.field("author").is_some());
    }

    #[test]
    fn test_from_meta_without_relations() {
        let state = ModelState::from_meta(&book_meta(), false);
        assert_eq!(state.fields.len(), 2);
        assert!(state.field("author").is_none());
    }

    #[test]
    fn test_model_state_normalizes_name() {
        let state = ModelState::new("Author", vec![FieldDef::auto_pk()]);
        assert_eq!(state.name, "author");
    }

    #[test]
    fn test_table_name() {
        let state = ModelState::from_meta(&author_meta(), true);
        assert_eq!(state.table(), "author");

        let state = state.options(ModelOptions {
            db_table: Some("people_authors".into()),
            ..ModelOptions::default()
        });
        assert_eq!(state.table(), "people_authors");
    }

    #[test]
    fn test_remove_field() {
        let mut state = ModelState::from_meta(&author_meta(), true);
        let removed = state.remove_field("name").unwrap();
        assert_eq!(removed.name, "name");
        assert!(state.field("name").is_none());
        assert!(state.remove_field("name").is_none());
    }

    // ── ProjectState ────────────────────────────────────────────────

    #[test]
    fn test_from_registry() {
        let mut registry = Registry::new();
        registry.register(author_meta());
        registry.register(book_meta());

        let state = ProjectState::from_registry(&registry, true);
        assert_eq!(state.model_names(), vec!["author", "book"]);
    }

    #[test]
    fn test_remove_model_then_lookup_fails() {
        let mut registry = Registry::new();
        registry.register(author_meta());
        let mut state = ProjectState::from_registry(&registry, true);

        state.remove_model("author").unwrap();
        assert!(state.get_model("author").is_none());
        assert!(matches!(
            state.require_model("author"),
            Err(MigrateError::UnknownModel(_))
        ));
        assert!(matches!(
            state.remove_model("author"),
            Err(MigrateError::UnknownModel(_))
        ));
    }

    #[test]
    fn test_clone_isolation() {
        let mut registry = Registry::new();
        registry.register(author_meta());
        let original = ProjectState::from_registry(&registry, true);

        let mut cloned = original.clone();
        let field = cloned
            .get_model_mut("author")
            .unwrap()
            .field_mut("name")
            .unwrap();
        field.null = true;
        field.default = Some(Value::Text("anonymous".into()));

        let orig_field = original.get_model("author").unwrap().field("name").unwrap();
        assert!(!orig_field.null);
        assert!(orig_field.default.is_none());
    }

    #[test]
    fn test_transient_registry_resolves_relations() {
        let mut registry = Registry::new();
        registry.register(author_meta());
        registry.register(book_meta());
        let state = ProjectState::from_registry(&registry, true);

        let transient = state.registry();
        let book = transient.get("book").unwrap();
        let fk = book.field("author").unwrap();
        assert_eq!(fk.field_type.relation_target(), Some("author"));
        // The target's primary key resolves through the same registry.
        let target = transient.get("author").unwrap();
        assert_eq!(target.primary_key().map(|f| f.name.as_str()), Some("id"));
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let mut state = ProjectState::new();
        state.add_model(ModelState::new("Author", vec![FieldDef::auto_pk()]));
        assert!(state.get_model("AUTHOR").is_some());
        assert!(state.get_model("author").is_some());
    }
}
