//! The policy boundary for ambiguous autodetection decisions.
//!
//! The autodetector never guesses about renames or missing defaults; it
//! asks a [`Questioner`]. An interactive implementation can prompt an
//! operator; [`NonInteractiveQuestioner`] always answers "no rename" /
//! "no default", forcing explicit, non-destructive migrations.

use girder_model::{FieldDef, Value};

/// Answers the autodetector's ambiguous questions.
pub trait Questioner {
    /// "Did you rename model `old` to `new`?"
    fn ask_rename_model(&self, old: &str, new: &str) -> bool {
        let _ = (old, new);
        false
    }

    /// "Did you rename field `old` on `model` to `new`?"
    fn ask_rename(&self, model: &str, old: &str, new: &str, field: &FieldDef) -> bool {
        let _ = (model, old, new, field);
        false
    }

    /// "Field `field` on `model` is non-nullable with no default; what
    /// should existing rows get?" `None` leaves the operation without a
    /// backfill default.
    fn ask_not_null_default(&self, model: &str, field: &str) -> Option<Value> {
        let _ = (model, field);
        None
    }

    /// Same question, for an existing column being promoted to NOT NULL.
    fn ask_not_null_alteration(&self, model: &str, field: &str) -> Option<Value> {
        let _ = (model, field);
        None
    }
}

/// Declines every rename and supplies no defaults.
#[derive(Debug, Default, Clone, Copy)]
pub struct NonInteractiveQuestioner;

impl Questioner for NonInteractiveQuestioner {}

/// A questioner with predetermined answers, for scripted runs and tests.
#[derive(Debug, Default, Clone)]
pub struct ScriptedQuestioner {
    /// Approved model renames as `(old, new)` pairs.
    pub model_renames: Vec<(String, String)>,
    /// Approved field renames as `(model, old, new)` triples.
    pub field_renames: Vec<(String, String, String)>,
    /// Defaults keyed by `(model, field)`.
    pub defaults: Vec<((String, String), Value)>,
}

impl ScriptedQuestioner {
    /// Creates a questioner that approves nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Approves the model rename `old` -> `new`.
    #[must_use]
    pub fn approve_model_rename(mut self, old: impl Into<String>, new: impl Into<String>) -> Self {
        self.model_renames.push((old.into(), new.into()));
        self
    }

    /// Approves the field rename `old` -> `new` on `model`.
    #[must_use]
    pub fn approve_field_rename(
        mut self,
        model: impl Into<String>,
        old: impl Into<String>,
        new: impl Into<String>,
    ) -> Self {
        self.field_renames.push((model.into(), old.into(), new.into()));
        self
    }

    /// Supplies a backfill default for `field` on `model`.
    #[must_use]
    pub fn with_default(
        mut self,
        model: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.defaults
            .push(((model.into(), field.into()), value.into()));
        self
    }

    fn lookup_default(&self, model: &str, field: &str) -> Option<Value> {
        self.defaults
            .iter()
            .find(|((m, f), _)| m == model && f == field)
            .map(|(_, v)| v.clone())
    }
}

impl Questioner for ScriptedQuestioner {
    fn ask_rename_model(&self, old: &str, new: &str) -> bool {
        self.model_renames
            .iter()
            .any(|(o, n)| o == old && n == new)
    }

    fn ask_rename(&self, model: &str, old: &str, new: &str, _field: &FieldDef) -> bool {
        self.field_renames
            .iter()
            .any(|(m, o, n)| m == model && o == old && n == new)
    }

    fn ask_not_null_default(&self, model: &str, field: &str) -> Option<Value> {
        self.lookup_default(model, field)
    }

    fn ask_not_null_alteration(&self, model: &str, field: &str) -> Option<Value> {
        self.lookup_default(model, field)
    }
}
