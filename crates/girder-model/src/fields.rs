//! Field type definitions for declared models.
//!
//! [`FieldType`] enumerates the column kinds the migration engine understands;
//! kind-specific settings (character length, decimal precision, relation
//! targets) live inside the variant that needs them, so a field can never
//! carry configuration that does not apply to its kind. [`FieldDef`] adds the
//! cross-kind attributes: column name, nullability, uniqueness, indexing,
//! defaults.

use crate::value::Value;

/// The kind of a model field, determining its SQL column type and behavior.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum FieldType {
    /// Auto-incrementing 64-bit integer primary key.
    BigAuto,
    /// Variable-length string.
    Char {
        /// Maximum character length.
        max_length: u32,
    },
    /// Unlimited-length text.
    Text,
    /// 32-bit signed integer.
    Integer,
    /// 64-bit signed integer.
    BigInteger,
    /// 16-bit signed integer.
    SmallInteger,
    /// 64-bit floating-point number.
    Float,
    /// Fixed-precision decimal number.
    Decimal {
        /// Maximum total digits.
        max_digits: u32,
        /// Digits after the decimal point.
        decimal_places: u32,
    },
    /// Boolean (true/false).
    Boolean,
    /// Date without time.
    Date,
    /// Date and time.
    DateTime,
    /// UUID field.
    Uuid,
    /// Raw binary data.
    Binary,
    /// JSON data.
    Json,
    /// Many-to-one relationship. The column holds the target's primary key.
    ForeignKey {
        /// The target model name.
        to: String,
        /// Behavior when the referenced row is deleted.
        on_delete: OnDelete,
        /// Whether to emit a real FOREIGN KEY constraint in DDL.
        db_constraint: bool,
    },
    /// Many-to-many relationship, stored in a separate join table.
    ManyToMany {
        /// The target model name.
        to: String,
        /// Explicit intermediate model, if the join table is user-declared.
        /// `None` means the engine creates and owns the through table.
        through: Option<String>,
    },
}

impl FieldType {
    /// Returns `true` for relation kinds (`ForeignKey`, `ManyToMany`).
    pub const fn is_relation(&self) -> bool {
        matches!(self, Self::ForeignKey { .. } | Self::ManyToMany { .. })
    }

    /// Returns `true` for many-to-many fields.
    pub const fn is_many_to_many(&self) -> bool {
        matches!(self, Self::ManyToMany { .. })
    }

    /// Returns `true` when this kind maps to a concrete column in the
    /// model's own table. Many-to-many fields live in a join table instead.
    pub const fn has_column(&self) -> bool {
        !self.is_many_to_many()
    }

    /// The related model name, for relation kinds.
    pub fn relation_target(&self) -> Option<&str> {
        match self {
            Self::ForeignKey { to, .. } | Self::ManyToMany { to, .. } => Some(to),
            _ => None,
        }
    }
}

/// Behavior when a referenced row is deleted (the `ON DELETE` action).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OnDelete {
    /// Delete all referencing rows (CASCADE).
    Cascade,
    /// Prevent deletion while referencing rows exist (RESTRICT).
    Protect,
    /// Set the foreign key to NULL.
    SetNull,
    /// Take no action (may cause integrity errors).
    DoNothing,
}

/// Complete definition of a model field.
///
/// Constructed with a builder, the way model declarations read:
///
/// ```
/// use girder_model::fields::{FieldDef, FieldType};
///
/// let title = FieldDef::new("title", FieldType::Char { max_length: 200 })
///     .db_index();
/// ```
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FieldDef {
    /// The attribute name of this field.
    pub name: String,
    /// The database column name (may differ from `name`).
    pub column: String,
    /// The kind of this field.
    pub field_type: FieldType,
    /// Whether this field is the primary key.
    pub primary_key: bool,
    /// Whether NULL is allowed in the database.
    pub null: bool,
    /// Whether a UNIQUE constraint is applied.
    pub unique: bool,
    /// Whether a single-column index should be created.
    pub db_index: bool,
    /// Default value used for new rows and for backfilling.
    pub default: Option<Value>,
}

impl FieldDef {
    /// Creates a new `FieldDef` with sensible defaults: non-null, no
    /// constraints, column name equal to the field name.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        Self {
            column: name.clone(),
            name,
            field_type,
            primary_key: false,
            null: false,
            unique: false,
            db_index: false,
            default: None,
        }
    }

    /// The conventional auto primary key.
    pub fn auto_pk() -> Self {
        Self::new("id", FieldType::BigAuto).primary_key()
    }

    /// Sets the database column name.
    #[must_use]
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    /// Marks this field as the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Allows NULL values in the database.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.null = true;
        self
    }

    /// Marks this field as having a UNIQUE constraint.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Marks this field as having a single-column index.
    #[must_use]
    pub fn db_index(mut self) -> Self {
        self.db_index = true;
        self
    }

    /// Sets the default value for this field.
    #[must_use]
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Returns `true` if this field is a relation.
    pub const fn is_relation(&self) -> bool {
        self.field_type.is_relation()
    }
}
