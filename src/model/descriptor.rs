// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Model metadata.
//!
//! A [`ModelDescriptor`] is the immutable description of one mapped type:
//! its record key prefix, storage encoding, and per-field metadata. It is
//! built once through [`ModelBuilder`], which validates the definition
//! eagerly - structural mistakes (no primary key, indexing a map, sortable
//! on a tag-resolved field) are configuration errors surfaced at build
//! time, never deferred to query or migration time.
//!
//! # Example
//!
//! ```
//! use redsqrl_om::model::{FieldSpec, ModelBuilder, StorageKind};
//!
//! let person = ModelBuilder::new("Person")
//!     .storage(StorageKind::Hash)
//!     .field(FieldSpec::string("id").primary_key())
//!     .field(FieldSpec::string("first_name").indexed())
//!     .field(FieldSpec::integer("age").indexed().sortable())
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(person.key_prefix(), "person");
//! assert_eq!(person.index_name(), "person:index");
//! ```

use std::sync::Arc;

use thiserror::Error;

use crate::storage::KeyKind;

/// Default separator for multi-value tag fields.
pub const DEFAULT_TAG_SEPARATOR: char = '|';

/// Configuration errors: the model definition itself is structurally
/// invalid. These are programmer errors, raised eagerly and never
/// recoverable at query time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Model '{0}' has no primary key field")]
    NoPrimaryKey(String),
    #[error("Model '{0}' declares more than one primary key field")]
    MultiplePrimaryKeys(String),
    #[error("Embedded model '{0}' must not declare a primary key")]
    PrimaryKeyInEmbedded(String),
    #[error("Model '{model}' declares field '{field}' more than once")]
    DuplicateField { model: String, field: String },
    #[error("Field '{field}' on model '{model}' has an unsupported container shape for indexing")]
    UnsupportedContainer { model: String, field: String },
    #[error("Field '{field}' on model '{model}' cannot be sortable: it resolves to a tag index without a full-text companion")]
    SortableTag { model: String, field: String },
    #[error("Field '{field}' on model '{model}' embeds a nested model, which hash storage cannot represent")]
    NestedInHash { model: String, field: String },
    #[error("Model '{model}' has no field named '{field}'")]
    UnknownField { model: String, field: String },
}

/// How a model's records are encoded in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// Flattened field/value pairs in a hash, indexed `ON HASH`.
    Hash,
    /// A JSON document at the key root, indexed `ON JSON`.
    Json,
}

impl StorageKind {
    #[must_use]
    pub fn key_kind(&self) -> KeyKind {
        match self {
            StorageKind::Hash => KeyKind::Hash,
            StorageKind::Json => KeyKind::Json,
        }
    }
}

/// Declared semantic type of a field.
#[derive(Debug, Clone)]
pub enum FieldKind {
    String,
    Integer,
    Float,
    Boolean,
    /// Stored as epoch milliseconds, range-queryable.
    DateTime,
    /// An embedded model, flattened into the parent's index schema.
    Nested(Arc<ModelDescriptor>),
    /// A homogeneous list; multi-value semantics fold to a tag index.
    List(Box<FieldKind>),
    /// A string-keyed mapping. Storable under JSON, never indexable.
    Map(Box<FieldKind>),
}

impl FieldKind {
    /// Whether the underlying scalar orders numerically.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            FieldKind::Integer | FieldKind::Float | FieldKind::DateTime
        )
    }
}

/// Immutable per-field metadata.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    pub primary_key: bool,
    pub indexed: bool,
    pub sortable: bool,
    pub full_text: bool,
    pub case_sensitive: bool,
    pub tag_separator: char,
}

/// Chainable field definition consumed by [`ModelBuilder::field`].
#[derive(Debug, Clone)]
pub struct FieldSpec {
    inner: FieldDescriptor,
}

impl FieldSpec {
    fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            inner: FieldDescriptor {
                name: name.to_string(),
                kind,
                primary_key: false,
                indexed: false,
                sortable: false,
                full_text: false,
                case_sensitive: false,
                tag_separator: DEFAULT_TAG_SEPARATOR,
            },
        }
    }

    #[must_use]
    pub fn string(name: &str) -> Self {
        Self::new(name, FieldKind::String)
    }

    #[must_use]
    pub fn integer(name: &str) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    #[must_use]
    pub fn float(name: &str) -> Self {
        Self::new(name, FieldKind::Float)
    }

    #[must_use]
    pub fn boolean(name: &str) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    #[must_use]
    pub fn datetime(name: &str) -> Self {
        Self::new(name, FieldKind::DateTime)
    }

    #[must_use]
    pub fn list(name: &str, element: FieldKind) -> Self {
        Self::new(name, FieldKind::List(Box::new(element)))
    }

    #[must_use]
    pub fn map(name: &str, value: FieldKind) -> Self {
        Self::new(name, FieldKind::Map(Box::new(value)))
    }

    #[must_use]
    pub fn nested(name: &str, model: Arc<ModelDescriptor>) -> Self {
        Self::new(name, FieldKind::Nested(model))
    }

    /// Mark as the record's primary key. Primary keys are always indexed.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.inner.primary_key = true;
        self.inner.indexed = true;
        self
    }

    #[must_use]
    pub fn indexed(mut self) -> Self {
        self.inner.indexed = true;
        self
    }

    #[must_use]
    pub fn sortable(mut self) -> Self {
        self.inner.sortable = true;
        self.inner.indexed = true;
        self
    }

    /// Index the field for tokenized full-text match in addition to exact
    /// lookup. Only meaningful on string fields.
    #[must_use]
    pub fn full_text(mut self) -> Self {
        self.inner.full_text = true;
        self.inner.indexed = true;
        self
    }

    #[must_use]
    pub fn case_sensitive(mut self) -> Self {
        self.inner.case_sensitive = true;
        self
    }

    #[must_use]
    pub fn separator(mut self, separator: char) -> Self {
        self.inner.tag_separator = separator;
        self
    }
}

/// Immutable description of one mapped model.
#[derive(Debug, Clone)]
pub struct ModelDescriptor {
    name: String,
    key_prefix: String,
    storage: StorageKind,
    embedded: bool,
    fields: Vec<FieldDescriptor>,
}

impl ModelDescriptor {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    #[must_use]
    pub fn storage(&self) -> StorageKind {
        self.storage
    }

    #[must_use]
    pub fn is_embedded(&self) -> bool {
        self.embedded
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Result<&FieldDescriptor, SchemaError> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| SchemaError::UnknownField {
                model: self.name.clone(),
                field: name.to_string(),
            })
    }

    #[must_use]
    pub fn primary_key_field(&self) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.primary_key)
    }

    /// Record key for a given primary key value.
    #[must_use]
    pub fn key_for(&self, pk: &str) -> String {
        format!("{}:{}", self.key_prefix, pk)
    }

    /// SCAN pattern matching this model's record keys.
    #[must_use]
    pub fn key_pattern(&self) -> String {
        format!("{}:*", self.key_prefix)
    }

    /// Name of this model's search index.
    #[must_use]
    pub fn index_name(&self) -> String {
        format!("{}:index", self.key_prefix)
    }

    /// Key holding the deployed schema's content hash.
    #[must_use]
    pub fn hash_key(&self) -> String {
        format!("{}:hash", self.index_name())
    }

    /// Key holding the deployed schema's full text.
    #[must_use]
    pub fn schema_text_key(&self) -> String {
        format!("{}:schema", self.index_name())
    }
}

/// Builder producing a validated, immutable [`ModelDescriptor`].
#[derive(Debug)]
pub struct ModelBuilder {
    name: String,
    key_prefix: Option<String>,
    storage: StorageKind,
    embedded: bool,
    fields: Vec<FieldDescriptor>,
}

impl ModelBuilder {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            key_prefix: None,
            storage: StorageKind::Hash,
            embedded: false,
            fields: Vec::new(),
        }
    }

    /// Override the record key prefix (defaults to the lowercased name).
    #[must_use]
    pub fn key_prefix(mut self, prefix: &str) -> Self {
        self.key_prefix = Some(prefix.to_string());
        self
    }

    #[must_use]
    pub fn storage(mut self, storage: StorageKind) -> Self {
        self.storage = storage;
        self
    }

    /// Mark this model as embeddable only: no primary key, no index of its
    /// own. Its fields are flattened into the embedding model's schema.
    #[must_use]
    pub fn embedded(mut self) -> Self {
        self.embedded = true;
        self
    }

    #[must_use]
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec.inner);
        self
    }

    pub fn build(self) -> Result<Arc<ModelDescriptor>, SchemaError> {
        let name = self.name;

        let pk_count = self.fields.iter().filter(|f| f.primary_key).count();
        if self.embedded {
            if pk_count > 0 {
                return Err(SchemaError::PrimaryKeyInEmbedded(name));
            }
        } else if pk_count == 0 {
            return Err(SchemaError::NoPrimaryKey(name));
        } else if pk_count > 1 {
            return Err(SchemaError::MultiplePrimaryKeys(name));
        }

        for (i, field) in self.fields.iter().enumerate() {
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(SchemaError::DuplicateField {
                    model: name,
                    field: field.name.clone(),
                });
            }
            validate_field(&name, self.storage, field)?;
        }

        let key_prefix = self.key_prefix.unwrap_or_else(|| name.to_lowercase());
        Ok(Arc::new(ModelDescriptor {
            name,
            key_prefix,
            storage: self.storage,
            embedded: self.embedded,
            fields: self.fields,
        }))
    }
}

fn validate_field(
    model: &str,
    storage: StorageKind,
    field: &FieldDescriptor,
) -> Result<(), SchemaError> {
    let container_err = || SchemaError::UnsupportedContainer {
        model: model.to_string(),
        field: field.name.clone(),
    };

    match &field.kind {
        FieldKind::Nested(_) => {
            if storage == StorageKind::Hash {
                return Err(SchemaError::NestedInHash {
                    model: model.to_string(),
                    field: field.name.clone(),
                });
            }
        }
        FieldKind::List(element) => match element.as_ref() {
            FieldKind::List(_) | FieldKind::Map(_) => return Err(container_err()),
            FieldKind::Nested(_) => {
                if storage == StorageKind::Hash {
                    return Err(SchemaError::NestedInHash {
                        model: model.to_string(),
                        field: field.name.clone(),
                    });
                }
            }
            _ => {}
        },
        FieldKind::Map(_) => {
            // A mapping has no tag/numeric/text projection; indexing one is
            // a definition error, and hash records cannot hold one at all.
            if field.indexed || storage == StorageKind::Hash {
                return Err(container_err());
            }
        }
        _ => {}
    }

    // Sortable requires a numeric resolution or a full-text string (whose
    // companion text clause carries the SORTABLE modifier). Everything else
    // resolves to a plain tag, which does not sort.
    if field.sortable && !field.primary_key && !field.kind.is_numeric() {
        let text_sortable = matches!(field.kind, FieldKind::String) && field.full_text;
        if !text_sortable {
            return Err(SchemaError::SortableTag {
                model: model.to_string(),
                field: field.name.clone(),
            });
        }
    }

    Ok(())
}
