//! Record encoding.
//!
//! Hash records are flattened field/value string pairs; document records
//! are one JSON document at the key root. The codec translates between a
//! model's `serde_json` representation and either wire shape, using the
//! descriptor's field kinds to re-type hash strings on the way back in.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use ulid::Ulid;

use super::descriptor::{FieldDescriptor, FieldKind, ModelDescriptor, SchemaError};
use crate::storage::StorageError;

/// A mapped application type.
///
/// Implementations pair a serde-serializable struct with its
/// [`ModelDescriptor`] and expose the primary key for key construction.
/// Descriptor registration with a [`ModelRegistry`] is a separate,
/// explicit call made during application wiring.
///
/// [`ModelRegistry`]: crate::model::ModelRegistry
pub trait Model: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn descriptor() -> Arc<ModelDescriptor>;

    /// Current primary key value; empty when the record has never been
    /// saved (a key is generated on first save).
    fn primary_key(&self) -> &str;

    fn set_primary_key(&mut self, pk: String);
}

/// Generate a fresh record identifier: ULIDs sort by creation time and are
/// safe inside tag clauses once escaped.
#[must_use]
pub fn generate_primary_key() -> String {
    Ulid::new().to_string()
}

/// Flatten a model value into hash field/value pairs.
///
/// Booleans encode as `1`/`0`, lists join on the field's tag separator,
/// absent/null fields are omitted entirely.
pub fn to_hash_fields(
    descriptor: &ModelDescriptor,
    value: &Value,
) -> Result<Vec<(String, String)>, StorageError> {
    let object = value
        .as_object()
        .ok_or_else(|| StorageError::Decode("model did not serialize to an object".into()))?;

    let mut fields = Vec::with_capacity(object.len());
    for field in descriptor.fields() {
        let Some(raw) = object.get(&field.name) else {
            continue;
        };
        if raw.is_null() {
            continue;
        }
        fields.push((field.name.clone(), encode_scalar(field, raw)?));
    }
    Ok(fields)
}

fn encode_scalar(field: &FieldDescriptor, value: &Value) -> Result<String, StorageError> {
    let mismatch = |expected: &str| {
        StorageError::Decode(format!(
            "field '{}' expected {expected}, got {value}",
            field.name
        ))
    };
    match &field.kind {
        FieldKind::String => value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| mismatch("a string")),
        FieldKind::Integer | FieldKind::DateTime => value
            .as_i64()
            .map(|n| n.to_string())
            .ok_or_else(|| mismatch("an integer")),
        FieldKind::Float => value
            .as_f64()
            .map(|n| n.to_string())
            .ok_or_else(|| mismatch("a number")),
        FieldKind::Boolean => value
            .as_bool()
            .map(|b| if b { "1" } else { "0" }.to_string())
            .ok_or_else(|| mismatch("a boolean")),
        FieldKind::List(element) => {
            let items = value.as_array().ok_or_else(|| mismatch("a list"))?;
            let mut encoded = Vec::with_capacity(items.len());
            let element_field = FieldDescriptor {
                kind: element.as_ref().clone(),
                ..field.clone()
            };
            for item in items {
                encoded.push(encode_scalar(&element_field, item)?);
            }
            Ok(encoded.join(&field.tag_separator.to_string()))
        }
        FieldKind::Nested(_) | FieldKind::Map(_) => Err(StorageError::Decode(format!(
            "field '{}' cannot be hash-encoded",
            field.name
        ))),
    }
}

/// Rebuild a model value from hash field/value pairs.
pub fn from_hash_fields(
    descriptor: &ModelDescriptor,
    fields: &HashMap<String, String>,
) -> Result<Value, StorageError> {
    let mut object = Map::new();
    for field in descriptor.fields() {
        let Some(raw) = fields.get(&field.name) else {
            continue;
        };
        object.insert(field.name.clone(), decode_scalar(field, raw)?);
    }
    Ok(Value::Object(object))
}

fn decode_scalar(field: &FieldDescriptor, raw: &str) -> Result<Value, StorageError> {
    let bad = |kind: &str| {
        StorageError::Decode(format!(
            "field '{}': '{raw}' is not a valid {kind}",
            field.name
        ))
    };
    match &field.kind {
        FieldKind::String => Ok(Value::String(raw.to_string())),
        FieldKind::Integer | FieldKind::DateTime => raw
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| bad("integer")),
        FieldKind::Float => raw.parse::<f64>().map(Value::from).map_err(|_| bad("number")),
        FieldKind::Boolean => match raw {
            "1" | "true" => Ok(Value::Bool(true)),
            "0" | "false" => Ok(Value::Bool(false)),
            _ => Err(bad("boolean")),
        },
        FieldKind::List(element) => {
            if raw.is_empty() {
                return Ok(Value::Array(Vec::new()));
            }
            let element_field = FieldDescriptor {
                kind: element.as_ref().clone(),
                ..field.clone()
            };
            raw.split(field.tag_separator)
                .map(|part| decode_scalar(&element_field, part))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        FieldKind::Nested(_) | FieldKind::Map(_) => Err(StorageError::Decode(format!(
            "field '{}' cannot be hash-decoded",
            field.name
        ))),
    }
}

/// Serialize a model value as its stored JSON document.
pub fn to_document(value: &Value) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(|e| StorageError::Decode(e.to_string()))
}

/// Parse a stored JSON document. Search hits arrive wrapped in a one-element
/// array (the `$` path result); unwrap that shape transparently.
pub fn from_document(raw: &str) -> Result<Value, StorageError> {
    let parsed: Value =
        serde_json::from_str(raw).map_err(|e| StorageError::Decode(e.to_string()))?;
    match parsed {
        Value::Array(mut items) if items.len() == 1 => Ok(items.remove(0)),
        other => Ok(other),
    }
}

/// Validate a plain or dotted nested-path field name against a descriptor.
pub fn validate_field_path(descriptor: &ModelDescriptor, path: &str) -> Result<(), SchemaError> {
    let mut current: Arc<ModelDescriptor> = Arc::new(descriptor.clone());
    let segments: Vec<&str> = path.split('.').collect();
    for (i, segment) in segments.iter().enumerate() {
        let field = current.field(segment)?;
        if i + 1 < segments.len() {
            match &field.kind {
                FieldKind::Nested(inner) => current = inner.clone(),
                FieldKind::List(element) => match element.as_ref() {
                    FieldKind::Nested(inner) => current = inner.clone(),
                    _ => {
                        return Err(SchemaError::UnknownField {
                            model: current.name().to_string(),
                            field: segments[i + 1..].join("."),
                        })
                    }
                },
                _ => {
                    return Err(SchemaError::UnknownField {
                        model: current.name().to_string(),
                        field: segments[i + 1..].join("."),
                    })
                }
            }
        }
    }
    Ok(())
}

/// Set a (possibly dotted) path inside a model value, creating intermediate
/// objects as needed.
pub fn set_field_path(target: &mut Value, path: &str, new_value: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    let mut current = target;
    for segment in &segments[..segments.len() - 1] {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Some(object) = current.as_object_mut() else {
            return;
        };
        current = object
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Some(object) = current.as_object_mut() {
        object.insert(segments[segments.len() - 1].to_string(), new_value);
    }
}
