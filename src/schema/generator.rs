//! Index schema generation.
//!
//! Walks a model's field metadata and emits the index-creation command:
//! a storage-type/prefix preamble followed by one clause per indexed
//! field. Document-stored models get JSON-path clauses (with `[*]`
//! wildcard steps where the traversal passed through a list); hash-stored
//! models get flat field-name clauses. The canonical schema text - the
//! space-joined argument vector - is what gets content-hashed to detect
//! drift between code and the deployed index.
//!
//! ```text
//! person:index ON HASH PREFIX 1 person: SCHEMA
//!   id TAG SEPARATOR |
//!   first_name TAG SEPARATOR |
//!   age NUMERIC SORTABLE
//! ```

use sha2::{Digest, Sha256};

use crate::model::{FieldDescriptor, FieldKind, ModelDescriptor, SchemaError, StorageKind};

/// A generated index definition for one model.
#[derive(Debug, Clone)]
pub struct IndexSchema {
    /// Full index name (global prefix applied).
    pub index_name: String,
    /// FT.CREATE argument vector, index name first.
    pub create_args: Vec<String>,
}

impl IndexSchema {
    /// Canonical schema text: the space-joined argument vector.
    #[must_use]
    pub fn schema_text(&self) -> String {
        self.create_args.join(" ")
    }

    /// Content hash of the schema text, hex-encoded.
    #[must_use]
    pub fn schema_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.schema_text().as_bytes());
        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Generate the index schema for a model.
///
/// `global_prefix` is the store-wide key namespace (may be empty); it is
/// applied to both the index name and the record key prefix so the index
/// covers the keys actually written.
pub fn generate(
    model: &ModelDescriptor,
    global_prefix: &str,
) -> Result<IndexSchema, SchemaError> {
    let index_name = format!("{}{}", global_prefix, model.index_name());

    let mut args = vec![
        index_name.clone(),
        "ON".to_string(),
        match model.storage() {
            StorageKind::Hash => "HASH",
            StorageKind::Json => "JSON",
        }
        .to_string(),
        "PREFIX".to_string(),
        "1".to_string(),
        format!("{}{}:", global_prefix, model.key_prefix()),
        "SCHEMA".to_string(),
    ];

    let mut emitter = FieldEmitter {
        storage: model.storage(),
        args: &mut args,
    };
    for field in model.fields() {
        emitter.emit(model, field, &[], &[])?;
    }

    Ok(IndexSchema {
        index_name,
        create_args: args,
    })
}

/// One step of a JSON path under construction.
#[derive(Debug, Clone)]
struct PathStep {
    name: String,
    through_list: bool,
}

struct FieldEmitter<'a> {
    storage: StorageKind,
    args: &'a mut Vec<String>,
}

impl FieldEmitter<'_> {
    fn emit(
        &mut self,
        model: &ModelDescriptor,
        field: &FieldDescriptor,
        name_prefix: &[String],
        path_prefix: &[PathStep],
    ) -> Result<(), SchemaError> {
        match &field.kind {
            FieldKind::Nested(inner) => {
                self.emit_embedded(inner, field, name_prefix, path_prefix, false)
            }
            FieldKind::List(element) => match element.as_ref() {
                FieldKind::Nested(inner) => {
                    self.emit_embedded(inner, field, name_prefix, path_prefix, true)
                }
                _ => self.emit_leaf(model, field, name_prefix, path_prefix),
            },
            _ => self.emit_leaf(model, field, name_prefix, path_prefix),
        }
    }

    fn emit_embedded(
        &mut self,
        inner: &ModelDescriptor,
        field: &FieldDescriptor,
        name_prefix: &[String],
        path_prefix: &[PathStep],
        through_list: bool,
    ) -> Result<(), SchemaError> {
        let mut names = name_prefix.to_vec();
        names.push(field.name.clone());
        let mut path = path_prefix.to_vec();
        path.push(PathStep {
            name: field.name.clone(),
            through_list,
        });
        for child in inner.fields() {
            self.emit(inner, child, &names, &path)?;
        }
        Ok(())
    }

    fn emit_leaf(
        &mut self,
        model: &ModelDescriptor,
        field: &FieldDescriptor,
        name_prefix: &[String],
        path_prefix: &[PathStep],
    ) -> Result<(), SchemaError> {
        if !field.indexed && !field.primary_key {
            return Ok(());
        }
        if matches!(field.kind, FieldKind::Map(_)) {
            return Err(SchemaError::UnsupportedContainer {
                model: model.name().to_string(),
                field: field.name.clone(),
            });
        }
        self.emit_scalar(field, name_prefix, path_prefix);
        Ok(())
    }

    fn emit_scalar(
        &mut self,
        field: &FieldDescriptor,
        name_prefix: &[String],
        path_prefix: &[PathStep],
    ) {
        let mut parts: Vec<&str> = name_prefix.iter().map(String::as_str).collect();
        parts.push(&field.name);
        let joined = parts.join("_");

        let is_list = matches!(field.kind, FieldKind::List(_));
        let numeric = field.kind.is_numeric() && !field.primary_key && !is_list;

        // JSON storage addresses the field by path and aliases it to the
        // joined name; hash storage uses the flat field name directly.
        let location = match self.storage {
            StorageKind::Hash => joined.clone(),
            StorageKind::Json => {
                let mut path = String::from("$");
                for step in path_prefix {
                    path.push('.');
                    path.push_str(&step.name);
                    if step.through_list {
                        path.push_str("[*]");
                    }
                }
                path.push('.');
                path.push_str(&field.name);
                if is_list {
                    path.push_str("[*]");
                }
                path
            }
        };

        self.args.push(location.clone());
        if self.storage == StorageKind::Json {
            self.args.push("AS".to_string());
            self.args.push(joined.clone());
        }
        if numeric {
            self.args.push("NUMERIC".to_string());
            if field.sortable {
                self.args.push("SORTABLE".to_string());
            }
        } else {
            self.args.push("TAG".to_string());
            self.args.push("SEPARATOR".to_string());
            self.args.push(field.tag_separator.to_string());
            if field.case_sensitive {
                self.args.push("CASESENSITIVE".to_string());
            }
        }

        // Full-text strings get a tokenized companion clause; queries with
        // the full-text operator target `<name>_fts`.
        if field.full_text && matches!(field.kind, FieldKind::String) {
            self.args.push(match self.storage {
                StorageKind::Hash => joined.clone(),
                StorageKind::Json => location.clone(),
            });
            self.args.push("AS".to_string());
            self.args.push(format!("{joined}_fts"));
            self.args.push("TEXT".to_string());
            if field.sortable {
                self.args.push("SORTABLE".to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldSpec, ModelBuilder};
    use std::sync::Arc;

    fn hash_person() -> Arc<ModelDescriptor> {
        ModelBuilder::new("Person")
            .field(FieldSpec::string("id").primary_key())
            .field(FieldSpec::string("first_name").indexed())
            .field(FieldSpec::string("bio").full_text().sortable())
            .field(FieldSpec::string("notes"))
            .field(FieldSpec::integer("age").indexed().sortable())
            .field(FieldSpec::list("skills", FieldKind::String).indexed())
            .build()
            .unwrap()
    }

    #[test]
    fn test_hash_schema_preamble_and_clauses() {
        let schema = generate(&hash_person(), "").unwrap();
        assert_eq!(schema.index_name, "person:index");

        let text = schema.schema_text();
        assert!(text.starts_with("person:index ON HASH PREFIX 1 person: SCHEMA "));
        assert!(text.contains("id TAG SEPARATOR |"));
        assert!(text.contains("first_name TAG SEPARATOR |"));
        assert!(text.contains("age NUMERIC SORTABLE"));
        assert!(text.contains("skills TAG SEPARATOR |"));
        assert!(text.contains("bio AS bio_fts TEXT SORTABLE"));
        // Unindexed fields are excluded.
        assert!(!text.contains("notes"));
    }

    #[test]
    fn test_global_prefix_applies_to_index_and_keys() {
        let schema = generate(&hash_person(), "redsqrl:").unwrap();
        assert_eq!(schema.index_name, "redsqrl:person:index");
        assert!(schema
            .schema_text()
            .contains("PREFIX 1 redsqrl:person:"));
    }

    #[test]
    fn test_json_schema_paths_and_aliases() {
        let address = ModelBuilder::new("Address")
            .embedded()
            .field(FieldSpec::string("city").indexed())
            .field(FieldSpec::integer("zip").indexed())
            .build()
            .unwrap();
        let item = ModelBuilder::new("Item")
            .embedded()
            .field(FieldSpec::float("total").indexed().sortable())
            .build()
            .unwrap();
        let customer = ModelBuilder::new("Customer")
            .storage(StorageKind::Json)
            .field(FieldSpec::string("id").primary_key())
            .field(FieldSpec::list("tags", FieldKind::String).indexed())
            .field(FieldSpec::nested("address", address))
            .field(FieldSpec::nested("orders", item))
            .build()
            .unwrap();

        let text = generate(&customer, "").unwrap().schema_text();
        assert!(text.starts_with("customer:index ON JSON PREFIX 1 customer: SCHEMA "));
        assert!(text.contains("$.id AS id TAG SEPARATOR |"));
        assert!(text.contains("$.tags[*] AS tags TAG SEPARATOR |"));
        assert!(text.contains("$.address.city AS address_city TAG SEPARATOR |"));
        assert!(text.contains("$.address.zip AS address_zip NUMERIC"));
        assert!(text.contains("$.orders.total AS orders_total NUMERIC SORTABLE"));
    }

    #[test]
    fn test_list_of_nested_uses_wildcard_path() {
        let line = ModelBuilder::new("Line")
            .embedded()
            .field(FieldSpec::float("price").indexed())
            .build()
            .unwrap();
        let order = ModelBuilder::new("Order")
            .storage(StorageKind::Json)
            .field(FieldSpec::string("id").primary_key())
            .field(FieldSpec::list("lines", FieldKind::Nested(line)))
            .build()
            .unwrap();

        let text = generate(&order, "").unwrap().schema_text();
        assert!(text.contains("$.lines[*].price AS lines_price NUMERIC"));
    }

    #[test]
    fn test_case_sensitive_modifier() {
        let model = ModelBuilder::new("Token")
            .field(FieldSpec::string("id").primary_key())
            .field(FieldSpec::string("value").indexed().case_sensitive())
            .build()
            .unwrap();
        let text = generate(&model, "").unwrap().schema_text();
        assert!(text.contains("value TAG SEPARATOR | CASESENSITIVE"));
    }

    #[test]
    fn test_hash_is_stable_and_drifts_with_schema() {
        let first = generate(&hash_person(), "").unwrap();
        let second = generate(&hash_person(), "").unwrap();
        assert_eq!(first.schema_hash(), second.schema_hash());

        let changed = ModelBuilder::new("Person")
            .field(FieldSpec::string("id").primary_key())
            .field(FieldSpec::string("first_name").indexed())
            .field(FieldSpec::integer("age").indexed().sortable())
            .field(FieldSpec::integer("height").indexed())
            .build()
            .unwrap();
        let third = generate(&changed, "").unwrap();
        assert_ne!(first.schema_hash(), third.schema_hash());
    }
}
