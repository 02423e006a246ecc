// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Model registry.
//!
//! Maps model names to their descriptors so the migrators can enumerate
//! every indexable type. The registry is an explicit value injected into
//! whatever needs it - there is no process-wide singleton, so tests build
//! isolated registries instead of snapshotting shared state. Registration
//! happens once per model during application wiring; after warm-up the
//! registry is effectively append-only.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::descriptor::ModelDescriptor;

/// Thread-safe name → descriptor map.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: RwLock<HashMap<String, Arc<ModelDescriptor>>>,
}

impl ModelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            models: RwLock::new(HashMap::new()),
        }
    }

    /// Register a model. Embedded models are skipped - they carry no index
    /// of their own. Re-registering a name replaces the previous entry.
    pub fn register(&self, descriptor: Arc<ModelDescriptor>) {
        if descriptor.is_embedded() {
            return;
        }
        self.models
            .write()
            .insert(descriptor.name().to_string(), descriptor);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<ModelDescriptor>> {
        self.models.read().get(name).cloned()
    }

    /// All registered descriptors, ordered by model name so migration
    /// detection output is deterministic.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<ModelDescriptor>> {
        let models = self.models.read();
        let mut entries: Vec<_> = models.values().cloned().collect();
        entries.sort_by(|a, b| a.name().cmp(b.name()));
        entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.models.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.read().is_empty()
    }

    pub fn clear(&self) {
        self.models.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::descriptor::{FieldSpec, ModelBuilder};

    fn model(name: &str) -> Arc<ModelDescriptor> {
        ModelBuilder::new(name)
            .field(FieldSpec::string("id").primary_key())
            .build()
            .unwrap()
    }

    #[test]
    fn test_register_and_get() {
        let registry = ModelRegistry::new();
        registry.register(model("Person"));
        assert!(registry.get("Person").is_some());
        assert!(registry.get("Order").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_embedded_models_are_skipped() {
        let registry = ModelRegistry::new();
        let embedded = ModelBuilder::new("Address")
            .embedded()
            .field(FieldSpec::string("city"))
            .build()
            .unwrap();
        registry.register(embedded);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_all_is_name_ordered() {
        let registry = ModelRegistry::new();
        registry.register(model("Order"));
        registry.register(model("Person"));
        registry.register(model("Account"));
        let names: Vec<_> = registry.all().iter().map(|m| m.name().to_string()).collect();
        assert_eq!(names, vec!["Account", "Order", "Person"]);
    }

    #[test]
    fn test_reregister_replaces() {
        let registry = ModelRegistry::new();
        registry.register(model("Person"));
        registry.register(model("Person"));
        assert_eq!(registry.len(), 1);
    }
}
