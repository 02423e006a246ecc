// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Engine orchestrator.
//!
//! [`OmEngine`] wires the store, the model registry, and the configuration
//! together, and exposes record CRUD plus factories for find cursors and
//! both migrators. All shared state is reference-counted; the engine
//! itself is cheap to clone and safe to share across tasks.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::config::OmConfig;
use crate::migrate::DataMigrator;
use crate::model::{codec, Model, ModelRegistry, StorageKind};
use crate::query::{FindQuery, QueryError};
use crate::schema::SchemaMigrator;
use crate::storage::{OmStore, RedisStore, StorageError};

#[derive(Clone)]
pub struct OmEngine {
    config: OmConfig,
    store: Arc<dyn OmStore>,
    registry: Arc<ModelRegistry>,
}

impl OmEngine {
    /// Connect to the configured Redis instance.
    pub async fn connect(config: OmConfig) -> Result<Self, StorageError> {
        let store =
            RedisStore::connect_with_prefix(&config.redis_url, config.key_prefix.as_deref())
                .await?;
        Ok(Self::with_store(config, Arc::new(store)))
    }

    /// Build over an existing store - dependency injection for tests and
    /// for hosts that manage their own connections.
    pub fn with_store(config: OmConfig, store: Arc<dyn OmStore>) -> Self {
        Self {
            config,
            store,
            registry: Arc::new(ModelRegistry::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &OmConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> Arc<dyn OmStore> {
        self.store.clone()
    }

    #[must_use]
    pub fn registry(&self) -> Arc<ModelRegistry> {
        self.registry.clone()
    }

    /// Register a model type for schema migration discovery.
    pub fn register_model<M: Model>(&self) {
        self.registry.register(M::descriptor());
    }

    /// Save a record, generating a primary key if it has none yet.
    /// Returns the record key written.
    pub async fn save<M: Model>(&self, model: &mut M) -> Result<String, QueryError> {
        let descriptor = M::descriptor();
        if model.primary_key().is_empty() {
            model.set_primary_key(codec::generate_primary_key());
        }
        let key = descriptor.key_for(model.primary_key());
        let value: Value = serde_json::to_value(&*model)
            .map_err(|e| StorageError::Decode(format!("serialize {}: {e}", descriptor.name())))?;

        match descriptor.storage() {
            StorageKind::Hash => {
                let fields = codec::to_hash_fields(&descriptor, &value)?;
                self.store.hash_set(&key, &fields).await?;
            }
            StorageKind::Json => {
                let doc = codec::to_document(&value)?;
                self.store.json_set(&key, &doc).await?;
            }
        }
        debug!(model = %descriptor.name(), key = %key, "Record saved");
        Ok(key)
    }

    /// Load a record by primary key.
    pub async fn get<M: Model>(&self, pk: &str) -> Result<Option<M>, QueryError> {
        let descriptor = M::descriptor();
        let key = descriptor.key_for(pk);
        let value = match descriptor.storage() {
            StorageKind::Hash => {
                let fields = self.store.hash_get_all(&key).await?;
                if fields.is_empty() {
                    return Ok(None);
                }
                codec::from_hash_fields(&descriptor, &fields)?
            }
            StorageKind::Json => match self.store.json_get(&key).await? {
                Some(doc) => codec::from_document(&doc)?,
                None => return Ok(None),
            },
        };
        let model = serde_json::from_value(value).map_err(|e| {
            StorageError::Decode(format!("materialize {}: {e}", descriptor.name()))
        })?;
        Ok(Some(model))
    }

    /// Delete a record by primary key. Returns whether a record existed.
    pub async fn delete<M: Model>(&self, pk: &str) -> Result<bool, QueryError> {
        let key = M::descriptor().key_for(pk);
        Ok(self.store.del(&[key]).await? > 0)
    }

    /// Set a TTL on a record's key.
    pub async fn expire<M: Model>(&self, pk: &str, ttl_secs: u64) -> Result<(), QueryError> {
        let key = M::descriptor().key_for(pk);
        self.store.expire(&key, ttl_secs).await?;
        Ok(())
    }

    /// Start a find cursor for a model.
    #[must_use]
    pub fn find<M: Model>(&self) -> FindQuery<M> {
        FindQuery::new(self.store.clone()).page_size(self.config.page_size)
    }

    /// Schema migrator over this engine's registry and store.
    #[must_use]
    pub fn schema_migrator(&self) -> SchemaMigrator {
        SchemaMigrator::new(self.store.clone(), self.registry.clone())
    }

    /// Data migrator over this engine's registry and store.
    #[must_use]
    pub fn data_migrator(&self) -> DataMigrator {
        DataMigrator::new(self.store.clone(), self.registry.clone())
    }
}
