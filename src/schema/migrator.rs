// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Schema migration.
//!
//! Reconciles the index definitions implied by registered model metadata
//! with the indexes actually deployed. Per model the state machine is:
//!
//! ```text
//! no index present            → CREATE
//! index present, hash matches → no-op
//! index present, hash differs → DROP, then CREATE
//! ```
//!
//! Detection never mutates the store; [`SchemaMigrator::run`] executes the
//! queued operations in order. Creating an index that already exists and
//! dropping one that doesn't are both tolerated as no-ops, which is the
//! only safety net when two deployments race - there is no distributed
//! lock. The deployed schema's content hash and full text are persisted
//! under `<index>:hash` / `<index>:schema` so later detections diff
//! without regenerating history.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::metrics;
use crate::migrate::MigrationError;
use crate::model::ModelRegistry;
use crate::storage::OmStore;

use super::generator::generate;

/// Queued operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationAction {
    Create,
    Drop,
}

/// One queued index operation, produced by detection and executed once.
#[derive(Debug, Clone)]
pub struct IndexMigration {
    pub model_name: String,
    pub index_name: String,
    /// Schema text this operation concerns: the new schema for a create,
    /// the previously deployed schema for a drop.
    pub schema_text: String,
    pub schema_hash: String,
    pub action: MigrationAction,
    /// Hash deployed before this operation, when one was stored.
    pub previous_hash: Option<String>,
    /// FT.CREATE argument vector (creates only).
    create_args: Vec<String>,
}

pub struct SchemaMigrator {
    store: Arc<dyn OmStore>,
    registry: Arc<ModelRegistry>,
}

impl SchemaMigrator {
    pub fn new(store: Arc<dyn OmStore>, registry: Arc<ModelRegistry>) -> Self {
        Self { store, registry }
    }

    /// Diff every registered model against the deployed indexes and queue
    /// the operations needed to reconcile them. Read-only.
    pub async fn detect(&self) -> Result<Vec<IndexMigration>, MigrationError> {
        let mut operations = Vec::new();

        for model in self.registry.all() {
            let schema = generate(&model, self.store.key_prefix())?;
            let new_hash = schema.schema_hash();
            let stored_hash = self.store.get(&model.hash_key()).await?;
            let index_present = self.store.ft_exists(&schema.index_name).await?;

            if index_present && stored_hash.as_deref() == Some(new_hash.as_str()) {
                debug!(model = %model.name(), index = %schema.index_name, "Schema up to date");
                continue;
            }

            if index_present {
                let previous_schema = self
                    .store
                    .get(&model.schema_text_key())
                    .await?
                    .unwrap_or_default();
                operations.push(IndexMigration {
                    model_name: model.name().to_string(),
                    index_name: schema.index_name.clone(),
                    schema_text: previous_schema,
                    schema_hash: stored_hash.clone().unwrap_or_default(),
                    action: MigrationAction::Drop,
                    previous_hash: stored_hash.clone(),
                    create_args: Vec::new(),
                });
            }

            operations.push(IndexMigration {
                model_name: model.name().to_string(),
                index_name: schema.index_name.clone(),
                schema_text: schema.schema_text(),
                schema_hash: new_hash,
                action: MigrationAction::Create,
                previous_hash: stored_hash,
                create_args: schema.create_args.clone(),
            });
        }

        Ok(operations)
    }

    /// Detect and apply. Returns the number of operations executed.
    pub async fn run(&self) -> Result<usize, MigrationError> {
        let operations = self.detect().await?;
        self.apply(&operations).await
    }

    /// Apply previously detected operations in order.
    pub async fn apply(&self, operations: &[IndexMigration]) -> Result<usize, MigrationError> {
        if operations
            .iter()
            .any(|op| op.action == MigrationAction::Create)
            && self.store.db_index() != 0
        {
            return Err(MigrationError::WrongDatabase(self.store.db_index()));
        }

        for op in operations {
            match op.action {
                MigrationAction::Drop => self.apply_drop(op).await?,
                MigrationAction::Create => self.apply_create(op).await?,
            }
        }
        Ok(operations.len())
    }

    async fn apply_create(&self, op: &IndexMigration) -> Result<(), MigrationError> {
        let model = self
            .registry
            .get(&op.model_name)
            .ok_or_else(|| MigrationError::UnknownModel(op.model_name.clone()))?;

        let created = self.store.ft_create(&op.create_args).await?;
        self.store.set(&model.hash_key(), &op.schema_hash).await?;
        self.store
            .set(&model.schema_text_key(), &op.schema_text)
            .await?;
        metrics::record_index_operation("create", true);
        info!(
            index = %op.index_name,
            model = %op.model_name,
            created,
            "Search index created"
        );
        Ok(())
    }

    async fn apply_drop(&self, op: &IndexMigration) -> Result<(), MigrationError> {
        let model = self
            .registry
            .get(&op.model_name)
            .ok_or_else(|| MigrationError::UnknownModel(op.model_name.clone()))?;

        let dropped = self.store.ft_drop(&op.index_name).await?;
        self.store
            .del(&[model.hash_key(), model.schema_text_key()])
            .await?;
        metrics::record_index_operation("drop", true);
        info!(index = %op.index_name, model = %op.model_name, dropped, "Search index dropped");
        Ok(())
    }

    /// Reverse previously applied operations, latest first: created
    /// indexes are dropped, and where an operation replaced an earlier
    /// schema the previous index is recreated from its captured text.
    /// Returns the number of operations reverted.
    pub async fn rollback(&self, operations: &[IndexMigration]) -> Result<usize, MigrationError> {
        let mut reverted = 0;
        for op in operations.iter().rev() {
            let model = self
                .registry
                .get(&op.model_name)
                .ok_or_else(|| MigrationError::UnknownModel(op.model_name.clone()))?;
            match op.action {
                MigrationAction::Create => {
                    self.store.ft_drop(&op.index_name).await?;
                    self.store
                        .del(&[model.hash_key(), model.schema_text_key()])
                        .await?;
                    info!(index = %op.index_name, "Rolled back index creation");
                    reverted += 1;
                }
                MigrationAction::Drop => {
                    if op.schema_text.is_empty() {
                        continue;
                    }
                    let args: Vec<String> =
                        op.schema_text.split(' ').map(str::to_string).collect();
                    self.store.ft_create(&args).await?;
                    self.store.set(&model.hash_key(), &op.schema_hash).await?;
                    self.store
                        .set(&model.schema_text_key(), &op.schema_text)
                        .await?;
                    info!(index = %op.index_name, "Restored previously deployed index");
                    reverted += 1;
                }
            }
        }
        Ok(reverted)
    }

    /// Serialize pending operations into a reusable migration source file,
    /// grouped by index: the new schema from the pending create, the
    /// previous schema from the stored text captured by the pending drop.
    ///
    /// Schema texts are embedded as raw-string literals whose `#` fence is
    /// widened until the embedded text cannot terminate the literal.
    pub fn write_snapshot(
        &self,
        operations: &[IndexMigration],
        directory: &Path,
        name: &str,
    ) -> Result<PathBuf, MigrationError> {
        let mut grouped: Vec<(String, Option<&IndexMigration>, Option<&IndexMigration>)> =
            Vec::new();
        for op in operations {
            let position = match grouped.iter().position(|(index, _, _)| *index == op.index_name)
            {
                Some(position) => position,
                None => {
                    grouped.push((op.index_name.clone(), None, None));
                    grouped.len() - 1
                }
            };
            match op.action {
                MigrationAction::Create => grouped[position].1 = Some(op),
                MigrationAction::Drop => grouped[position].2 = Some(op),
            }
        }

        let mut source = String::new();
        source.push_str("//! Generated index migration snapshot.\n");
        source.push_str("//!\n");
        source.push_str("//! Captures the index operations pending at generation time so the\n");
        source.push_str("//! same change set can be re-applied or rolled back elsewhere.\n\n");
        source.push_str("pub struct IndexChange {\n");
        source.push_str("    pub index_name: &'static str,\n");
        source.push_str("    pub new_schema: Option<&'static str>,\n");
        source.push_str("    pub previous_schema: Option<&'static str>,\n");
        source.push_str("}\n\n");
        source.push_str("pub const CHANGES: &[IndexChange] = &[\n");
        for (index_name, create, drop) in &grouped {
            source.push_str("    IndexChange {\n");
            source.push_str(&format!("        index_name: {},\n", raw_literal(index_name)));
            source.push_str(&format!(
                "        new_schema: {},\n",
                optional_literal(create.map(|op| op.schema_text.as_str()))
            ));
            source.push_str(&format!(
                "        previous_schema: {},\n",
                optional_literal(drop.map(|op| op.schema_text.as_str()))
            ));
            source.push_str("    },\n");
        }
        source.push_str("];\n");

        fs::create_dir_all(directory)
            .map_err(|e| MigrationError::File(format!("create {}: {e}", directory.display())))?;
        let path = directory.join(format!("{name}.rs"));
        fs::write(&path, source)
            .map_err(|e| MigrationError::File(format!("write {}: {e}", path.display())))?;
        info!(path = %path.display(), changes = grouped.len(), "Wrote schema migration snapshot");
        Ok(path)
    }
}

fn optional_literal(text: Option<&str>) -> String {
    match text {
        Some(text) => format!("Some({})", raw_literal(text)),
        None => "None".to_string(),
    }
}

/// Quote text as a Rust raw-string literal, widening the `#` fence until
/// the text cannot close it.
fn raw_literal(text: &str) -> String {
    let mut fence = 1;
    while text.contains(&format!("\"{}", "#".repeat(fence))) {
        fence += 1;
    }
    let hashes = "#".repeat(fence);
    format!("r{hashes}\"{text}\"{hashes}")
}
