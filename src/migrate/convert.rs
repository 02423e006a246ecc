// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Built-in record-transform migration.
//!
//! Rewrites named fields of every record belonging to one model: keys are
//! enumerated up front (filtered by the model's encoding type), processed
//! in fixed-size batches, and tracked in a resumable [`Checkpoint`] so an
//! interrupted run skips already-converted records when re-invoked.
//!
//! Per-field conversion failures follow a configurable policy; an
//! optional maximum-error count aborts the migration regardless of mode.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::metrics;
use crate::model::{ModelDescriptor, StorageKind};

use super::checkpoint::Checkpoint;
use super::{MigrationContext, MigrationError, MigrationUnit};

/// What to do when converting one field of one record fails.
#[derive(Debug, Clone)]
pub enum ConversionPolicy {
    /// Abort the whole migration on the first failure.
    FailFast,
    /// Leave the value unchanged, silently.
    Skip,
    /// Substitute a default value.
    UseDefault(Value),
    /// Log the failure and leave the value unchanged.
    LogAndSkip,
}

/// Context captured for every conversion failure.
#[derive(Debug, Clone)]
pub struct ConversionFailure {
    pub key: String,
    pub field: String,
    pub value: Value,
    pub cause: String,
}

/// A per-field value rewrite. Transforms must be idempotent: resumed runs
/// may feed them already-converted values.
pub trait FieldTransform: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, value: &Value) -> Result<Value, String>;
}

/// ISO-8601 timestamp string → epoch milliseconds.
///
/// Already-numeric values (and digit strings, the hash encoding of a
/// converted value) pass through unchanged, making re-runs safe.
pub struct IsoDateToEpochMs;

impl FieldTransform for IsoDateToEpochMs {
    fn name(&self) -> &str {
        "iso_date_to_epoch_ms"
    }

    fn apply(&self, value: &Value) -> Result<Value, String> {
        match value {
            Value::Number(_) => Ok(value.clone()),
            Value::String(s) => {
                if s.parse::<i64>().is_ok() {
                    return Ok(value.clone());
                }
                let parsed = OffsetDateTime::parse(s, &Rfc3339)
                    .map_err(|e| format!("not an ISO-8601 timestamp: {e}"))?;
                let millis = (parsed.unix_timestamp_nanos() / 1_000_000) as i64;
                Ok(Value::from(millis))
            }
            other => Err(format!("cannot convert {other} to a timestamp")),
        }
    }
}

/// Batch migration rewriting named fields of one model's records.
pub struct RecordTransformMigration {
    id: String,
    description: String,
    dependencies: Vec<String>,
    model: Arc<ModelDescriptor>,
    fields: Vec<String>,
    transform: Arc<dyn FieldTransform>,
    policy: ConversionPolicy,
    max_errors: Option<usize>,
    batch_size: usize,
    checkpoint_every: usize,
}

impl RecordTransformMigration {
    pub fn new(
        id: &str,
        description: &str,
        model: Arc<ModelDescriptor>,
        transform: Arc<dyn FieldTransform>,
    ) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            dependencies: Vec::new(),
            model,
            fields: Vec::new(),
            transform,
            policy: ConversionPolicy::FailFast,
            max_errors: None,
            batch_size: 500,
            checkpoint_every: 100,
        }
    }

    #[must_use]
    pub fn field(mut self, name: &str) -> Self {
        self.fields.push(name.to_string());
        self
    }

    #[must_use]
    pub fn depends_on(mut self, id: &str) -> Self {
        self.dependencies.push(id.to_string());
        self
    }

    #[must_use]
    pub fn policy(mut self, policy: ConversionPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn max_errors(mut self, limit: usize) -> Self {
        self.max_errors = Some(limit);
        self
    }

    #[must_use]
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    #[must_use]
    pub fn checkpoint_every(mut self, interval: usize) -> Self {
        self.checkpoint_every = interval.max(1);
        self
    }

    /// Apply the transform to one field value, honoring the policy.
    /// Returns the replacement value, or `None` to leave it unchanged.
    fn convert_value(
        &self,
        key: &str,
        field: &str,
        value: &Value,
        failures: &mut Vec<ConversionFailure>,
    ) -> Result<Option<Value>, MigrationError> {
        match self.transform.apply(value) {
            Ok(converted) => {
                if converted == *value {
                    Ok(None)
                } else {
                    Ok(Some(converted))
                }
            }
            Err(cause) => {
                failures.push(ConversionFailure {
                    key: key.to_string(),
                    field: field.to_string(),
                    value: value.clone(),
                    cause: cause.clone(),
                });
                if let Some(limit) = self.max_errors {
                    if failures.len() > limit {
                        return Err(MigrationError::TooManyFailures {
                            limit,
                            count: failures.len(),
                        });
                    }
                }
                match &self.policy {
                    ConversionPolicy::FailFast => Err(MigrationError::Conversion {
                        key: key.to_string(),
                        field: field.to_string(),
                        cause,
                    }),
                    ConversionPolicy::Skip => Ok(None),
                    ConversionPolicy::UseDefault(default) => Ok(Some(default.clone())),
                    ConversionPolicy::LogAndSkip => {
                        warn!(key, field, %value, cause = %cause, "Conversion failed, skipping");
                        Ok(None)
                    }
                }
            }
        }
    }

    async fn convert_hash_record(
        &self,
        context: &MigrationContext,
        key: &str,
        failures: &mut Vec<ConversionFailure>,
    ) -> Result<bool, MigrationError> {
        let mut record: HashMap<String, String> = context.store.hash_get_all(key).await?;
        let mut changed = false;
        for field in &self.fields {
            let Some(raw) = record.get(field).cloned() else {
                continue;
            };
            let current = Value::String(raw);
            if let Some(converted) = self.convert_value(key, field, &current, failures)? {
                let encoded = match &converted {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                record.insert(field.clone(), encoded);
                changed = true;
            }
        }
        if changed {
            let fields: Vec<(String, String)> = record.into_iter().collect();
            context.store.hash_set(key, &fields).await?;
        }
        Ok(changed)
    }

    async fn convert_json_record(
        &self,
        context: &MigrationContext,
        key: &str,
        failures: &mut Vec<ConversionFailure>,
    ) -> Result<bool, MigrationError> {
        let Some(raw) = context.store.json_get(key).await? else {
            return Ok(false);
        };
        let mut document: Value = serde_json::from_str(&raw)
            .map_err(|e| MigrationError::File(format!("corrupt document at '{key}': {e}")))?;
        let mut changed = false;
        for field in &self.fields {
            let Some(current) = document.get(field).cloned() else {
                continue;
            };
            if let Some(converted) = self.convert_value(key, field, &current, failures)? {
                document[field.as_str()] = converted;
                changed = true;
            }
        }
        if changed {
            let encoded = serde_json::to_string(&document)
                .map_err(|e| MigrationError::File(e.to_string()))?;
            context.store.json_set(key, &encoded).await?;
        }
        Ok(changed)
    }
}

#[async_trait]
impl MigrationUnit for RecordTransformMigration {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn dependencies(&self) -> Vec<String> {
        self.dependencies.clone()
    }

    async fn up(&self, context: &MigrationContext) -> Result<(), MigrationError> {
        let kind = self.model.storage().key_kind();
        let keys = context
            .store
            .scan_all(&self.model.key_pattern(), Some(kind))
            .await?;

        let mut checkpoint = match Checkpoint::load(context.store.as_ref(), &self.id).await? {
            Some(existing) => {
                warn!(
                    id = %self.id,
                    processed = existing.processed_keys.len(),
                    "Resuming from checkpoint"
                );
                existing
            }
            None => Checkpoint::new(self.model.name(), keys.len() as u64),
        };
        checkpoint.total_keys = keys.len() as u64;

        let mut failures: Vec<ConversionFailure> = Vec::new();
        let mut since_checkpoint = 0usize;

        for batch in keys.chunks(self.batch_size) {
            for key in batch {
                if checkpoint.processed_keys.contains(key) {
                    continue;
                }

                let result = match self.model.storage() {
                    StorageKind::Hash => {
                        self.convert_hash_record(context, key, &mut failures).await
                    }
                    StorageKind::Json => {
                        self.convert_json_record(context, key, &mut failures).await
                    }
                };
                match result {
                    Ok(true) => checkpoint.stats.converted += 1,
                    Ok(false) => checkpoint.stats.skipped += 1,
                    Err(e) => {
                        checkpoint.stats.failed += 1;
                        // Persist progress so the re-invoked run skips
                        // everything already converted.
                        checkpoint.save(context.store.as_ref(), &self.id).await?;
                        return Err(e);
                    }
                }

                checkpoint.processed_keys.insert(key.clone());
                metrics::record_records_processed(self.model.name(), 1);
                since_checkpoint += 1;
                if since_checkpoint >= self.checkpoint_every {
                    checkpoint.save(context.store.as_ref(), &self.id).await?;
                    since_checkpoint = 0;
                }
            }
        }

        checkpoint.stats.failed = failures.len() as u64;
        info!(
            id = %self.id,
            model = %self.model.name(),
            total = checkpoint.total_keys,
            converted = checkpoint.stats.converted,
            skipped = checkpoint.stats.skipped,
            failed = checkpoint.stats.failed,
            "Record transform complete"
        );
        Checkpoint::clear(context.store.as_ref(), &self.id).await?;
        Ok(())
    }
}
