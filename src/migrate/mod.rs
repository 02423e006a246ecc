// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Data migration.
//!
//! A [`MigrationUnit`] is a named, dependency-ordered transformation of
//! stored records with an apply/rollback pair. The [`DataMigrator`]
//! discovers registered units, orders them topologically, tracks which
//! ids have been applied in a store-side set, and executes pending units
//! strictly in order. [`convert::RecordTransformMigration`] is the
//! built-in unit for per-field record rewrites with batch pagination and
//! resumable checkpoints.

pub mod checkpoint;
pub mod convert;
pub mod graph;
pub mod runner;

pub use checkpoint::{Checkpoint, CheckpointStats, CHECKPOINT_TTL_SECS};
pub use convert::{
    ConversionPolicy, FieldTransform, IsoDateToEpochMs, RecordTransformMigration,
};
pub use runner::{DataMigrator, MigrationStatus, RollbackOutcome, APPLIED_MIGRATIONS_KEY};

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{ModelRegistry, SchemaError};
use crate::storage::{OmStore, StorageError};

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Index creation requires the default logical database, connection uses db {0}")]
    WrongDatabase(i64),
    #[error("No registered model named '{0}'")]
    UnknownModel(String),
    #[error("No discovered migration with id '{0}'")]
    UnknownMigration(String),
    #[error("Migration '{id}' depends on '{dependency}', which was not discovered")]
    MissingDependency { id: String, dependency: String },
    #[error("Circular dependency among migrations: {0:?}")]
    CircularDependency(Vec<String>),
    #[error("Migration '{0}' has not been applied")]
    NotApplied(String),
    #[error("Migration '{0}' does not support rollback")]
    RollbackUnsupported(String),
    #[error("Migration '{id}' failed: {reason}")]
    UnitFailed { id: String, reason: String },
    #[error("Conversion failed for key '{key}', field '{field}': {cause}")]
    Conversion {
        key: String,
        field: String,
        cause: String,
    },
    #[error("Aborting after {count} conversion failures (limit {limit})")]
    TooManyFailures { limit: usize, count: usize },
    #[error("Migration file error: {0}")]
    File(String),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Shared collaborators handed to every migration unit.
#[derive(Clone)]
pub struct MigrationContext {
    pub store: Arc<dyn OmStore>,
    pub registry: Arc<ModelRegistry>,
}

/// A named, idempotent data transformation with declared dependencies.
///
/// Ids must be unique, stable, and sortable - timestamp-prefixed strings
/// (`20260315_convert_signup_dates`) keep discovery order chronological.
#[async_trait]
pub trait MigrationUnit: Send + Sync {
    fn id(&self) -> &str;

    fn description(&self) -> &str;

    /// Ids of migrations that must be applied before this one.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Whether [`down`](Self::down) is implemented. A unit without
    /// rollback support is a capability gap, reported distinctly from a
    /// rollback failure.
    fn supports_rollback(&self) -> bool {
        false
    }

    /// Pre-check: returning `false` skips the unit for this run without
    /// marking it applied or failing the run.
    async fn can_run(&self, _context: &MigrationContext) -> Result<bool, MigrationError> {
        Ok(true)
    }

    async fn up(&self, context: &MigrationContext) -> Result<(), MigrationError>;

    async fn down(&self, _context: &MigrationContext) -> Result<(), MigrationError> {
        Err(MigrationError::RollbackUnsupported(self.id().to_string()))
    }
}
