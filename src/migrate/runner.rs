// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Migration discovery, ordering, and execution.

use std::sync::Arc;

use tracing::{info, warn};

use crate::metrics;
use crate::model::ModelRegistry;
use crate::storage::OmStore;

use super::graph::topological_order;
use super::{MigrationContext, MigrationError, MigrationUnit};

/// Store set holding the ids of applied migrations.
pub const APPLIED_MIGRATIONS_KEY: &str = "redis_om:applied_migrations";

/// Snapshot of discovered units split by applied state, in dependency
/// order.
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    pub applied: Vec<String>,
    pub pending: Vec<String>,
}

/// Result of a rollback request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackOutcome {
    RolledBack,
    /// The unit does not implement `down()`. A capability gap, not a
    /// failure; the unit stays applied.
    Unsupported,
}

/// Discovers, orders, and executes data migrations.
pub struct DataMigrator {
    context: MigrationContext,
    units: Vec<Arc<dyn MigrationUnit>>,
}

impl DataMigrator {
    pub fn new(store: Arc<dyn OmStore>, registry: Arc<ModelRegistry>) -> Self {
        Self {
            context: MigrationContext { store, registry },
            units: Vec::new(),
        }
    }

    /// Register a discovered migration unit.
    pub fn register(&mut self, unit: Arc<dyn MigrationUnit>) {
        self.units.push(unit);
    }

    #[must_use]
    pub fn units(&self) -> &[Arc<dyn MigrationUnit>] {
        &self.units
    }

    /// Total order over all discovered units. Fails on a missing or
    /// circular dependency - before anything runs.
    fn ordered(&self) -> Result<Vec<Arc<dyn MigrationUnit>>, MigrationError> {
        let nodes: Vec<(String, Vec<String>)> = self
            .units
            .iter()
            .map(|u| (u.id().to_string(), u.dependencies()))
            .collect();
        let order = topological_order(&nodes)?;
        Ok(order.into_iter().map(|i| self.units[i].clone()).collect())
    }

    /// Applied/pending split, preserving dependency order.
    pub async fn status(&self) -> Result<MigrationStatus, MigrationError> {
        let applied_set = self
            .context
            .store
            .set_members(APPLIED_MIGRATIONS_KEY)
            .await?;
        let mut applied = Vec::new();
        let mut pending = Vec::new();
        for unit in self.ordered()? {
            if applied_set.contains(unit.id()) {
                applied.push(unit.id().to_string());
            } else {
                pending.push(unit.id().to_string());
            }
        }
        Ok(MigrationStatus { applied, pending })
    }

    /// Apply every pending unit in dependency order.
    ///
    /// A unit whose `can_run()` returns `false` is skipped, not failed.
    /// The first failing unit aborts the run without being marked applied;
    /// units applied earlier in the same run stay applied - partial
    /// progress is retained, never rolled back automatically. Returns the
    /// number of units applied.
    pub async fn run_migrations(&self, dry_run: bool) -> Result<usize, MigrationError> {
        let ordered = self.ordered()?;
        let applied_set = self
            .context
            .store
            .set_members(APPLIED_MIGRATIONS_KEY)
            .await?;
        let pending: Vec<_> = ordered
            .into_iter()
            .filter(|u| !applied_set.contains(u.id()))
            .collect();

        if dry_run {
            for unit in &pending {
                info!(id = %unit.id(), description = %unit.description(), "Would apply");
            }
            return Ok(pending.len());
        }

        let mut applied = 0;
        for unit in pending {
            if !unit.can_run(&self.context).await? {
                info!(id = %unit.id(), "Pre-check declined, skipping");
                continue;
            }
            info!(id = %unit.id(), description = %unit.description(), "Applying migration");
            if let Err(e) = unit.up(&self.context).await {
                metrics::record_data_migration("up", false);
                warn!(id = %unit.id(), error = %e, "Migration failed, aborting run");
                return Err(MigrationError::UnitFailed {
                    id: unit.id().to_string(),
                    reason: e.to_string(),
                });
            }
            self.context
                .store
                .set_add(APPLIED_MIGRATIONS_KEY, unit.id())
                .await?;
            metrics::record_data_migration("up", true);
            applied += 1;
        }
        info!(applied, "Migration run complete");
        Ok(applied)
    }

    /// Roll back one migration: the given id, or the most recently ordered
    /// applied unit when `id` is `None`.
    pub async fn rollback(&self, id: Option<&str>) -> Result<RollbackOutcome, MigrationError> {
        let ordered = self.ordered()?;
        let applied_set = self
            .context
            .store
            .set_members(APPLIED_MIGRATIONS_KEY)
            .await?;

        let unit = match id {
            Some(id) => ordered
                .iter()
                .find(|u| u.id() == id)
                .cloned()
                .ok_or_else(|| MigrationError::UnknownMigration(id.to_string()))?,
            None => ordered
                .iter()
                .rev()
                .find(|u| applied_set.contains(u.id()))
                .cloned()
                .ok_or_else(|| MigrationError::NotApplied("<none applied>".to_string()))?,
        };

        if !applied_set.contains(unit.id()) {
            return Err(MigrationError::NotApplied(unit.id().to_string()));
        }
        if !unit.supports_rollback() {
            info!(id = %unit.id(), "Rollback not supported by this migration");
            return Ok(RollbackOutcome::Unsupported);
        }

        info!(id = %unit.id(), "Rolling back migration");
        unit.down(&self.context).await.map_err(|e| {
            metrics::record_data_migration("down", false);
            MigrationError::UnitFailed {
                id: unit.id().to_string(),
                reason: e.to_string(),
            }
        })?;
        self.context
            .store
            .set_remove(APPLIED_MIGRATIONS_KEY, unit.id())
            .await?;
        metrics::record_data_migration("down", true);
        Ok(RollbackOutcome::RolledBack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Scripted unit recording execution order into a shared log.
    struct RecordingUnit {
        id: String,
        deps: Vec<String>,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
        runnable: bool,
        rollback: bool,
    }

    impl RecordingUnit {
        fn new(id: &str, deps: &[&str], log: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                id: id.to_string(),
                deps: deps.iter().map(|d| d.to_string()).collect(),
                log,
                fail: false,
                runnable: true,
                rollback: false,
            }
        }
    }

    #[async_trait]
    impl MigrationUnit for RecordingUnit {
        fn id(&self) -> &str {
            &self.id
        }

        fn description(&self) -> &str {
            "test unit"
        }

        fn dependencies(&self) -> Vec<String> {
            self.deps.clone()
        }

        fn supports_rollback(&self) -> bool {
            self.rollback
        }

        async fn can_run(&self, _context: &MigrationContext) -> Result<bool, MigrationError> {
            Ok(self.runnable)
        }

        async fn up(&self, _context: &MigrationContext) -> Result<(), MigrationError> {
            if self.fail {
                return Err(MigrationError::UnitFailed {
                    id: self.id.clone(),
                    reason: "scripted failure".to_string(),
                });
            }
            self.log.lock().push(format!("up:{}", self.id));
            Ok(())
        }

        async fn down(&self, _context: &MigrationContext) -> Result<(), MigrationError> {
            self.log.lock().push(format!("down:{}", self.id));
            Ok(())
        }
    }

    fn migrator() -> (DataMigrator, Arc<InMemoryStore>, Arc<Mutex<Vec<String>>>) {
        let store = Arc::new(InMemoryStore::new());
        let registry = Arc::new(crate::model::ModelRegistry::new());
        let migrator = DataMigrator::new(store.clone(), registry);
        (migrator, store, Arc::new(Mutex::new(Vec::new())))
    }

    #[tokio::test]
    async fn test_applies_in_dependency_order() {
        let (mut migrator, store, log) = migrator();
        migrator.register(Arc::new(RecordingUnit::new("b", &["a"], log.clone())));
        migrator.register(Arc::new(RecordingUnit::new("a", &[], log.clone())));

        let applied = migrator.run_migrations(false).await.unwrap();
        assert_eq!(applied, 2);
        assert_eq!(*log.lock(), vec!["up:a", "up:b"]);

        let members = store.set_members(APPLIED_MIGRATIONS_KEY).await.unwrap();
        assert!(members.contains("a") && members.contains("b"));
    }

    #[tokio::test]
    async fn test_rerun_applies_nothing() {
        let (mut migrator, _store, log) = migrator();
        migrator.register(Arc::new(RecordingUnit::new("a", &[], log.clone())));

        assert_eq!(migrator.run_migrations(false).await.unwrap(), 1);
        assert_eq!(migrator.run_migrations(false).await.unwrap(), 0);
        assert_eq!(log.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_stops_run_and_keeps_prior_progress() {
        let (mut migrator, store, log) = migrator();
        migrator.register(Arc::new(RecordingUnit::new("a", &[], log.clone())));
        let mut failing = RecordingUnit::new("b", &["a"], log.clone());
        failing.fail = true;
        migrator.register(Arc::new(failing));
        migrator.register(Arc::new(RecordingUnit::new("c", &["b"], log.clone())));

        let err = migrator.run_migrations(false).await.unwrap_err();
        assert!(matches!(err, MigrationError::UnitFailed { ref id, .. } if id == "b"));

        let members = store.set_members(APPLIED_MIGRATIONS_KEY).await.unwrap();
        assert!(members.contains("a"), "prior success stays applied");
        assert!(!members.contains("b"), "failed unit not marked applied");
        assert!(!members.contains("c"), "later unit never ran");
        assert_eq!(*log.lock(), vec!["up:a"]);
    }

    #[tokio::test]
    async fn test_can_run_false_skips_without_failing() {
        let (mut migrator, store, log) = migrator();
        let mut skipped = RecordingUnit::new("a", &[], log.clone());
        skipped.runnable = false;
        migrator.register(Arc::new(skipped));
        migrator.register(Arc::new(RecordingUnit::new("b", &[], log.clone())));

        assert_eq!(migrator.run_migrations(false).await.unwrap(), 1);
        let members = store.set_members(APPLIED_MIGRATIONS_KEY).await.unwrap();
        assert!(!members.contains("a"));
        assert!(members.contains("b"));
    }

    #[tokio::test]
    async fn test_dry_run_reports_without_applying() {
        let (mut migrator, store, log) = migrator();
        migrator.register(Arc::new(RecordingUnit::new("a", &[], log.clone())));

        assert_eq!(migrator.run_migrations(true).await.unwrap(), 1);
        assert!(log.lock().is_empty());
        assert!(store
            .set_members(APPLIED_MIGRATIONS_KEY)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_cycle_aborts_before_anything_runs() {
        let (mut migrator, store, log) = migrator();
        migrator.register(Arc::new(RecordingUnit::new("a", &["b"], log.clone())));
        migrator.register(Arc::new(RecordingUnit::new("b", &["a"], log.clone())));

        let err = migrator.run_migrations(false).await.unwrap_err();
        assert!(matches!(err, MigrationError::CircularDependency(_)));
        assert!(log.lock().is_empty());
        assert!(store
            .set_members(APPLIED_MIGRATIONS_KEY)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_rollback_supported_unit() {
        let (mut migrator, store, log) = migrator();
        let mut unit = RecordingUnit::new("a", &[], log.clone());
        unit.rollback = true;
        migrator.register(Arc::new(unit));

        migrator.run_migrations(false).await.unwrap();
        let outcome = migrator.rollback(Some("a")).await.unwrap();
        assert_eq!(outcome, RollbackOutcome::RolledBack);
        assert!(log.lock().contains(&"down:a".to_string()));
        assert!(store
            .set_members(APPLIED_MIGRATIONS_KEY)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_rollback_unsupported_is_distinct_from_failure() {
        let (mut migrator, store, log) = migrator();
        migrator.register(Arc::new(RecordingUnit::new("a", &[], log.clone())));

        migrator.run_migrations(false).await.unwrap();
        let outcome = migrator.rollback(Some("a")).await.unwrap();
        assert_eq!(outcome, RollbackOutcome::Unsupported);
        // State unchanged.
        assert!(store
            .set_members(APPLIED_MIGRATIONS_KEY)
            .await
            .unwrap()
            .contains("a"));
    }

    #[tokio::test]
    async fn test_rollback_unapplied_fails() {
        let (mut migrator, _store, log) = migrator();
        migrator.register(Arc::new(RecordingUnit::new("a", &[], log.clone())));
        let err = migrator.rollback(Some("a")).await.unwrap_err();
        assert!(matches!(err, MigrationError::NotApplied(_)));
    }

    #[tokio::test]
    async fn test_rollback_latest_applied_by_default() {
        let (mut migrator, _store, log) = migrator();
        let mut a = RecordingUnit::new("a", &[], log.clone());
        a.rollback = true;
        let mut b = RecordingUnit::new("b", &["a"], log.clone());
        b.rollback = true;
        migrator.register(Arc::new(a));
        migrator.register(Arc::new(b));

        migrator.run_migrations(false).await.unwrap();
        migrator.rollback(None).await.unwrap();
        assert_eq!(log.lock().last().map(String::as_str), Some("down:b"));
    }

    #[tokio::test]
    async fn test_status_splits_applied_and_pending() {
        let (mut migrator, _store, log) = migrator();
        migrator.register(Arc::new(RecordingUnit::new("a", &[], log.clone())));
        migrator.run_migrations(false).await.unwrap();
        migrator.register(Arc::new(RecordingUnit::new("b", &["a"], log.clone())));

        let status = migrator.status().await.unwrap();
        assert_eq!(status.applied, vec!["a"]);
        assert_eq!(status.pending, vec!["b"]);
    }
}
