//! Resumable migration progress.
//!
//! A [`Checkpoint`] persists the full processed-key set (plus counters)
//! under a per-migration key with a finite expiry, so an interrupted
//! batch migration can be re-invoked and skip already-converted keys.
//! Cleared only on full successful completion.
//!
//! The key set is stored as one JSON value; for very large record counts
//! its size is unbounded in the number of keys tracked. A range/cursor
//! resume token would bound it, at the cost of occasionally reprocessing
//! keys - safe only when the conversion is idempotent.

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::storage::OmStore;

use super::MigrationError;

/// Checkpoint expiry: a day. A checkpoint older than this is assumed
/// abandoned and the migration starts over.
pub const CHECKPOINT_TTL_SECS: u64 = 24 * 60 * 60;

/// Store key for a migration's checkpoint.
#[must_use]
pub fn state_key(migration_id: &str) -> String {
    format!("redis_om:migration_state:{migration_id}")
}

fn epoch_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Running counters snapshotted alongside progress.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CheckpointStats {
    pub converted: u64,
    pub skipped: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub processed_keys: HashSet<String>,
    pub current_model: String,
    pub total_keys: u64,
    pub stats: CheckpointStats,
    /// Epoch milliseconds of the last save.
    pub timestamp: i64,
}

impl Checkpoint {
    #[must_use]
    pub fn new(current_model: &str, total_keys: u64) -> Self {
        Self {
            processed_keys: HashSet::new(),
            current_model: current_model.to_string(),
            total_keys,
            stats: CheckpointStats::default(),
            timestamp: epoch_millis(),
        }
    }

    pub async fn load(
        store: &dyn OmStore,
        migration_id: &str,
    ) -> Result<Option<Self>, MigrationError> {
        let Some(raw) = store.get(&state_key(migration_id)).await? else {
            return Ok(None);
        };
        let checkpoint: Self = serde_json::from_str(&raw).map_err(|e| {
            MigrationError::File(format!("corrupt checkpoint for '{migration_id}': {e}"))
        })?;
        Ok(Some(checkpoint))
    }

    pub async fn save(
        &mut self,
        store: &dyn OmStore,
        migration_id: &str,
    ) -> Result<(), MigrationError> {
        self.timestamp = epoch_millis();
        let key = state_key(migration_id);
        let raw = serde_json::to_string(self)
            .map_err(|e| MigrationError::File(format!("encode checkpoint: {e}")))?;
        store.set(&key, &raw).await?;
        store.expire(&key, CHECKPOINT_TTL_SECS).await?;
        Ok(())
    }

    pub async fn clear(store: &dyn OmStore, migration_id: &str) -> Result<(), MigrationError> {
        store.del(&[state_key(migration_id)]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;

    #[tokio::test]
    async fn test_roundtrip() {
        let store = InMemoryStore::new();
        let mut checkpoint = Checkpoint::new("Person", 100);
        checkpoint.processed_keys.insert("person:1".to_string());
        checkpoint.stats.converted = 1;
        checkpoint.save(&store, "m1").await.unwrap();

        let loaded = Checkpoint::load(&store, "m1").await.unwrap().unwrap();
        assert_eq!(loaded.current_model, "Person");
        assert_eq!(loaded.total_keys, 100);
        assert!(loaded.processed_keys.contains("person:1"));
        assert_eq!(loaded.stats.converted, 1);
        assert!(loaded.timestamp > 0);
    }

    #[tokio::test]
    async fn test_save_sets_expiry() {
        let store = InMemoryStore::new();
        let mut checkpoint = Checkpoint::new("Person", 1);
        checkpoint.save(&store, "m1").await.unwrap();
        assert_eq!(
            store.ttl_of("redis_om:migration_state:m1"),
            Some(CHECKPOINT_TTL_SECS)
        );
    }

    #[tokio::test]
    async fn test_missing_checkpoint_is_none() {
        let store = InMemoryStore::new();
        assert!(Checkpoint::load(&store, "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_removes_state() {
        let store = InMemoryStore::new();
        let mut checkpoint = Checkpoint::new("Person", 1);
        checkpoint.save(&store, "m1").await.unwrap();
        Checkpoint::clear(&store, "m1").await.unwrap();
        assert!(Checkpoint::load(&store, "m1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_checkpoint_errors() {
        let store = InMemoryStore::new();
        store.set(&state_key("m1"), "not json").await.unwrap();
        assert!(Checkpoint::load(&store, "m1").await.is_err());
    }
}
