use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum StorageError {
    #[error("Store connection error: {0}")]
    Connection(String),
    #[error("Store backend error: {0}")]
    Backend(String),
    #[error("Failed to decode stored value: {0}")]
    Decode(String),
}

/// Encoding of a stored record, used to filter key scans.
///
/// Redis reports hash-encoded records as type `hash` and RedisJSON
/// documents as `ReJSON-RL`; scans that enumerate one model's records
/// filter on the matching type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Hash,
    Json,
}

impl KeyKind {
    /// The TYPE tag Redis reports for this encoding.
    #[must_use]
    pub fn type_tag(&self) -> &'static str {
        match self {
            KeyKind::Hash => "hash",
            KeyKind::Json => "ReJSON-RL",
        }
    }
}

/// Sort directive for a search request. FT.SEARCH accepts a single SORTBY.
#[derive(Debug, Clone)]
pub struct SortBy {
    pub field: String,
    pub descending: bool,
}

/// A single paginated FT.SEARCH invocation.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Full index name (global prefix already applied).
    pub index: String,
    /// Resolved query string.
    pub query: String,
    pub offset: u64,
    pub limit: u64,
    pub sort_by: Option<SortBy>,
    /// NOCONTENT: return keys and total only.
    pub no_content: bool,
}

/// Payload of one search hit.
#[derive(Debug, Clone)]
pub enum HitPayload {
    /// NOCONTENT reply: key only.
    None,
    /// Hash-encoded record: flattened field/value pairs.
    Fields(Vec<(String, String)>),
    /// Document-encoded record: the whole JSON document under `$`.
    Json(String),
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    /// Record key as returned by the engine (global prefix still attached).
    pub key: String,
    pub payload: HitPayload,
}

/// One page of search results.
#[derive(Debug, Clone)]
pub struct SearchPage {
    /// Total matches reported by the engine (across all pages).
    pub total: u64,
    pub hits: Vec<SearchHit>,
}

/// The store command surface the mapper consumes.
///
/// Everything the query cursor and both migrators need from Redis, kept
/// narrow enough that tests can substitute [`InMemoryStore`] for the parts
/// that don't require the search module.
///
/// [`InMemoryStore`]: crate::storage::memory::InMemoryStore
#[async_trait]
pub trait OmStore: Send + Sync {
    /// Global key prefix applied to every key this store touches.
    fn key_prefix(&self) -> &str;

    /// Logical database number of the underlying connection.
    fn db_index(&self) -> i64;

    // ── plain keys ──────────────────────────────────────────────────────

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete keys. Returns the number actually removed; deleting keys
    /// that don't exist is not an error.
    async fn del(&self, keys: &[String]) -> Result<u64, StorageError>;

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), StorageError>;

    // ── hash-encoded records ────────────────────────────────────────────

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StorageError>;
    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<(), StorageError>;

    // ── document-encoded records ────────────────────────────────────────

    async fn json_get(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn json_set(&self, key: &str, json: &str) -> Result<(), StorageError>;

    // ── search indexes ──────────────────────────────────────────────────

    /// FT.CREATE with a pre-built argument vector. Returns `false` when the
    /// index already exists (tolerated, not an error).
    async fn ft_create(&self, args: &[String]) -> Result<bool, StorageError>;

    /// FT.DROPINDEX. Returns `false` when no such index exists.
    async fn ft_drop(&self, index: &str) -> Result<bool, StorageError>;

    /// Whether the index is currently defined (FT.INFO succeeds).
    async fn ft_exists(&self, index: &str) -> Result<bool, StorageError>;

    async fn ft_search(&self, request: &SearchRequest) -> Result<SearchPage, StorageError>;

    // ── key enumeration ─────────────────────────────────────────────────

    /// One SCAN step: returns the next cursor and a batch of matching keys.
    /// A returned cursor of 0 means the scan is complete. The enumeration
    /// is restartable from any previously returned cursor.
    async fn scan_page(
        &self,
        pattern: &str,
        kind: Option<KeyKind>,
        cursor: u64,
        count: usize,
    ) -> Result<(u64, Vec<String>), StorageError>;

    /// Drain the scan to completion.
    async fn scan_all(
        &self,
        pattern: &str,
        kind: Option<KeyKind>,
    ) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        let mut cursor = 0u64;
        loop {
            let (next, batch) = self.scan_page(pattern, kind, cursor, 500).await?;
            keys.extend(batch);
            if next == 0 {
                return Ok(keys);
            }
            cursor = next;
        }
    }

    // ── sets (applied-migration tracking) ───────────────────────────────

    async fn set_add(&self, key: &str, member: &str) -> Result<(), StorageError>;

    /// Returns `true` if the member was present and removed.
    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StorageError>;

    async fn set_members(&self, key: &str) -> Result<HashSet<String>, StorageError>;

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StorageError> {
        Ok(self.set_members(key).await?.contains(member))
    }
}
