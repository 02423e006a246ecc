use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use dashmap::DashMap;

use super::traits::{KeyKind, OmStore, SearchPage, SearchRequest, StorageError};

#[derive(Debug, Clone)]
enum Entry {
    Plain(String),
    Hash(HashMap<String, String>),
    Json(String),
    Set(HashSet<String>),
}

/// In-process store for unit tests.
///
/// Implements the full key/hash/json/set surface plus index bookkeeping so
/// both migrators can be exercised without a server. `ft_search` is not
/// supported - query-string construction is covered by the resolver's own
/// tests and end-to-end search by the integration suite.
pub struct InMemoryStore {
    data: DashMap<String, Entry>,
    indexes: DashMap<String, Vec<String>>,
    ttls: DashMap<String, u64>,
    db: i64,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_db_index(0)
    }

    /// A store that reports a specific logical database number, for
    /// exercising the wrong-database guard.
    #[must_use]
    pub fn with_db_index(db: i64) -> Self {
        Self {
            data: DashMap::new(),
            indexes: DashMap::new(),
            ttls: DashMap::new(),
            db,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// TTL recorded by the last `expire` on this key, if any.
    #[must_use]
    pub fn ttl_of(&self, key: &str) -> Option<u64> {
        self.ttls.get(key).map(|t| *t)
    }

    /// Argument vector of a currently defined index, if any.
    #[must_use]
    pub fn index_args(&self, index: &str) -> Option<Vec<String>> {
        self.indexes.get(index).map(|a| a.clone())
    }

    pub fn clear(&self) {
        self.data.clear();
        self.indexes.clear();
        self.ttls.clear();
    }

    fn kind_of(entry: &Entry) -> Option<KeyKind> {
        match entry {
            Entry::Hash(_) => Some(KeyKind::Hash),
            Entry::Json(_) => Some(KeyKind::Json),
            _ => None,
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Glob match supporting `*` only, which is all SCAN patterns here use.
fn glob_match(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }
    let mut rest = key;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == parts.len() - 1 && !pattern.ends_with('*') {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}

#[async_trait]
impl OmStore for InMemoryStore {
    fn key_prefix(&self) -> &str {
        ""
    }

    fn db_index(&self) -> i64 {
        self.db
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.data.get(key).map(|e| e.clone()) {
            Some(Entry::Plain(v)) => Ok(Some(v)),
            Some(_) => Err(StorageError::Backend(format!(
                "wrong type for GET on '{key}'"
            ))),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.data
            .insert(key.to_string(), Entry::Plain(value.to_string()));
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<u64, StorageError> {
        let mut removed = 0;
        for key in keys {
            if self.data.remove(key).is_some() {
                removed += 1;
            }
            self.ttls.remove(key);
        }
        Ok(removed)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), StorageError> {
        self.ttls.insert(key.to_string(), ttl_secs);
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StorageError> {
        match self.data.get(key).map(|e| e.clone()) {
            Some(Entry::Hash(map)) => Ok(map),
            Some(_) => Err(StorageError::Backend(format!(
                "wrong type for HGETALL on '{key}'"
            ))),
            None => Ok(HashMap::new()),
        }
    }

    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<(), StorageError> {
        let map = fields.iter().cloned().collect();
        self.data.insert(key.to_string(), Entry::Hash(map));
        Ok(())
    }

    async fn json_get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.data.get(key).map(|e| e.clone()) {
            Some(Entry::Json(doc)) => Ok(Some(doc)),
            Some(_) => Err(StorageError::Backend(format!(
                "wrong type for JSON.GET on '{key}'"
            ))),
            None => Ok(None),
        }
    }

    async fn json_set(&self, key: &str, json: &str) -> Result<(), StorageError> {
        self.data
            .insert(key.to_string(), Entry::Json(json.to_string()));
        Ok(())
    }

    async fn ft_create(&self, args: &[String]) -> Result<bool, StorageError> {
        let index = args
            .first()
            .ok_or_else(|| StorageError::Backend("FT.CREATE with no index name".into()))?;
        if self.indexes.contains_key(index) {
            return Ok(false);
        }
        self.indexes.insert(index.clone(), args.to_vec());
        Ok(true)
    }

    async fn ft_drop(&self, index: &str) -> Result<bool, StorageError> {
        Ok(self.indexes.remove(index).is_some())
    }

    async fn ft_exists(&self, index: &str) -> Result<bool, StorageError> {
        Ok(self.indexes.contains_key(index))
    }

    async fn ft_search(&self, _request: &SearchRequest) -> Result<SearchPage, StorageError> {
        Err(StorageError::Backend(
            "InMemoryStore does not implement search".into(),
        ))
    }

    async fn scan_page(
        &self,
        pattern: &str,
        kind: Option<KeyKind>,
        cursor: u64,
        _count: usize,
    ) -> Result<(u64, Vec<String>), StorageError> {
        // Single-page scan: everything in one batch, terminal cursor.
        if cursor != 0 {
            return Ok((0, Vec::new()));
        }
        let mut keys: Vec<String> = self
            .data
            .iter()
            .filter(|entry| glob_match(pattern, entry.key()))
            .filter(|entry| match kind {
                Some(k) => Self::kind_of(entry.value()) == Some(k),
                None => true,
            })
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok((0, keys))
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), StorageError> {
        let mut entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Entry::Set(HashSet::new()));
        match entry.value_mut() {
            Entry::Set(set) => {
                set.insert(member.to_string());
                Ok(())
            }
            _ => Err(StorageError::Backend(format!(
                "wrong type for SADD on '{key}'"
            ))),
        }
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StorageError> {
        match self.data.get_mut(key).as_deref_mut() {
            Some(Entry::Set(set)) => Ok(set.remove(member)),
            Some(_) => Err(StorageError::Backend(format!(
                "wrong type for SREM on '{key}'"
            ))),
            None => Ok(false),
        }
    }

    async fn set_members(&self, key: &str) -> Result<HashSet<String>, StorageError> {
        match self.data.get(key).map(|e| e.clone()) {
            Some(Entry::Set(set)) => Ok(set),
            Some(_) => Err(StorageError::Backend(format!(
                "wrong type for SMEMBERS on '{key}'"
            ))),
            None => Ok(HashSet::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_plain_roundtrip() {
        let store = InMemoryStore::new();
        store.set("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.del(&["k".to_string()]).await.unwrap(), 1);
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_del_missing_is_zero() {
        let store = InMemoryStore::new();
        assert_eq!(store.del(&["ghost".to_string()]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_hash_roundtrip() {
        let store = InMemoryStore::new();
        store
            .hash_set(
                "h",
                &[
                    ("name".to_string(), "Alice".to_string()),
                    ("age".to_string(), "30".to_string()),
                ],
            )
            .await
            .unwrap();
        let map = store.hash_get_all("h").await.unwrap();
        assert_eq!(map.get("name").map(String::as_str), Some("Alice"));
        assert_eq!(map.len(), 2);
    }

    #[tokio::test]
    async fn test_index_create_is_idempotent() {
        let store = InMemoryStore::new();
        let args = vec!["idx".to_string(), "ON".to_string(), "HASH".to_string()];
        assert!(store.ft_create(&args).await.unwrap());
        assert!(!store.ft_create(&args).await.unwrap());
        assert!(store.ft_exists("idx").await.unwrap());
        assert!(store.ft_drop("idx").await.unwrap());
        assert!(!store.ft_drop("idx").await.unwrap());
    }

    #[tokio::test]
    async fn test_scan_filters_by_kind() {
        let store = InMemoryStore::new();
        store
            .hash_set("person:1", &[("a".to_string(), "1".to_string())])
            .await
            .unwrap();
        store.json_set("person:2", "{}").await.unwrap();
        store.set("person:3", "plain").await.unwrap();

        let hashes = store
            .scan_all("person:*", Some(KeyKind::Hash))
            .await
            .unwrap();
        assert_eq!(hashes, vec!["person:1".to_string()]);

        let docs = store.scan_all("person:*", Some(KeyKind::Json)).await.unwrap();
        assert_eq!(docs, vec!["person:2".to_string()]);

        let all = store.scan_all("person:*", None).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_set_membership() {
        let store = InMemoryStore::new();
        store.set_add("s", "a").await.unwrap();
        store.set_add("s", "b").await.unwrap();
        assert!(store.set_contains("s", "a").await.unwrap());
        assert!(store.set_remove("s", "a").await.unwrap());
        assert!(!store.set_remove("s", "a").await.unwrap());
        assert_eq!(store.set_members("s").await.unwrap().len(), 1);
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("person:*", "person:1"));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("a*c", "abc"));
        assert!(!glob_match("person:*", "order:1"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exact2"));
    }
}
