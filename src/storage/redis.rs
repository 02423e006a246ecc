//! Redis storage backend.
//!
//! Content-type aware record storage over Redis Stack:
//! - **Hash records** → `HSET` flattened field/value pairs, indexable `ON HASH`
//! - **Document records** → `JSON.SET` at the root path, indexable `ON JSON`
//!
//! Search-module commands (`FT.CREATE`, `FT.DROPINDEX`, `FT.INFO`,
//! `FT.SEARCH`) go through raw commands since the client crate has no
//! typed bindings for them. All keys are namespaced with an optional
//! global prefix; keys handed back to callers have the prefix stripped.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{cmd, AsyncCommands, Client};
use tokio::time::sleep;
use tracing::{debug, warn};

use super::traits::{
    HitPayload, KeyKind, OmStore, SearchHit, SearchPage, SearchRequest, StorageError,
};

/// Bounded exponential backoff for transient command failures.
#[derive(Debug, Clone)]
struct Backoff {
    attempts: usize,
    initial: Duration,
    max: Duration,
}

impl Backoff {
    /// Initial connection: a few slower attempts, then surface the error
    /// so a bad URL fails within seconds.
    fn connect() -> Self {
        Self {
            attempts: 5,
            initial: Duration::from_millis(200),
            max: Duration::from_secs(2),
        }
    }

    /// Individual commands: quick retries, then let the caller handle it.
    fn command() -> Self {
        Self {
            attempts: 3,
            initial: Duration::from_millis(100),
            max: Duration::from_secs(1),
        }
    }
}

async fn with_backoff<F, Fut, T>(
    op: &str,
    policy: &Backoff,
    mut run: F,
) -> Result<T, redis::RedisError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, redis::RedisError>>,
{
    let mut delay = policy.initial;
    let mut attempt = 0;
    loop {
        match run().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= policy.attempts {
                    return Err(err);
                }
                warn!(
                    operation = op,
                    attempt,
                    max = policy.attempts,
                    error = %err,
                    "Command failed, retrying"
                );
                sleep(delay).await;
                delay = (delay * 2).min(policy.max);
            }
        }
    }
}

pub struct RedisStore {
    connection: ConnectionManager,
    /// Global key prefix (e.g. `"redsqrl:"`).
    prefix: String,
    /// Logical database number parsed from the connection URL.
    db: i64,
}

impl RedisStore {
    /// Connect without a global key prefix.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        Self::connect_with_prefix(url, None).await
    }

    /// Connect with an optional global key prefix prepended to every key,
    /// enabling namespacing when sharing a Redis instance.
    pub async fn connect_with_prefix(
        url: &str,
        prefix: Option<&str>,
    ) -> Result<Self, StorageError> {
        let client = Client::open(url).map_err(|e| StorageError::Connection(e.to_string()))?;
        let db = client.get_connection_info().redis.db;

        let connection = with_backoff("connect", &Backoff::connect(), || {
            ConnectionManager::new(client.clone())
        })
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(Self {
            connection,
            prefix: prefix.unwrap_or("").to_string(),
            db,
        })
    }

    #[inline]
    fn prefixed(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}", self.prefix, key)
        }
    }

    #[inline]
    fn stripped(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            key.strip_prefix(&self.prefix).unwrap_or(key).to_string()
        }
    }

    fn backend(e: redis::RedisError) -> StorageError {
        StorageError::Backend(e.to_string())
    }

    /// Parse an FT.SEARCH reply.
    ///
    /// Shape: `[total, key1, payload1?, key2, payload2?, ...]` where the
    /// payload element is absent under NOCONTENT and is otherwise an array
    /// of field/value pairs. Document records carry a single `$` field
    /// whose value is the whole JSON document.
    fn parse_search_reply(
        &self,
        raw: redis::Value,
        no_content: bool,
    ) -> Result<SearchPage, StorageError> {
        let items = match raw {
            redis::Value::Bulk(items) => items,
            other => {
                return Err(StorageError::Decode(format!(
                    "unexpected FT.SEARCH reply: {other:?}"
                )))
            }
        };
        let mut iter = items.into_iter();
        let total = match iter.next() {
            Some(redis::Value::Int(n)) => n.max(0) as u64,
            other => {
                return Err(StorageError::Decode(format!(
                    "FT.SEARCH reply missing total: {other:?}"
                )))
            }
        };

        let mut hits = Vec::new();
        while let Some(key_value) = iter.next() {
            let key = string_value(&key_value).ok_or_else(|| {
                StorageError::Decode(format!("FT.SEARCH hit key not a string: {key_value:?}"))
            })?;
            let payload = if no_content {
                HitPayload::None
            } else {
                match iter.next() {
                    Some(redis::Value::Bulk(pairs)) => decode_hit_fields(&pairs)?,
                    Some(redis::Value::Nil) | None => HitPayload::None,
                    Some(other) => {
                        return Err(StorageError::Decode(format!(
                            "FT.SEARCH hit payload not an array: {other:?}"
                        )))
                    }
                }
            };
            hits.push(SearchHit {
                key: self.stripped(&key),
                payload,
            });
        }

        Ok(SearchPage { total, hits })
    }
}

fn string_value(value: &redis::Value) -> Option<String> {
    match value {
        redis::Value::Data(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        redis::Value::Status(s) => Some(s.clone()),
        _ => None,
    }
}

fn decode_hit_fields(pairs: &[redis::Value]) -> Result<HitPayload, StorageError> {
    let mut fields = Vec::with_capacity(pairs.len() / 2);
    let mut i = 0;
    while i + 1 < pairs.len() {
        let name = string_value(&pairs[i])
            .ok_or_else(|| StorageError::Decode("non-string field name in hit".into()))?;
        let value = string_value(&pairs[i + 1])
            .ok_or_else(|| StorageError::Decode("non-string field value in hit".into()))?;
        fields.push((name, value));
        i += 2;
    }
    // Document hits come back as a single `$` pair holding the document.
    if fields.len() == 1 && fields[0].0 == "$" {
        let (_, doc) = fields.remove(0);
        return Ok(HitPayload::Json(doc));
    }
    Ok(HitPayload::Fields(fields))
}

#[async_trait]
impl OmStore for RedisStore {
    fn key_prefix(&self) -> &str {
        &self.prefix
    }

    fn db_index(&self) -> i64 {
        self.db
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let full = self.prefixed(key);
        with_backoff("get", &Backoff::command(), || {
            let mut conn = self.connection.clone();
            let key = full.clone();
            async move { conn.get::<_, Option<String>>(&key).await }
        })
        .await
        .map_err(Self::backend)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let full = self.prefixed(key);
        with_backoff("set", &Backoff::command(), || {
            let mut conn = self.connection.clone();
            let key = full.clone();
            let value = value.to_string();
            async move { conn.set::<_, _, ()>(&key, &value).await }
        })
        .await
        .map_err(Self::backend)
    }

    async fn del(&self, keys: &[String]) -> Result<u64, StorageError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let full: Vec<String> = keys.iter().map(|k| self.prefixed(k)).collect();
        with_backoff("del", &Backoff::command(), || {
            let mut conn = self.connection.clone();
            let keys = full.clone();
            async move { conn.del::<_, u64>(&keys).await }
        })
        .await
        .map_err(Self::backend)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), StorageError> {
        let full = self.prefixed(key);
        with_backoff("expire", &Backoff::command(), || {
            let mut conn = self.connection.clone();
            let key = full.clone();
            async move { conn.expire::<_, ()>(&key, ttl_secs as i64).await }
        })
        .await
        .map_err(Self::backend)
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StorageError> {
        let full = self.prefixed(key);
        with_backoff("hgetall", &Backoff::command(), || {
            let mut conn = self.connection.clone();
            let key = full.clone();
            async move { conn.hgetall::<_, HashMap<String, String>>(&key).await }
        })
        .await
        .map_err(Self::backend)
    }

    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<(), StorageError> {
        if fields.is_empty() {
            return Ok(());
        }
        let full = self.prefixed(key);
        with_backoff("hset", &Backoff::command(), || {
            let mut conn = self.connection.clone();
            let key = full.clone();
            let fields = fields.to_vec();
            async move {
                // Replace the record wholesale so dropped fields don't linger.
                let mut pipeline = redis::pipe();
                pipeline.atomic().del(&key).hset_multiple(&key, &fields);
                pipeline.query_async::<_, ()>(&mut conn).await
            }
        })
        .await
        .map_err(Self::backend)
    }

    async fn json_get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let full = self.prefixed(key);
        with_backoff("json_get", &Backoff::command(), || {
            let mut conn = self.connection.clone();
            let key = full.clone();
            async move {
                cmd("JSON.GET")
                    .arg(&key)
                    .query_async::<_, Option<String>>(&mut conn)
                    .await
            }
        })
        .await
        .map_err(Self::backend)
    }

    async fn json_set(&self, key: &str, json: &str) -> Result<(), StorageError> {
        let full = self.prefixed(key);
        with_backoff("json_set", &Backoff::command(), || {
            let mut conn = self.connection.clone();
            let key = full.clone();
            let doc = json.to_string();
            async move {
                cmd("JSON.SET")
                    .arg(&key)
                    .arg("$")
                    .arg(&doc)
                    .query_async::<_, ()>(&mut conn)
                    .await
            }
        })
        .await
        .map_err(Self::backend)
    }

    async fn ft_create(&self, args: &[String]) -> Result<bool, StorageError> {
        let mut conn = self.connection.clone();
        let mut command = cmd("FT.CREATE");
        for arg in args {
            command.arg(arg);
        }
        match command.query_async::<_, ()>(&mut conn).await {
            Ok(()) => Ok(true),
            Err(e) if e.to_string().contains("Index already exists") => {
                debug!(index = %args.first().map(String::as_str).unwrap_or(""), "Index already exists");
                Ok(false)
            }
            Err(e) => Err(Self::backend(e)),
        }
    }

    async fn ft_drop(&self, index: &str) -> Result<bool, StorageError> {
        let mut conn = self.connection.clone();
        match cmd("FT.DROPINDEX")
            .arg(index)
            .query_async::<_, ()>(&mut conn)
            .await
        {
            Ok(()) => Ok(true),
            Err(e) if is_unknown_index(&e) => {
                debug!(index, "Drop of nonexistent index ignored");
                Ok(false)
            }
            Err(e) => Err(Self::backend(e)),
        }
    }

    async fn ft_exists(&self, index: &str) -> Result<bool, StorageError> {
        let mut conn = self.connection.clone();
        match cmd("FT.INFO")
            .arg(index)
            .query_async::<_, redis::Value>(&mut conn)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if is_unknown_index(&e) => Ok(false),
            Err(e) => Err(Self::backend(e)),
        }
    }

    async fn ft_search(&self, request: &SearchRequest) -> Result<SearchPage, StorageError> {
        let mut conn = self.connection.clone();
        let mut command = cmd("FT.SEARCH");
        command.arg(&request.index).arg(&request.query);
        if request.no_content {
            command.arg("NOCONTENT");
        }
        if let Some(ref sort) = request.sort_by {
            command
                .arg("SORTBY")
                .arg(&sort.field)
                .arg(if sort.descending { "DESC" } else { "ASC" });
        }
        command
            .arg("LIMIT")
            .arg(request.offset)
            .arg(request.limit)
            .arg("DIALECT")
            .arg(2);

        debug!(index = %request.index, query = %request.query, offset = request.offset, limit = request.limit, "FT.SEARCH");
        let raw = command
            .query_async::<_, redis::Value>(&mut conn)
            .await
            .map_err(Self::backend)?;
        self.parse_search_reply(raw, request.no_content)
    }

    async fn scan_page(
        &self,
        pattern: &str,
        kind: Option<KeyKind>,
        cursor: u64,
        count: usize,
    ) -> Result<(u64, Vec<String>), StorageError> {
        let mut conn = self.connection.clone();
        let full_pattern = self.prefixed(pattern);
        let mut command = cmd("SCAN");
        command
            .arg(cursor)
            .arg("MATCH")
            .arg(&full_pattern)
            .arg("COUNT")
            .arg(count);
        if let Some(kind) = kind {
            command.arg("TYPE").arg(kind.type_tag());
        }
        let (next, keys): (u64, Vec<String>) = command
            .query_async(&mut conn)
            .await
            .map_err(Self::backend)?;
        Ok((next, keys.iter().map(|k| self.stripped(k)).collect()))
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), StorageError> {
        let full = self.prefixed(key);
        with_backoff("sadd", &Backoff::command(), || {
            let mut conn = self.connection.clone();
            let key = full.clone();
            let member = member.to_string();
            async move { conn.sadd::<_, _, ()>(&key, &member).await }
        })
        .await
        .map_err(Self::backend)
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StorageError> {
        let full = self.prefixed(key);
        let removed: u64 = with_backoff("srem", &Backoff::command(), || {
            let mut conn = self.connection.clone();
            let key = full.clone();
            let member = member.to_string();
            async move { conn.srem::<_, _, u64>(&key, &member).await }
        })
        .await
        .map_err(Self::backend)?;
        Ok(removed > 0)
    }

    async fn set_members(&self, key: &str) -> Result<HashSet<String>, StorageError> {
        let full = self.prefixed(key);
        with_backoff("smembers", &Backoff::command(), || {
            let mut conn = self.connection.clone();
            let key = full.clone();
            async move { conn.smembers::<_, HashSet<String>>(&key).await }
        })
        .await
        .map_err(Self::backend)
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StorageError> {
        let full = self.prefixed(key);
        with_backoff("sismember", &Backoff::command(), || {
            let mut conn = self.connection.clone();
            let key = full.clone();
            let member = member.to_string();
            async move { conn.sismember::<_, _, bool>(&key, &member).await }
        })
        .await
        .map_err(Self::backend)
    }
}

fn is_unknown_index(e: &redis::RedisError) -> bool {
    let text = e.to_string();
    text.contains("Unknown Index name") || text.contains("Unknown index name") || text.contains("no such index")
}
