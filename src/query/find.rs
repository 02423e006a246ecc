// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Find query cursor.
//!
//! A [`FindQuery`] owns the pagination state for one search: expression
//! list, offset/limit, page size, sort directives, and the lazily
//! computed query string (memoized here, in the cursor - resolution
//! itself is a pure function). Execution issues paginated `FT.SEARCH`
//! requests and materializes hits into typed model instances:
//! hash-encoded hits from their flattened field pairs, document-encoded
//! hits from the `$` payload document.
//!
//! Builder methods consume and return the cursor; deriving a variant
//! (`first()` forcing `limit = 1`) clones with the changed state rather
//! than mutating, so a cursor's resolved query stays valid for its
//! lifetime.

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Instant;

use serde_json::Value;
use tracing::debug;

use crate::metrics;
use crate::model::{codec, Model, StorageKind};
use crate::storage::{HitPayload, OmStore, SearchHit, SearchRequest, SortBy};

use super::expr::Expression;
use super::resolve::resolve;
use super::QueryError;

/// A sort directive: field name, optionally prefixed with `-` for
/// descending order.
fn parse_sort_field(raw: &str) -> (&str, bool) {
    match raw.strip_prefix('-') {
        Some(name) => (name, true),
        None => (raw, false),
    }
}

pub struct FindQuery<M: Model> {
    store: Arc<dyn OmStore>,
    expressions: Vec<Expression>,
    offset: u64,
    /// Maximum rows to materialize; `None` exhausts all matches.
    limit: Option<u64>,
    page_size: u64,
    sort_fields: Vec<String>,
    query_cache: OnceLock<Result<String, QueryError>>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> std::fmt::Debug for FindQuery<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FindQuery")
            .field("expressions", &self.expressions)
            .field("offset", &self.offset)
            .field("limit", &self.limit)
            .field("page_size", &self.page_size)
            .field("sort_fields", &self.sort_fields)
            .finish_non_exhaustive()
    }
}

impl<M: Model> Clone for FindQuery<M> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            expressions: self.expressions.clone(),
            offset: self.offset,
            limit: self.limit,
            page_size: self.page_size,
            sort_fields: self.sort_fields.clone(),
            query_cache: self.query_cache.clone(),
            _model: PhantomData,
        }
    }
}

impl<M: Model> FindQuery<M> {
    pub fn new(store: Arc<dyn OmStore>) -> Self {
        Self {
            store,
            expressions: Vec::new(),
            offset: 0,
            limit: None,
            page_size: 1000,
            sort_fields: Vec::new(),
            query_cache: OnceLock::new(),
            _model: PhantomData,
        }
    }

    /// Add a filter expression. Multiple expressions reduce with implicit
    /// AND, left to right.
    #[must_use]
    pub fn filter(mut self, expression: Expression) -> Self {
        self.expressions.push(expression);
        self.query_cache = OnceLock::new();
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Sort by the given fields (`-` prefix for descending). Every field
    /// must exist on the model and be marked sortable. The engine applies
    /// a single sort key per request; the first field is primary and the
    /// rest are kept for cursor copies that re-sort.
    pub fn sort_by(mut self, fields: &[&str]) -> Result<Self, QueryError> {
        let descriptor = M::descriptor();
        for raw in fields {
            let (name, _) = parse_sort_field(raw);
            let field = descriptor.field(name)?;
            if !field.sortable {
                return Err(QueryError::NotSortable {
                    field: name.to_string(),
                });
            }
        }
        self.sort_fields = fields.iter().map(|f| (*f).to_string()).collect();
        Ok(self)
    }

    /// The resolved query string, computed once per cursor instance.
    pub fn query_string(&self) -> Result<String, QueryError> {
        self.query_cache
            .get_or_init(|| resolve(&Expression::and_all(self.expressions.iter().cloned())))
            .clone()
    }

    fn request(&self, offset: u64, limit: u64, no_content: bool) -> Result<SearchRequest, QueryError> {
        let descriptor = M::descriptor();
        let query = self.query_string()?;
        // An all-empty-clause query (degraded tag values) still matches
        // everything, same as no filter at all.
        let query = if query.is_empty() { "*".to_string() } else { query };
        let sort_by = self.sort_fields.first().map(|raw| {
            let (name, descending) = parse_sort_field(raw);
            SortBy {
                field: name.to_string(),
                descending,
            }
        });
        Ok(SearchRequest {
            index: format!("{}{}", self.store.key_prefix(), descriptor.index_name()),
            query,
            offset,
            limit,
            sort_by,
            no_content,
        })
    }

    fn decode_hit(hit: &SearchHit) -> Result<M, QueryError> {
        let descriptor = M::descriptor();
        let value = match &hit.payload {
            HitPayload::Fields(pairs) => {
                let map = pairs.iter().cloned().collect();
                codec::from_hash_fields(&descriptor, &map)?
            }
            HitPayload::Json(doc) => codec::from_document(doc)?,
            HitPayload::None => {
                return Err(QueryError::Storage(crate::storage::StorageError::Decode(
                    "hit carried no content".into(),
                )))
            }
        };
        serde_json::from_value(value).map_err(|e| {
            QueryError::Storage(crate::storage::StorageError::Decode(format!(
                "cannot materialize {}: {e}",
                descriptor.name()
            )))
        })
    }

    /// Collect raw hits from `offset`, stepping by `page_size` until the
    /// limit is reached or a page comes back short.
    async fn collect_hits(&self, no_content: bool) -> Result<Vec<SearchHit>, QueryError> {
        let mut hits: Vec<SearchHit> = Vec::new();
        let mut offset = self.offset;
        loop {
            let page_limit = match self.limit {
                Some(limit) => limit.saturating_sub(hits.len() as u64).min(self.page_size),
                None => self.page_size,
            };
            if page_limit == 0 {
                break;
            }
            let request = self.request(offset, page_limit, no_content)?;
            let page = self.store.ft_search(&request).await?;
            let returned = page.hits.len() as u64;
            hits.extend(page.hits);
            if returned < page_limit || hits.len() as u64 >= page.total {
                break;
            }
            offset += returned;
        }
        Ok(hits)
    }

    /// Execute and materialize every matching record (up to the limit).
    pub async fn all(&self) -> Result<Vec<M>, QueryError> {
        let start = Instant::now();
        let hits = self.collect_hits(false).await?;
        let results = hits
            .iter()
            .map(Self::decode_hit)
            .collect::<Result<Vec<_>, _>>()?;
        metrics::record_query(M::descriptor().name(), "all");
        metrics::record_query_latency(start.elapsed());
        debug!(model = %M::descriptor().name(), count = results.len(), "Query executed");
        Ok(results)
    }

    /// First matching record; `NotFound` when nothing matches - distinct
    /// from the empty collection `all()` returns.
    pub async fn first(&self) -> Result<M, QueryError> {
        let limited = self.clone().limit(1);
        let mut results = limited.all().await?;
        if results.is_empty() {
            return Err(QueryError::NotFound);
        }
        Ok(results.remove(0))
    }

    /// Total number of matches, via a no-content request with limit 0.
    pub async fn count(&self) -> Result<u64, QueryError> {
        let request = self.request(0, 0, true)?;
        let page = self.store.ft_search(&request).await?;
        metrics::record_query(M::descriptor().name(), "count");
        Ok(page.total)
    }

    /// Load every matching record, apply the field changes (dotted names
    /// traverse embedded models), and re-save. Field names are validated
    /// against the model before anything is written. Returns the number
    /// of records updated.
    pub async fn update(&self, changes: &[(&str, Value)]) -> Result<u64, QueryError> {
        let descriptor = M::descriptor();
        for (path, _) in changes {
            codec::validate_field_path(&descriptor, path)?;
        }

        let hits = self.collect_hits(false).await?;
        let mut updated = 0u64;
        for hit in &hits {
            let mut value = match &hit.payload {
                HitPayload::Fields(pairs) => {
                    let map = pairs.iter().cloned().collect();
                    codec::from_hash_fields(&descriptor, &map)?
                }
                HitPayload::Json(doc) => codec::from_document(doc)?,
                HitPayload::None => continue,
            };
            for (path, new_value) in changes {
                codec::set_field_path(&mut value, path, new_value.clone());
            }
            match descriptor.storage() {
                StorageKind::Hash => {
                    let fields = codec::to_hash_fields(&descriptor, &value)?;
                    self.store.hash_set(&hit.key, &fields).await?;
                }
                StorageKind::Json => {
                    let doc = codec::to_document(&value)?;
                    self.store.json_set(&hit.key, &doc).await?;
                }
            }
            updated += 1;
        }
        metrics::record_query(descriptor.name(), "update");
        debug!(model = %descriptor.name(), updated, "Matching records updated");
        Ok(updated)
    }

    /// Delete every matching record's key. A "nothing to delete" response
    /// counts as zero, not an error.
    pub async fn delete(&self) -> Result<u64, QueryError> {
        let hits = self.collect_hits(true).await?;
        let keys: Vec<String> = hits.into_iter().map(|hit| hit.key).collect();
        if keys.is_empty() {
            return Ok(0);
        }
        let deleted = self.store.del(&keys).await?;
        metrics::record_query(M::descriptor().name(), "delete");
        debug!(model = %M::descriptor().name(), deleted, "Matching records deleted");
        Ok(deleted)
    }
}
