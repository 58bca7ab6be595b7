//! Record finders
//!
//! [`SimpleSqlFinder`] runs every lookup against the executor.
//! [`CachedSqlFinder`] keeps non-empty results in a [`CacheAdapter`] keyed by a
//! SHA-256 digest of the compiled query.

use super::error::Result;
use super::executor::QueryExecutor;
use super::functions::{build_query, equals_criteria, fetch_all, fetch_one, select_query};
use super::query_builder::{CompiledQuery, Criteria, OrderBy};
use super::result_set::ResultSet;
use super::value::{Row, SqlValue};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Lookups against a single table
#[async_trait]
pub trait SqlFinder: Send + Sync {
    /// Row whose `id` column equals `id`
    async fn find_one_by_id(&self, id: SqlValue) -> Result<Option<Row>>;

    /// Single row matching all criteria
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::OneResultExpected`](super::StorageError::OneResultExpected)
    /// when several rows match.
    async fn find_one_by(&self, criteria: &[Criteria]) -> Result<Option<Row>>;

    /// Rows matching all criteria
    async fn find(
        &self,
        criteria: &[Criteria],
        offset: Option<usize>,
        limit: Option<usize>,
        order_by: &[OrderBy],
    ) -> Result<Vec<Row>>;
}

fn compile_find(
    table: &str,
    criteria: &[Criteria],
    offset: Option<usize>,
    limit: Option<usize>,
    order_by: &[OrderBy],
) -> CompiledQuery {
    let mut select = select_query(table);
    if let Some(offset) = offset {
        select = select.offset(offset);
    }
    if let Some(limit) = limit {
        select = select.limit(limit);
    }
    build_query(select, criteria, order_by)
}

/// Finder without caching
pub struct SimpleSqlFinder {
    table: String,
    executor: Arc<dyn QueryExecutor>,
}

impl SimpleSqlFinder {
    pub fn new(table: impl Into<String>, executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            table: table.into(),
            executor,
        }
    }
}

#[async_trait]
impl SqlFinder for SimpleSqlFinder {
    async fn find_one_by_id(&self, id: SqlValue) -> Result<Option<Row>> {
        self.find_one_by(&[equals_criteria("id", id)]).await
    }

    async fn find_one_by(&self, criteria: &[Criteria]) -> Result<Option<Row>> {
        let query = compile_find(&self.table, criteria, None, None, &[]);
        let result = self.executor.execute(&query.sql, &query.parameters).await?;
        fetch_one(result).await
    }

    async fn find(
        &self,
        criteria: &[Criteria],
        offset: Option<usize>,
        limit: Option<usize>,
        order_by: &[OrderBy],
    ) -> Result<Vec<Row>> {
        let query = compile_find(&self.table, criteria, offset, limit, order_by);
        let result = self.executor.execute(&query.sql, &query.parameters).await?;
        fetch_all(result).await
    }
}

/// Asynchronous key/value store used by [`CachedSqlFinder`]
#[async_trait]
pub trait CacheAdapter: Send + Sync {
    async fn has(&self, key: &str) -> Result<bool>;

    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;

    async fn save(&self, key: &str, value: serde_json::Value) -> Result<()>;
}

/// Process-local cache without expiry
#[derive(Debug, Default)]
pub struct InMemoryCacheAdapter {
    entries: RwLock<HashMap<String, serde_json::Value>>,
}

impl InMemoryCacheAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl CacheAdapter for InMemoryCacheAdapter {
    async fn has(&self, key: &str) -> Result<bool> {
        Ok(self.entries.read().contains_key(key))
    }

    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn save(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }
}

#[derive(Serialize)]
struct QueryShape<'a> {
    table: &'a str,
    sql: &'a str,
    parameters: &'a [SqlValue],
}

/// Finder answering repeated lookups from a cache
pub struct CachedSqlFinder {
    table: String,
    executor: Arc<dyn QueryExecutor>,
    cache: Arc<dyn CacheAdapter>,
}

impl CachedSqlFinder {
    /// Finder backed by an [`InMemoryCacheAdapter`]
    pub fn new(table: impl Into<String>, executor: Arc<dyn QueryExecutor>) -> Self {
        Self::with_cache(table, executor, Arc::new(InMemoryCacheAdapter::new()))
    }

    pub fn with_cache(
        table: impl Into<String>,
        executor: Arc<dyn QueryExecutor>,
        cache: Arc<dyn CacheAdapter>,
    ) -> Self {
        Self {
            table: table.into(),
            executor,
            cache,
        }
    }

    /// Cache key for a compiled query on this finder's table
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the parameters cannot be encoded.
    pub fn cache_key(&self, query: &CompiledQuery) -> Result<String> {
        let shape = serde_json::to_vec(&QueryShape {
            table: &self.table,
            sql: &query.sql,
            parameters: &query.parameters,
        })?;
        Ok(hex::encode(Sha256::digest(&shape)))
    }

    async fn execute_on_miss(&self, key: &str, query: &CompiledQuery) -> Result<Option<ResultSet>> {
        if self.cache.has(key).await? {
            debug!(table = %self.table, key, "finder cache hit");
            return Ok(None);
        }
        let result = self.executor.execute(&query.sql, &query.parameters).await?;
        Ok(Some(result))
    }

    async fn cached_value<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.cache.get(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SqlFinder for CachedSqlFinder {
    async fn find_one_by_id(&self, id: SqlValue) -> Result<Option<Row>> {
        self.find_one_by(&[equals_criteria("id", id)]).await
    }

    async fn find_one_by(&self, criteria: &[Criteria]) -> Result<Option<Row>> {
        let query = compile_find(&self.table, criteria, None, None, &[]);
        let key = self.cache_key(&query)?;

        if let Some(result) = self.execute_on_miss(&key, &query).await? {
            if let Some(row) = fetch_one(result).await? {
                self.cache.save(&key, serde_json::to_value(&row)?).await?;
            }
        }

        self.cached_value(&key).await
    }

    async fn find(
        &self,
        criteria: &[Criteria],
        offset: Option<usize>,
        limit: Option<usize>,
        order_by: &[OrderBy],
    ) -> Result<Vec<Row>> {
        let query = compile_find(&self.table, criteria, offset, limit, order_by);
        let key = self.cache_key(&query)?;

        if let Some(result) = self.execute_on_miss(&key, &query).await? {
            let rows = fetch_all(result).await?;
            if !rows.is_empty() {
                self.cache.save(&key, serde_json::to_value(&rows)?).await?;
            }
        }

        Ok(self.cached_value(&key).await?.unwrap_or_default())
    }
}
