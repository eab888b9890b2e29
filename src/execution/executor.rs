//! Query executor - row limit, result cache and driver dispatch
//!
//! Results are cached under a key derived from the target and the
//! normalized query text. The cache is best effort: read, write and decode
//! failures are logged and the query runs against the database.

use crate::cache::{query_cache_key, CacheStore, DEFAULT_TTL};
use crate::error::Result;
use crate::execution::engine::{ConnectionTarget, QueryEngine};
use crate::execution::result::ExecutionResult;
use crate::sql_guard::has_limit_keyword;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct QueryExecutor {
    engine: Arc<dyn QueryEngine>,
    cache: Arc<dyn CacheStore>,
    cache_ttl: Duration,
}

impl QueryExecutor {
    pub fn new(engine: Arc<dyn QueryEngine>, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            engine,
            cache,
            cache_ttl: DEFAULT_TTL,
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Run `sql` against `target`, bounded by `limit` when it carries no LIMIT.
    ///
    /// A cache hit returns without touching the database.
    pub async fn execute(
        &self,
        sql: &str,
        target: &str,
        limit: u64,
        timeout: Duration,
    ) -> Result<ExecutionResult> {
        let key = query_cache_key(target, sql);
        if let Some(hit) = self.cached(&key).await {
            debug!("Cache hit for {}", key);
            return Ok(hit);
        }

        let connection = ConnectionTarget::parse(target)?;
        let bounded = apply_limit(sql, limit);
        info!("Executing query on {} (limit {})", connection, limit);

        let result = self.engine.fetch_rows(&connection, &bounded, timeout).await?;
        self.store(&key, &result).await;
        Ok(result)
    }

    async fn cached(&self, key: &str) -> Option<ExecutionResult> {
        match self.cache.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!("Ignoring undecodable cache entry {}: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Cache read failed, querying database: {}", e);
                None
            }
        }
    }

    async fn store(&self, key: &str, result: &ExecutionResult) {
        let bytes = match serde_json::to_vec(result) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to encode result for cache: {}", e);
                return;
            }
        };
        if let Err(e) = self.cache.set(key, &bytes, self.cache_ttl).await {
            warn!("Cache write failed: {}", e);
        }
    }
}

/// Strip trailing semicolons and append `LIMIT limit` unless a LIMIT clause is present
pub fn apply_limit(sql: &str, limit: u64) -> String {
    let trimmed = sql.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace());
    if has_limit_keyword(trimmed) {
        trimmed.to_string()
    } else {
        format!("{} LIMIT {}", trimmed, limit)
    }
}
