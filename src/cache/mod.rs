//! Query result cache
//!
//! A byte-oriented key/value store with per-key expiry. Values are opaque to
//! the store; the executor decides how they are encoded.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryCache;
pub use sqlite::SqliteCache;

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

/// Default lifetime of a cached result
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Value stored under `key`, unless absent or expired
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key` for `ttl`, replacing any previous value
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Drop expired entries, returning how many were removed
    async fn purge_expired(&self) -> Result<usize>;
}

/// Lower-case and collapse whitespace so formatting differences share a key
pub fn normalize_query(sql: &str) -> String {
    sql.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Cache key for `sql` run against `target`
pub fn query_cache_key(target: &str, sql: &str) -> String {
    let material = format!("{}\n{}", target, normalize_query(sql));
    let digest = Uuid::new_v5(&Uuid::NAMESPACE_OID, material.as_bytes());
    format!("sql_cache:{}", digest.simple())
}
