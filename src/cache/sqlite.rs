//! SQLite-backed cache store
//!
//! One table keyed by cache key, with an absolute expiry in unix seconds.
//! Survives restarts; expired rows are ignored on read and removed by
//! `purge_expired`.

use crate::cache::CacheStore;
use crate::error::{InsightError, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::info;

pub struct SqliteCache {
    db: Mutex<Connection>,
}

impl SqliteCache {
    /// Open (or create) the cache database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let db = Connection::open(path)
            .map_err(|e| InsightError::Cache(format!("Failed to open cache database: {}", e)))?;
        let cache = Self { db: Mutex::new(db) };
        cache.init_schema()?;

        info!("Query cache opened at {}", path.display());
        Ok(cache)
    }

    /// Cache that lives only as long as this value
    pub fn in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()
            .map_err(|e| InsightError::Cache(format!("Failed to open cache database: {}", e)))?;
        let cache = Self { db: Mutex::new(db) };
        cache.init_schema()?;
        Ok(cache)
    }

    fn init_schema(&self) -> Result<()> {
        let db = self.lock()?;
        db.execute(
            r#"
            CREATE TABLE IF NOT EXISTS query_cache (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                expires_at INTEGER NOT NULL
            )
            "#,
            [],
        )
        .map_err(|e| InsightError::Cache(format!("Failed to create cache table: {}", e)))?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| InsightError::Cache("Cache connection lock poisoned".to_string()))
    }
}

#[async_trait]
impl CacheStore for SqliteCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let db = self.lock()?;
        db.query_row(
            "SELECT value FROM query_cache WHERE key = ?1 AND expires_at > ?2",
            params![key, Utc::now().timestamp()],
            |row| row.get::<_, Vec<u8>>(0),
        )
        .optional()
        .map_err(|e| InsightError::Cache(format!("Failed to read cache entry: {}", e)))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let expires_at = Utc::now().timestamp() + ttl.as_secs() as i64;
        let db = self.lock()?;
        db.execute(
            "INSERT OR REPLACE INTO query_cache (key, value, expires_at) VALUES (?1, ?2, ?3)",
            params![key, value, expires_at],
        )
        .map_err(|e| InsightError::Cache(format!("Failed to write cache entry: {}", e)))?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let db = self.lock()?;
        db.execute(
            "DELETE FROM query_cache WHERE expires_at <= ?1",
            params![Utc::now().timestamp()],
        )
        .map_err(|e| InsightError::Cache(format!("Failed to purge cache: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip_and_replace() {
        let cache = SqliteCache::in_memory().unwrap();
        cache.set("k", b"first", Duration::from_secs(60)).await.unwrap();
        cache.set("k", b"second", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"second".to_vec()));
    }

    #[tokio::test]
    async fn test_expired_entries_are_misses() {
        let cache = SqliteCache::in_memory().unwrap();
        cache.set("k", b"stale", Duration::ZERO).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert_eq!(cache.purge_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let path = std::env::temp_dir().join(format!("insights-cache-{}.db", uuid::Uuid::new_v4()));
        {
            let cache = SqliteCache::open(&path).unwrap();
            cache.set("k", b"kept", Duration::from_secs(60)).await.unwrap();
        }
        let cache = SqliteCache::open(&path).unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"kept".to_vec()));
        let _ = std::fs::remove_file(&path);
    }
}
