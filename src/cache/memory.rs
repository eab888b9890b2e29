use crate::cache::CacheStore;
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Process-local cache. Expired entries are dropped on read and swept on every write.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, (Vec<u8>, Instant)>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn sweep(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, (_, expires_at)| *expires_at > now);
        before.saturating_sub(self.entries.len())
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Instant::now();
        self.entries.remove_if(key, |_, (_, expires_at)| *expires_at <= now);
        Ok(self.entries.get(key).map(|entry| entry.value().0.clone()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let now = Instant::now();
        self.sweep(now);
        self.entries.insert(key.to_string(), (value.to_vec(), now + ttl));
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize> {
        Ok(self.sweep(Instant::now()))
    }
}
