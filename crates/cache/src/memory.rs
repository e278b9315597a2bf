//! In-process cache instance backed by moka, with a TTL per entry.

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use std::time::{Duration, Instant};
use synccheck_common::traits::CacheInstance;
use synccheck_common::Result;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    ttl: Duration,
}

/// Expires every entry after the TTL it was written with
struct PerEntryTtl;

impl Expiry<String, CacheEntry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// A single independent cache instance living in this process
pub struct MemoryCache {
    name: String,
    entries: Cache<String, CacheEntry>,
}

impl MemoryCache {
    pub fn new(name: impl Into<String>, capacity: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(capacity)
            .expire_after(PerEntryTtl)
            .build();

        Self {
            name: name.into(),
            entries,
        }
    }

    /// Drop a key ahead of its TTL
    pub async fn invalidate(&self, key: &str) {
        self.entries.invalidate(key).await;
    }
}

#[async_trait]
impl CacheInstance for MemoryCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).await.map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        debug!(instance = %self.name, key, ttl_secs = ttl.as_secs(), "cache set");
        self.entries
            .insert(
                key.to_string(),
                CacheEntry {
                    value: value.to_string(),
                    ttl,
                },
            )
            .await;
        Ok(())
    }
}
