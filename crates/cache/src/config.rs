use crate::coordinator::CacheCoordinator;
use crate::memory::MemoryCache;
use crate::remote::{is_redis_url, RedisCache};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use synccheck_common::traits::CacheInstance;
use synccheck_common::Result;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// One entry per independent instance. `redis://` URLs connect to a
    /// shared server; any other entry names an in-process instance private
    /// to this replica.
    #[serde(default = "default_instances")]
    pub instances: Vec<String>,

    /// Maximum entries held per in-process instance
    #[serde(default = "default_capacity")]
    pub capacity: u64,

    /// Bound on a single command against a remote instance
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_instances() -> Vec<String> { vec!["primary".to_string()] }
fn default_capacity() -> u64 { 100_000 }
fn default_timeout_ms() -> u64 { 1_000 }

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            instances: default_instances(),
            capacity: default_capacity(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl CacheConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl CacheCoordinator {
    /// One instance per configured entry. Remote instances connect lazily,
    /// so a server that is down at startup only counts as unavailable.
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        let mut instances: Vec<Arc<dyn CacheInstance>> = Vec::with_capacity(config.instances.len());
        let mut remote = 0;

        for entry in &config.instances {
            if is_redis_url(entry) {
                let cache = RedisCache::open(entry, config.timeout())?;
                info!(instance = cache.name(), "Using Redis cache instance");
                instances.push(Arc::new(cache));
                remote += 1;
            } else {
                info!(instance = %entry, "Using in-process cache instance");
                instances.push(Arc::new(MemoryCache::new(entry.as_str(), config.capacity)));
            }
        }

        if remote == 0 && !instances.is_empty() {
            warn!("No shared cache instance configured; replicas will not coordinate");
        }

        Ok(Self::new(instances))
    }
}
