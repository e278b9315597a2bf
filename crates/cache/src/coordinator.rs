//! Fan-out over independent cache instances.
//!
//! Individual instance failures are logged and swallowed. Callers build an
//! advisory "lock where not already locked" protocol on top of
//! [`CacheCoordinator::get_all_present`] and [`CacheCoordinator::set_on`].

use futures::future::join_all;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use synccheck_common::traits::CacheInstance;
use tracing::{debug, warn};

/// Handle to one configured instance, stable for the coordinator's lifetime
#[derive(Clone)]
pub struct InstanceRef {
    index: usize,
    instance: Arc<dyn CacheInstance>,
}

impl InstanceRef {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        self.instance.name()
    }
}

impl fmt::Debug for InstanceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceRef")
            .field("index", &self.index)
            .field("name", &self.name())
            .finish()
    }
}

impl PartialEq for InstanceRef {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

/// Wraps one or more independent cache instances
pub struct CacheCoordinator {
    instances: Vec<InstanceRef>,
}

impl CacheCoordinator {
    pub fn new(instances: Vec<Arc<dyn CacheInstance>>) -> Self {
        let instances = instances
            .into_iter()
            .enumerate()
            .map(|(index, instance)| InstanceRef { index, instance })
            .collect();

        Self { instances }
    }

    pub fn instances(&self) -> &[InstanceRef] {
        &self.instances
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Write `value` to every instance. Returns the number of instances that accepted it.
    pub async fn set_all(&self, key: &str, value: &str, ttl: Duration) -> usize {
        self.set_on(&self.instances, key, value, ttl).await
    }

    /// Write `value` to the given instances only; each write is independent.
    pub async fn set_on(
        &self,
        targets: &[InstanceRef],
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> usize {
        let writes = targets.iter().map(|target| async move {
            match target.instance.set(key, value, ttl).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(instance = target.name(), key, "Cache write failed: {}", e);
                    false
                }
            }
        });

        let written = join_all(writes).await.into_iter().filter(|ok| *ok).count();
        debug!(key, written, targets = targets.len(), "Cache fan-out write");
        written
    }

    /// Query every instance, keeping only those that answered with a value.
    pub async fn get_all_present(&self, key: &str) -> Vec<(InstanceRef, String)> {
        let reads = self.instances.iter().map(|target| async move {
            match target.instance.get(key).await {
                Ok(Some(value)) => Some((target.clone(), value)),
                Ok(None) => None,
                Err(e) => {
                    warn!(instance = target.name(), key, "Cache read failed: {}", e);
                    None
                }
            }
        });

        join_all(reads).await.into_iter().flatten().collect()
    }

    /// Instances that did not report a value for the key in `present`
    pub fn absent_from(&self, present: &[(InstanceRef, String)]) -> Vec<InstanceRef> {
        self.instances
            .iter()
            .filter(|candidate| !present.iter().any(|(held, _)| held == *candidate))
            .cloned()
            .collect()
    }
}
