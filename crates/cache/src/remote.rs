//! Cache instance backed by a Redis server, shared between replicas.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Cmd, FromRedisValue, RedisError};
use std::time::Duration;
use synccheck_common::traits::CacheInstance;
use synccheck_common::{CacheError, Result, SyncCheckError};
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// One Redis server. The connection is opened on first use and
/// re-established by the connection manager after a drop.
pub struct RedisCache {
    name: String,
    client: redis::Client,
    connection: OnceCell<ConnectionManager>,
    op_timeout: Duration,
}

impl RedisCache {
    /// Parse `url` without connecting. Every command, connecting included,
    /// is bounded by `op_timeout`.
    pub fn open(url: &str, op_timeout: Duration) -> Result<Self> {
        let name = instance_name(url);
        let client = redis::Client::open(url)
            .map_err(|e| SyncCheckError::Config(format!("invalid cache url {}: {}", name, e)))?;

        Ok(Self {
            name,
            client,
            connection: OnceCell::new(),
            op_timeout,
        })
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        let connection = self
            .connection
            .get_or_try_init(|| async {
                let manager = self.client.get_connection_manager().await?;
                info!(instance = %self.name, "Connected to cache instance");
                Ok::<_, RedisError>(manager)
            })
            .await
            .map_err(|e| self.error(e))?;

        Ok(connection.clone())
    }

    async fn query<T: FromRedisValue>(&self, cmd: Cmd) -> Result<T> {
        let attempt = async {
            let mut connection = self.connection().await?;
            cmd.query_async::<_, T>(&mut connection)
                .await
                .map_err(|e| self.error(e))
        };

        match tokio::time::timeout(self.op_timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Unavailable {
                instance: self.name.clone(),
                reason: format!("no reply within {}ms", self.op_timeout.as_millis()),
            }
            .into()),
        }
    }

    fn error(&self, err: RedisError) -> SyncCheckError {
        let instance = self.name.clone();
        let reason = err.to_string();

        if err.is_io_error()
            || err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.is_timeout()
        {
            CacheError::Unavailable { instance, reason }.into()
        } else {
            CacheError::Operation { instance, reason }.into()
        }
    }
}

#[async_trait]
impl CacheInstance for RedisCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.query(cmd).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        debug!(instance = %self.name, key, ttl_secs = ttl.as_secs(), "cache set");

        // PX keeps sub-second TTLs; Redis rejects an expiry of 0
        let ttl_ms = ttl.as_millis().clamp(1, u64::MAX as u128) as u64;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("PX").arg(ttl_ms);
        self.query(cmd).await
    }
}

/// Whether a configured instance names a Redis server
pub fn is_redis_url(instance: &str) -> bool {
    instance.starts_with("redis://")
        || instance.starts_with("rediss://")
        || instance.starts_with("redis+unix://")
        || instance.starts_with("unix://")
}

/// The URL with any `user:password@` part removed, for logs and metrics
fn instance_name(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let authority_start = scheme_end + 3;
    let authority_end = url[authority_start..]
        .find('/')
        .map(|i| authority_start + i)
        .unwrap_or(url.len());

    match url[authority_start..authority_end].rfind('@') {
        Some(at) => format!("{}{}", &url[..authority_start], &url[authority_start + at + 1..]),
        None => url.to_string(),
    }
}
