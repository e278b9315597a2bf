use crate::error::Result;
use crate::types::{GatewayAat, NetworkApp, NodeNetworkData, RelayRequest, RelayResult, Session};
use async_trait::async_trait;
use std::time::Duration;

/// Relay network client: session lookup and relay dispatch
#[async_trait]
pub trait RelayClient: Send + Sync {
    /// Current session for the application on `chain_id`
    async fn current_session(&self, aat: &GatewayAat, chain_id: &str) -> Result<Session>;

    /// Send one relay. Ordinary relay failures come back as `RelayResult::Failure`;
    /// `Err` is reserved for client misuse.
    async fn send_relay(&self, request: RelayRequest<'_>) -> Result<RelayResult>;
}

/// Maps a node public key to where it is served from
#[async_trait]
pub trait NodeLocator: Send + Sync {
    async fn resolve(&self, public_key: &str) -> NodeNetworkData;
}

/// Live network view of which applications are staked for which chains
#[async_trait]
pub trait AppDirectory: Send + Sync {
    async fn apps_in_network(&self) -> Result<Vec<NetworkApp>>;
}

/// One independent key/value cache with per-entry TTL
#[async_trait]
pub trait CacheInstance: Send + Sync {
    fn name(&self) -> &str;
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
}
