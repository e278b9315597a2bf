//! Test doubles shared by the core integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use synccheck_cache::{CacheCoordinator, MemoryCache};
use synccheck_common::traits::{AppDirectory, CacheInstance, NodeLocator, RelayClient};
use synccheck_common::types::{
    Application, Chain, CheckRecipe, GatewayAat, NetworkApp, Node, NodeNetworkData, RelayRequest,
    RelayResult, Session,
};
use synccheck_common::utils::logging::init_test_logging;
use synccheck_common::{CacheError, NetworkError, Result, SyncCheckError};
use synccheck_core::{AltruistClient, SyncCheckConfig, SyncChecker};

/// How a scripted node answers its height relay
#[derive(Debug, Clone, Copy)]
pub enum Reply {
    Height(u64),
    Failure,
    Garbage,
    Hang,
}

/// Relay client answering from a per-node script
#[derive(Default)]
pub struct ScriptedRelay {
    replies: HashMap<String, Reply>,
    sessions: HashMap<String, Session>,
    panic_on_chain: Option<String>,
    delay: Duration,
    node_calls: AtomicUsize,
    consensus_calls: AtomicUsize,
}

impl ScriptedRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session for `chain_id` with one node per reply, keyed `node-<i>`
    pub fn with_session(mut self, chain_id: &str, session_key: &str, replies: &[Reply]) -> Self {
        let nodes: Vec<Node> = (0..replies.len())
            .map(|i| Node::new(format!("{}-node-{}", chain_id, i)))
            .collect();
        for (node, reply) in nodes.iter().zip(replies) {
            self.replies.insert(node.public_key.clone(), *reply);
        }
        self.sessions
            .insert(chain_id.to_string(), Session::new(session_key, nodes));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn panicking_on(mut self, chain_id: &str) -> Self {
        self.panic_on_chain = Some(chain_id.to_string());
        self
    }

    pub fn session(&self, chain_id: &str) -> Session {
        self.sessions[chain_id].clone()
    }

    pub fn node_calls(&self) -> usize {
        self.node_calls.load(Ordering::SeqCst)
    }

    pub fn consensus_calls(&self) -> usize {
        self.consensus_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RelayClient for ScriptedRelay {
    async fn current_session(&self, _aat: &GatewayAat, chain_id: &str) -> Result<Session> {
        if self.panic_on_chain.as_deref() == Some(chain_id) {
            panic!("relay client crashed for {}", chain_id);
        }
        self.sessions.get(chain_id).cloned().ok_or_else(|| {
            NetworkError::InvalidResponse(format!("no dispatch for {}", chain_id)).into()
        })
    }

    async fn send_relay(&self, request: RelayRequest<'_>) -> Result<RelayResult> {
        if request.consensus {
            self.consensus_calls.fetch_add(1, Ordering::SeqCst);
            return Ok(RelayResult::Success(r#"{"result":"0x1"}"#.to_string()));
        }

        self.node_calls.fetch_add(1, Ordering::SeqCst);
        let node = request.node.ok_or_else(|| {
            SyncCheckError::Internal("single-node relay without a node".to_string())
        })?;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match self.replies.get(&node.public_key).copied().unwrap_or(Reply::Failure) {
            Reply::Height(height) => Ok(RelayResult::Success(format!(
                r#"{{"jsonrpc":"2.0","id":1,"result":"0x{:x}"}}"#,
                height
            ))),
            Reply::Failure => Ok(RelayResult::Failure("node unreachable".to_string())),
            Reply::Garbage => {
                Ok(RelayResult::Success("<html>502 Bad Gateway</html>".to_string()))
            }
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(RelayResult::Failure("hung".to_string()))
            }
        }
    }
}

#[async_trait]
impl AppDirectory for ScriptedRelay {
    async fn apps_in_network(&self) -> Result<Vec<NetworkApp>> {
        Ok(Vec::new())
    }
}

/// Network view returned verbatim
pub struct StaticDirectory(pub Vec<NetworkApp>);

#[async_trait]
impl AppDirectory for StaticDirectory {
    async fn apps_in_network(&self) -> Result<Vec<NetworkApp>> {
        Ok(self.0.clone())
    }
}

/// Altruist reporting a fixed height
pub struct FixedAltruist {
    height: u64,
    calls: AtomicUsize,
}

impl FixedAltruist {
    pub fn new(height: u64) -> Self {
        Self {
            height,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AltruistClient for FixedAltruist {
    async fn block_height(&self, _recipe: &CheckRecipe, _altruist_url: &str) -> u64 {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.height
    }
}

pub struct NullLocator;

#[async_trait]
impl NodeLocator for NullLocator {
    async fn resolve(&self, _public_key: &str) -> NodeNetworkData {
        NodeNetworkData::default()
    }
}

/// Locator whose lookups never answer
#[derive(Default)]
pub struct HangingLocator {
    calls: AtomicUsize,
}

impl HangingLocator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NodeLocator for HangingLocator {
    async fn resolve(&self, _public_key: &str) -> NodeNetworkData {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(3600)).await;
        NodeNetworkData::default()
    }
}

/// Memory cache that also records the TTL of every write
pub struct RecordingCache {
    inner: MemoryCache,
    writes: Mutex<Vec<(String, String, Duration)>>,
}

impl RecordingCache {
    pub fn new(name: &str) -> Self {
        Self {
            inner: MemoryCache::new(name, 1_000),
            writes: Mutex::new(Vec::new()),
        }
    }

    pub async fn invalidate(&self, key: &str) {
        self.inner.invalidate(key).await;
    }

    /// Last (value, ttl) written under `key`
    pub fn last_write(&self, key: &str) -> Option<(String, Duration)> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(k, _, _)| k == key)
            .map(|(_, v, ttl)| (v.clone(), *ttl))
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }
}

#[async_trait]
impl CacheInstance for RecordingCache {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.writes
            .lock()
            .unwrap()
            .push((key.to_string(), value.to_string(), ttl));
        self.inner.set(key, value, ttl).await
    }
}

/// Instance that refuses every operation
pub struct DownCache;

#[async_trait]
impl CacheInstance for DownCache {
    fn name(&self) -> &str {
        "down"
    }

    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(CacheError::Unavailable {
            instance: "down".to_string(),
            reason: "connection refused".to_string(),
        }
        .into())
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
        Err(CacheError::Unavailable {
            instance: "down".to_string(),
            reason: "connection refused".to_string(),
        }
        .into())
    }
}

pub fn application(id: &str) -> Application {
    Application {
        id: id.to_string(),
        name: id.to_string(),
        public_key: format!("{}-pk", id),
        aat: GatewayAat {
            version: "0.0.1".to_string(),
            client_public_key: "client-pk".to_string(),
            application_public_key: format!("{}-pk", id),
            application_signature: "signature".to_string(),
        },
    }
}

pub fn chain(id: &str, allowance: Option<u64>) -> Chain {
    Chain {
        id: id.to_string(),
        name: format!("chain {}", id),
        ticker: None,
        altruist_url: "http://altruist.invalid".to_string(),
        sync_check: CheckRecipe {
            body: r#"{"method":"eth_blockNumber","id":1,"jsonrpc":"2.0"}"#.to_string(),
            path: None,
            result_key: "result".to_string(),
            allowance,
        },
    }
}

pub fn coordinator(instances: Vec<Arc<dyn CacheInstance>>) -> Arc<CacheCoordinator> {
    Arc::new(CacheCoordinator::new(instances))
}

pub fn checker(
    config: SyncCheckConfig,
    cache: Arc<CacheCoordinator>,
    relay: Arc<ScriptedRelay>,
    altruist: Arc<FixedAltruist>,
) -> SyncChecker {
    checker_with_locator(config, cache, relay, altruist, Arc::new(NullLocator))
}

pub fn checker_with_locator(
    config: SyncCheckConfig,
    cache: Arc<CacheCoordinator>,
    relay: Arc<ScriptedRelay>,
    altruist: Arc<FixedAltruist>,
    locator: Arc<dyn NodeLocator>,
) -> SyncChecker {
    init_test_logging();
    SyncChecker::new(config, cache, relay, altruist, locator)
}

pub fn public_keys(nodes: &[Node]) -> Vec<String> {
    nodes.iter().map(|n| n.public_key.clone()).collect()
}
