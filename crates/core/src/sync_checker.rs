//! Session sync checker.
//!
//! Queries every node of a session for its block height, derives the peer
//! consensus height, cross-checks it against the chain's altruist and keeps
//! only the nodes within the chain's allowance. Coordination between
//! concurrent callers (in this process or in other replicas) goes through
//! the cache layer only: an advisory per-session lock written to the
//! instances that do not already hold it, with a TTL so a crashed holder
//! never blocks the session for long.

use crate::altruist::AltruistClient;
use crate::config::SyncCheckConfig;
use crate::payload::{is_json_object, parse_block_height};
use futures::future::join_all;
use std::sync::Arc;
use synccheck_cache::{keys, CacheCoordinator, InstanceRef};
use synccheck_common::traits::{NodeLocator, RelayClient};
use synccheck_common::types::{
    Application, Chain, Node, NodeNetworkData, NodeSyncLog, RelayRequest, RelayResult, Session,
};
use synccheck_common::utils::metrics::{SyncCheckMetrics, Timer};
use tracing::{debug, error, info, instrument, warn};

/// Everything one check needs to know about the pair being audited
#[derive(Debug, Clone, Copy)]
pub struct SyncCheckRequest<'a> {
    pub session: &'a Session,
    pub chain: &'a Chain,
    pub application: &'a Application,
    pub request_id: &'a str,
}

/// A node's height log together with where the node is served from
struct CheckedNode {
    log: NodeSyncLog,
    network: NodeNetworkData,
}

pub struct SyncChecker {
    config: SyncCheckConfig,
    cache: Arc<CacheCoordinator>,
    relay: Arc<dyn RelayClient>,
    altruist: Arc<dyn AltruistClient>,
    locator: Arc<dyn NodeLocator>,
    metrics: Option<Arc<SyncCheckMetrics>>,
}

impl SyncChecker {
    pub fn new(
        config: SyncCheckConfig,
        cache: Arc<CacheCoordinator>,
        relay: Arc<dyn RelayClient>,
        altruist: Arc<dyn AltruistClient>,
        locator: Arc<dyn NodeLocator>,
    ) -> Self {
        Self {
            config,
            cache,
            relay,
            altruist,
            locator,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<SyncCheckMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &SyncCheckConfig {
        &self.config
    }

    /// Filter the session down to the nodes that are in sync.
    ///
    /// Never fails: when no trustworthy height can be established the full
    /// node set is returned unfiltered, and when another caller already holds
    /// the session lock on every cache instance the check is skipped.
    #[instrument(
        name = "sync_check",
        skip_all,
        fields(
            request_id = %req.request_id,
            blockchain_id = %req.chain.id,
            session_key = %req.session.key,
        )
    )]
    pub async fn check(&self, req: SyncCheckRequest<'_>) -> Vec<Node> {
        let nodes = &req.session.nodes;
        let recipe = &req.chain.sync_check;
        let allowance = recipe.effective_allowance(self.config.default_allowance);
        debug!(
            allowance,
            path = ?recipe.path,
            result_key = %recipe.result_key,
            "SYNC CHECK OPTIONS"
        );

        if let Some(metrics) = &self.metrics {
            metrics.checks_total.inc();
        }

        let Some(lock_holders) = self.acquire_lock(&req.session.key).await else {
            info!(
                nodes = nodes.len(),
                "SYNC CHECK SKIPPED: session check already in flight on every cache instance"
            );
            if let Some(metrics) = &self.metrics {
                metrics.checks_skipped_locked_total.inc();
            }
            return nodes.clone();
        };

        let timer = Timer::new(self.metrics.clone());
        let logs = self.node_sync_logs(req).await;

        let mut error_state = false;

        let quorum = self.config.quorum_for(nodes.len());
        if logs.len() < quorum {
            error!(
                valid = logs.len(),
                required = quorum,
                "SYNC CHECK ERROR: fewer than {} nodes returned sync",
                quorum
            );
            error_state = true;
        }

        let current_height = match logs.first() {
            Some(top) if top.log.block_height > 0 => top.log.block_height,
            _ => {
                error!(
                    logs = ?heights(&logs),
                    "SYNC CHECK ERROR: top synced node result is invalid"
                );
                error_state = true;
                0
            }
        };

        // The two best peers must agree so a single node cannot drag the baseline up
        if logs.len() >= 2
            && logs[0].log.block_height > logs[1].log.block_height.saturating_add(allowance)
        {
            error!(
                top = logs[0].log.block_height,
                second = logs[1].log.block_height,
                "SYNC CHECK ERROR: two highest nodes could not agree on sync"
            );
            error_state = true;
        }

        if error_state {
            if let Some(metrics) = &self.metrics {
                metrics.quorum_failures_total.inc();
            }
        }

        let altruist_height = self
            .altruist
            .block_height(recipe, &req.chain.altruist_url)
            .await;

        if altruist_height == 0 {
            info!(service_node = "ALTRUIST", "SYNC CHECK ALTRUIST FAILURE: {}", altruist_height);
            if let Some(metrics) = &self.metrics {
                metrics.altruist_failures_total.inc();
            }

            if error_state {
                warn!(
                    nodes = nodes.len(),
                    "SYNC CHECK FALLBACK: no trustworthy height, returning all nodes"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.fallback_unfiltered_total.inc();
                }
                timer.finish();
                return nodes.clone();
            }
        } else {
            info!(service_node = "ALTRUIST", "SYNC CHECK ALTRUIST CHECK: {}", altruist_height);
        }

        let mut synced_nodes = Vec::with_capacity(logs.len());
        for CheckedNode { log, network } in &logs {
            let allowed_height = log.block_height.saturating_add(allowance);

            if allowed_height >= current_height && allowed_height >= altruist_height {
                info!(
                    service_node = %log.node.public_key,
                    service_url = %network.service_url,
                    service_domain = %network.service_domain,
                    "SYNC CHECK IN-SYNC: {} height: {}",
                    log.node.public_key,
                    log.block_height
                );
                synced_nodes.push(log.node.clone());
            } else {
                info!(
                    service_node = %log.node.public_key,
                    service_url = %network.service_url,
                    service_domain = %network.service_domain,
                    "SYNC CHECK BEHIND: {} height: {}",
                    log.node.public_key,
                    log.block_height
                );
            }
        }

        info!("SYNC CHECK COMPLETE: {} nodes in sync", synced_nodes.len());

        if synced_nodes.len() < nodes.len() {
            self.send_consensus_challenge(req).await;
        }

        self.publish(req, &lock_holders, &synced_nodes).await;

        if let Some(metrics) = &self.metrics {
            metrics.record_classification(synced_nodes.len(), nodes.len() - synced_nodes.len());
        }
        timer.finish();

        synced_nodes
    }

    /// Nodes from the last published result for this session, if any instance still holds one
    pub async fn cached_synced_nodes(&self, session: &Session) -> Option<Vec<Node>> {
        let present = self.cache.get_all_present(&keys::result_key(&session.key)).await;

        for (instance, raw) in present {
            match serde_json::from_str::<Vec<String>>(&raw) {
                Ok(public_keys) => {
                    let nodes = session
                        .nodes
                        .iter()
                        .filter(|node| public_keys.contains(&node.public_key))
                        .cloned()
                        .collect();
                    return Some(nodes);
                }
                Err(e) => {
                    warn!(
                        instance = instance.name(),
                        session_key = %session.key,
                        "Unreadable cached sync result: {}",
                        e
                    );
                }
            }
        }

        None
    }

    /// Lock the session on every instance not already holding the lock.
    /// Returns the instances we locked, or `None` when all were taken.
    async fn acquire_lock(&self, session_key: &str) -> Option<Vec<InstanceRef>> {
        let lock_key = keys::lock_key(session_key);
        let locked = self.cache.get_all_present(&lock_key).await;
        let free = self.cache.absent_from(&locked);

        if free.is_empty() {
            return None;
        }

        let written = self
            .cache
            .set_on(&free, &lock_key, "true", self.config.lock_ttl())
            .await;
        debug!(locked = locked.len(), acquired = written, "Session lock");

        Some(free)
    }

    /// Heights of every node, invalid results removed, best first.
    /// Ties keep session order.
    async fn node_sync_logs(&self, req: SyncCheckRequest<'_>) -> Vec<CheckedNode> {
        let checks = req
            .session
            .nodes
            .iter()
            .map(|node| self.node_sync_log(req, node));

        let mut logs: Vec<CheckedNode> = join_all(checks).await;

        let before = logs.len();
        logs.retain(|checked| !checked.log.is_sentinel());
        if let Some(metrics) = &self.metrics {
            metrics.node_failures_total.inc_by((before - logs.len()) as f64);
        }

        logs.sort_by(|a, b| b.log.block_height.cmp(&a.log.block_height));
        logs
    }

    /// Ask one node for its height. Every failure maps to a sentinel log.
    /// The node lookup shares the relay's deadline.
    async fn node_sync_log(&self, req: SyncCheckRequest<'_>, node: &Node) -> CheckedNode {
        let recipe = &req.chain.sync_check;
        let timeouts = self.config.node_check_timeouts();
        let relay = self.relay.send_relay(RelayRequest {
            body: &recipe.body,
            chain_id: &req.chain.id,
            aat: &req.application.aat,
            timeouts,
            path: recipe.path.as_deref(),
            node: Some(node),
            consensus: false,
        });

        let deadline = tokio::time::Instant::now() + timeouts.request_timeout;
        let (outcome, network) = futures::join!(
            tokio::time::timeout_at(deadline, relay),
            tokio::time::timeout_at(deadline, self.locator.resolve(&node.public_key)),
        );
        let network = network.unwrap_or_default();

        let log = match outcome {
            Ok(Ok(RelayResult::Success(payload))) if is_json_object(&payload) => {
                let log = NodeSyncLog {
                    node: node.clone(),
                    chain_id: req.chain.id.clone(),
                    block_height: parse_block_height(&payload, &recipe.result_key),
                };
                info!(
                    service_node = %node.public_key,
                    service_url = %network.service_url,
                    service_domain = %network.service_domain,
                    "SYNC CHECK RESULT: {}",
                    serde_json::to_string(&log).unwrap_or_default()
                );
                log
            }
            Ok(Ok(RelayResult::Success(payload))) => {
                error!(
                    service_node = %node.public_key,
                    service_url = %network.service_url,
                    service_domain = %network.service_domain,
                    "SYNC CHECK ERROR UNHANDLED: {}",
                    payload
                );
                NodeSyncLog::sentinel(node.clone(), req.chain.id.as_str())
            }
            Ok(Ok(RelayResult::Failure(reason))) => {
                error!(
                    service_node = %node.public_key,
                    service_url = %network.service_url,
                    service_domain = %network.service_domain,
                    "SYNC CHECK ERROR: {}",
                    reason
                );
                NodeSyncLog::sentinel(node.clone(), req.chain.id.as_str())
            }
            Ok(Err(e)) => {
                error!(
                    service_node = %node.public_key,
                    service_url = %network.service_url,
                    service_domain = %network.service_domain,
                    "SYNC CHECK ERROR: relay client rejected request: {}",
                    e
                );
                NodeSyncLog::sentinel(node.clone(), req.chain.id.as_str())
            }
            Err(_) => {
                error!(
                    service_node = %node.public_key,
                    service_url = %network.service_url,
                    service_domain = %network.service_domain,
                    timeout_ms = timeouts.request_timeout.as_millis() as u64,
                    "SYNC CHECK ERROR: relay timed out"
                );
                NodeSyncLog::sentinel(node.clone(), req.chain.id.as_str())
            }
        };

        CheckedNode { log, network }
    }

    /// Broadcast the check in consensus mode so the relay network's dispute
    /// mechanism can attribute the lagging nodes. The response is only logged.
    async fn send_consensus_challenge(&self, req: SyncCheckRequest<'_>) {
        let recipe = &req.chain.sync_check;
        let timeouts = self.config.consensus_timeouts();
        let relay = self.relay.send_relay(RelayRequest {
            body: &recipe.body,
            chain_id: &req.chain.id,
            aat: &req.application.aat,
            timeouts,
            path: recipe.path.as_deref(),
            node: None,
            consensus: true,
        });

        if let Some(metrics) = &self.metrics {
            metrics.consensus_relays_total.inc();
        }

        match tokio::time::timeout(timeouts.request_timeout, relay).await {
            Ok(Ok(response)) => info!("SYNC CHECK CHALLENGE: {:?}", response),
            Ok(Err(e)) => warn!("SYNC CHECK CHALLENGE: relay client rejected request: {}", e),
            Err(_) => warn!("SYNC CHECK CHALLENGE: relay timed out"),
        }
    }

    /// Clear failure flags of in-sync nodes and publish the result on the
    /// instances this check locked. Write failures are swallowed.
    async fn publish(
        &self,
        req: SyncCheckRequest<'_>,
        holders: &[InstanceRef],
        synced_nodes: &[Node],
    ) {
        let failure_ttl = self.config.failure_ttl();
        let failure_keys: Vec<String> = synced_nodes
            .iter()
            .map(|node| keys::failure_key(&req.chain.id, &node.public_key))
            .collect();
        let clear_flags = failure_keys
            .iter()
            .map(|key| self.cache.set_on(holders, key, "false", failure_ttl));

        let public_keys: Vec<&str> = synced_nodes
            .iter()
            .map(|node| node.public_key.as_str())
            .collect();
        let result = match serde_json::to_string(&public_keys) {
            Ok(result) => result,
            Err(e) => {
                error!("Failed to encode sync result: {}", e);
                return;
            }
        };
        let result_key = keys::result_key(&req.session.key);
        let result_ttl = self.config.result_ttl(synced_nodes.len());

        let (_, written) = futures::join!(
            join_all(clear_flags),
            self.cache.set_on(holders, &result_key, &result, result_ttl)
        );
        debug!(written, ttl_secs = result_ttl.as_secs(), "Published sync result");
    }
}

fn heights(logs: &[CheckedNode]) -> Vec<u64> {
    logs.iter().map(|checked| checked.log.block_height).collect()
}
