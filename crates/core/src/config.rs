use serde::{Deserialize, Serialize};
use std::time::Duration;
use synccheck_common::types::RelayTimeouts;

/// Sync checker tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncCheckConfig {
    /// Allowance used when a chain's recipe carries none (or zero)
    #[serde(default = "default_allowance")]
    pub default_allowance: u64,

    /// Hard timeout for each per-node and consensus relay
    #[serde(default = "default_relay_timeout_ms")]
    pub relay_timeout_ms: u64,

    /// Nodes consulted by a consensus challenge relay
    #[serde(default = "default_consensus_node_count")]
    pub consensus_node_count: u32,

    #[serde(default)]
    pub accept_disputed_responses: bool,

    /// Timeout for the altruist HTTP call
    #[serde(default = "default_altruist_timeout_ms")]
    pub altruist_timeout_ms: u64,

    /// Valid logs required before peers count as a quorum
    #[serde(default = "default_min_quorum")]
    pub min_quorum: usize,

    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,

    #[serde(default = "default_result_ttl_secs")]
    pub result_ttl_secs: u64,

    #[serde(default = "default_empty_result_ttl_secs")]
    pub empty_result_ttl_secs: u64,

    #[serde(default = "default_failure_ttl_secs")]
    pub failure_ttl_secs: u64,
}

fn default_allowance() -> u64 { 5 }
fn default_relay_timeout_ms() -> u64 { 12_000 }
fn default_consensus_node_count() -> u32 { 5 }
fn default_altruist_timeout_ms() -> u64 { 12_000 }
fn default_min_quorum() -> usize { 3 }
fn default_lock_ttl_secs() -> u64 { 60 }
fn default_result_ttl_secs() -> u64 { 300 }
fn default_empty_result_ttl_secs() -> u64 { 30 }
fn default_failure_ttl_secs() -> u64 { 60 * 60 * 24 * 30 }

impl Default for SyncCheckConfig {
    fn default() -> Self {
        Self {
            default_allowance: default_allowance(),
            relay_timeout_ms: default_relay_timeout_ms(),
            consensus_node_count: default_consensus_node_count(),
            accept_disputed_responses: false,
            altruist_timeout_ms: default_altruist_timeout_ms(),
            min_quorum: default_min_quorum(),
            lock_ttl_secs: default_lock_ttl_secs(),
            result_ttl_secs: default_result_ttl_secs(),
            empty_result_ttl_secs: default_empty_result_ttl_secs(),
            failure_ttl_secs: default_failure_ttl_secs(),
        }
    }
}

impl SyncCheckConfig {
    pub fn relay_timeout(&self) -> Duration {
        Duration::from_millis(self.relay_timeout_ms)
    }

    pub fn altruist_timeout(&self) -> Duration {
        Duration::from_millis(self.altruist_timeout_ms)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    /// TTL of the published result; short when nothing was in sync so the session is retried soon
    pub fn result_ttl(&self, in_sync: usize) -> Duration {
        if in_sync > 0 {
            Duration::from_secs(self.result_ttl_secs)
        } else {
            Duration::from_secs(self.empty_result_ttl_secs)
        }
    }

    pub fn failure_ttl(&self) -> Duration {
        Duration::from_secs(self.failure_ttl_secs)
    }

    /// Settings for the single-node height relays
    pub fn node_check_timeouts(&self) -> RelayTimeouts {
        RelayTimeouts {
            request_timeout: self.relay_timeout(),
            consensus_node_count: self.consensus_node_count,
            accept_disputed_responses: self.accept_disputed_responses,
        }
    }

    /// Settings for the consensus challenge relay; disputes are never accepted there
    pub fn consensus_timeouts(&self) -> RelayTimeouts {
        RelayTimeouts {
            request_timeout: self.relay_timeout(),
            consensus_node_count: self.consensus_node_count,
            accept_disputed_responses: false,
        }
    }

    /// Valid logs needed for a quorum in a session of `node_count` nodes
    pub fn quorum_for(&self, node_count: usize) -> usize {
        self.min_quorum.min(node_count)
    }
}

/// Batch fan-out settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum pairs checked at once; unbounded when absent
    #[serde(default)]
    pub max_concurrency: Option<usize>,

    /// Delay between batches when running as a daemon
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_interval_secs() -> u64 { 60 }

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            interval_secs: default_interval_secs(),
        }
    }
}

impl OrchestratorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}
