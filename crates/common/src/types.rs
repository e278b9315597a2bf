use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Sentinel block height recorded for a failed or invalid node check
pub const SENTINEL_HEIGHT: u64 = 0;

// --- Nodes & sessions ---

/// A service node assigned to a session, identified by its public key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    pub public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
}

impl Node {
    pub fn new(public_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            service_url: None,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.public_key)
    }
}

/// The node set serving one application on one chain, plus its fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub key: String,
    pub nodes: Vec<Node>,
}

impl Session {
    pub fn new(key: impl Into<String>, nodes: Vec<Node>) -> Self {
        Self {
            key: key.into(),
            nodes,
        }
    }
}

// --- Check recipe & logs ---

/// Per-chain description of how to ask a node for its block height
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRecipe {
    /// Relay payload sent verbatim
    pub body: String,

    /// Optional relay path (REST-style chains)
    #[serde(default)]
    pub path: Option<String>,

    /// Top-level JSON field holding the block height
    pub result_key: String,

    /// Tolerated lag in blocks; zero or absent falls back to the service default
    #[serde(default)]
    pub allowance: Option<u64>,
}

impl CheckRecipe {
    /// Effective allowance for this recipe
    pub fn effective_allowance(&self, default_allowance: u64) -> u64 {
        match self.allowance {
            Some(allowance) if allowance > 0 => allowance,
            _ => default_allowance,
        }
    }
}

/// Observed height of one node in one check cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSyncLog {
    pub node: Node,
    pub chain_id: String,
    pub block_height: u64,
}

impl NodeSyncLog {
    pub fn sentinel(node: Node, chain_id: impl Into<String>) -> Self {
        Self {
            node,
            chain_id: chain_id.into(),
            block_height: SENTINEL_HEIGHT,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.block_height == SENTINEL_HEIGHT
    }
}

// --- Catalog records ---

/// Application auth token presented with every relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayAat {
    pub version: String,
    pub client_public_key: String,
    pub application_public_key: String,
    pub application_signature: String,
}

/// An onboarded application as loaded from the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub public_key: String,
    pub aat: GatewayAat,
}

/// A chain as loaded from the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ticker: Option<String>,

    /// Trusted reference node used as the altruist for this chain
    pub altruist_url: String,

    pub sync_check: CheckRecipe,
}

/// The live network's view of one application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkApp {
    pub public_key: String,
    #[serde(default)]
    pub chains: Vec<String>,
}

// --- Relays ---

/// Outcome of a relay that did not fail at the client level
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayResult {
    Success(String),
    Failure(String),
}

/// Timeout and dispute settings attached to a relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayTimeouts {
    pub request_timeout: Duration,
    pub consensus_node_count: u32,
    pub accept_disputed_responses: bool,
}

/// One relay call, either to a single node or to the session in consensus mode
#[derive(Debug, Clone)]
pub struct RelayRequest<'a> {
    pub body: &'a str,
    pub chain_id: &'a str,
    pub aat: &'a GatewayAat,
    pub timeouts: RelayTimeouts,
    pub path: Option<&'a str>,
    pub node: Option<&'a Node>,
    pub consensus: bool,
}

/// Where a node can be reached, for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeNetworkData {
    pub service_url: String,
    pub service_domain: String,
}
