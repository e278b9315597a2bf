use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NetworkConfig {
    /// Dispatcher serving sessions and network queries
    pub dispatcher_url: String,
    /// Relayer sidecar that signs and forwards relays
    pub relayer_url: String,
    /// Altruist answering node queries on the relay network's own chain
    pub altruist_url: String,

    /// Timeout for dispatch and query calls; relays carry their own
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_apps_page_size")]
    pub apps_page_size: u32,

    #[serde(default = "default_node_cache_ttl_secs")]
    pub node_cache_ttl_secs: u64,

    #[serde(default = "default_node_cache_capacity")]
    pub node_cache_capacity: u64,
}

fn default_request_timeout_ms() -> u64 { 10_000 }
fn default_apps_page_size() -> u32 { 100 }
fn default_node_cache_ttl_secs() -> u64 { 60 * 60 * 6 }
fn default_node_cache_capacity() -> u64 { 10_000 }

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            dispatcher_url: "http://127.0.0.1:8081".to_string(),
            relayer_url: "http://127.0.0.1:8082".to_string(),
            altruist_url: "http://127.0.0.1:8081".to_string(),
            request_timeout_ms: default_request_timeout_ms(),
            apps_page_size: default_apps_page_size(),
            node_cache_ttl_secs: default_node_cache_ttl_secs(),
            node_cache_capacity: default_node_cache_capacity(),
        }
    }
}

impl NetworkConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn node_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.node_cache_ttl_secs)
    }
}
