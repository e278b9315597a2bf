//! Node public key to service URL lookups, for log enrichment.
//!
//! Answers are cached for hours; any failure resolves to empty data and is
//! not cached, so the next check tries again.

use crate::config::NetworkConfig;
use async_trait::async_trait;
use moka::future::Cache;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::net::IpAddr;
use synccheck_common::traits::NodeLocator;
use synccheck_common::types::NodeNetworkData;
use synccheck_common::{NetworkError, Result};
use tracing::warn;

#[derive(Debug, Serialize)]
struct NodeQuery<'a> {
    address: &'a str,
}

#[derive(Debug, Deserialize)]
struct NodeQueryResponse {
    service_url: String,
}

pub struct CachedNodeLocator {
    client: reqwest::Client,
    altruist_url: String,
    cache: Cache<String, NodeNetworkData>,
}

impl CachedNodeLocator {
    pub fn new(config: &NetworkConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| NetworkError::Protocol(format!("failed to build HTTP client: {}", e)))?;

        let cache = Cache::builder()
            .max_capacity(config.node_cache_capacity)
            .time_to_live(config.node_cache_ttl())
            .build();

        Ok(Self {
            client,
            altruist_url: config.altruist_url.trim_end_matches('/').to_string(),
            cache,
        })
    }

    async fn query(&self, address: &str) -> std::result::Result<NodeNetworkData, String> {
        let response = self
            .client
            .post(format!("{}/v1/query/node", self.altruist_url))
            .json(&NodeQuery { address })
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("node query returned {}", response.status()));
        }

        let node: NodeQueryResponse = response.json().await.map_err(|e| e.to_string())?;
        Ok(NodeNetworkData {
            service_domain: extract_domain(&node.service_url),
            service_url: node.service_url,
        })
    }
}

#[async_trait]
impl NodeLocator for CachedNodeLocator {
    async fn resolve(&self, public_key: &str) -> NodeNetworkData {
        if public_key.is_empty() {
            return NodeNetworkData::default();
        }

        if let Some(cached) = self.cache.get(public_key).await {
            return cached;
        }

        let Some(address) = node_address(public_key) else {
            warn!(service_node = public_key, "Node public key is not valid hex");
            return NodeNetworkData::default();
        };

        match self.query(&address).await {
            Ok(data) => {
                self.cache.insert(public_key.to_string(), data.clone()).await;
                data
            }
            Err(e) => {
                warn!(service_node = public_key, "Failure getting node network data: {}", e);
                NodeNetworkData::default()
            }
        }
    }
}

/// Network address of a node: first 20 bytes of the SHA-256 of its public key
pub fn node_address(public_key: &str) -> Option<String> {
    let bytes = hex::decode(public_key).ok()?;
    let digest = Sha256::digest(&bytes);
    Some(hex::encode(&digest[..20]))
}

/// Registrable domain of a service URL; IP hosts are returned as-is
pub fn extract_domain(service_url: &str) -> String {
    let Some(host) = Url::parse(service_url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
    else {
        return String::new();
    };

    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if bare.parse::<IpAddr>().is_ok() {
        return host;
    }

    let labels: Vec<&str> = host.split('.').filter(|label| !label.is_empty()).collect();
    if labels.len() <= 2 {
        return labels.join(".");
    }
    labels[labels.len() - 2..].join(".")
}
