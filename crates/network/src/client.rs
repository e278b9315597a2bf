//! Relay network client over HTTP.
//!
//! Sessions and the staked application list come from the dispatcher.
//! Relays go through a relayer sidecar which holds the gateway's client key
//! and does the signing; this client only describes the relay to send.

use crate::config::NetworkConfig;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use synccheck_common::traits::{AppDirectory, RelayClient};
use synccheck_common::types::{GatewayAat, NetworkApp, Node, RelayRequest, RelayResult, Session};
use synccheck_common::{NetworkError, Result, SyncCheckError};
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct DispatchRequest<'a> {
    app_public_key: &'a str,
    chain: &'a str,
    session_height: u64,
}

#[derive(Debug, Deserialize)]
struct DispatchResponse {
    session: DispatchSession,
}

#[derive(Debug, Deserialize)]
struct DispatchSession {
    key: String,
    #[serde(default)]
    nodes: Vec<Node>,
}

#[derive(Debug, Serialize)]
struct RelayEnvelope<'a> {
    chain_id: &'a str,
    data: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<&'a str>,
    method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    node_public_key: Option<&'a str>,
    consensus: bool,
    aat: &'a GatewayAat,
    timeout_ms: u64,
    consensus_node_count: u32,
    accept_disputed_responses: bool,
}

#[derive(Debug, Deserialize)]
struct RelayReply {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct AppsQuery {
    height: u64,
    opts: PageOpts,
}

#[derive(Debug, Serialize)]
struct PageOpts {
    page: u32,
    per_page: u32,
}

#[derive(Debug, Deserialize)]
struct AppsPage {
    #[serde(default)]
    result: Vec<NetworkApp>,
    #[serde(default)]
    total_pages: u32,
}

pub struct PocketClient {
    client: reqwest::Client,
    dispatcher_url: String,
    relayer_url: String,
    apps_page_size: u32,
}

impl PocketClient {
    pub fn new(config: &NetworkConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| NetworkError::Protocol(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            dispatcher_url: config.dispatcher_url.trim_end_matches('/').to_string(),
            relayer_url: config.relayer_url.trim_end_matches('/').to_string(),
            apps_page_size: config.apps_page_size.max(1),
        })
    }

    async fn dispatch(
        &self,
        aat: &GatewayAat,
        chain_id: &str,
    ) -> std::result::Result<Session, String> {
        let response = self
            .client
            .post(format!("{}/v1/client/dispatch", self.dispatcher_url))
            .json(&DispatchRequest {
                app_public_key: &aat.application_public_key,
                chain: chain_id,
                session_height: 0,
            })
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("dispatcher returned {}: {}", status, body));
        }

        let dispatch: DispatchResponse = response.json().await.map_err(|e| e.to_string())?;
        Ok(Session::new(dispatch.session.key, dispatch.session.nodes))
    }

    async fn apps_page(&self, page: u32) -> Result<AppsPage> {
        let response = self
            .client
            .post(format!("{}/v1/query/apps", self.dispatcher_url))
            .json(&AppsQuery {
                height: 0,
                opts: PageOpts {
                    page,
                    per_page: self.apps_page_size,
                },
            })
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(
                NetworkError::InvalidResponse(format!("apps query returned {}", status)).into(),
            );
        }

        response
            .json()
            .await
            .map_err(|e| NetworkError::InvalidResponse(format!("apps page {}: {}", page, e)).into())
    }
}

#[async_trait]
impl RelayClient for PocketClient {
    async fn current_session(&self, aat: &GatewayAat, chain_id: &str) -> Result<Session> {
        let session = self
            .dispatch(aat, chain_id)
            .await
            .map_err(|reason| SyncCheckError::SessionNotFound {
                application: aat.application_public_key.clone(),
                chain: chain_id.to_string(),
                reason,
            })?;

        debug!(
            blockchain_id = chain_id,
            session_key = %session.key,
            nodes = session.nodes.len(),
            "Dispatched session"
        );
        Ok(session)
    }

    async fn send_relay(&self, request: RelayRequest<'_>) -> Result<RelayResult> {
        if !request.consensus && request.node.is_none() {
            return Err(SyncCheckError::Internal(
                "single-node relay requires a target node".to_string(),
            ));
        }

        let envelope = RelayEnvelope {
            chain_id: request.chain_id,
            data: request.body,
            path: request.path,
            method: "POST",
            node_public_key: request.node.map(|node| node.public_key.as_str()),
            consensus: request.consensus,
            aat: request.aat,
            timeout_ms: request.timeouts.request_timeout.as_millis() as u64,
            consensus_node_count: request.timeouts.consensus_node_count,
            accept_disputed_responses: request.timeouts.accept_disputed_responses,
        };

        let response = self
            .client
            .post(format!("{}/v1/client/relay", self.relayer_url))
            .timeout(request.timeouts.request_timeout)
            .json(&envelope)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => return Ok(RelayResult::Failure(e.to_string())),
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return Ok(RelayResult::Failure(e.to_string())),
        };

        Ok(relay_result(status, &body))
    }
}

#[async_trait]
impl AppDirectory for PocketClient {
    async fn apps_in_network(&self) -> Result<Vec<NetworkApp>> {
        let mut apps = Vec::new();
        let mut page = 1;

        loop {
            let batch = self.apps_page(page).await?;
            apps.extend(batch.result);

            if page >= batch.total_pages {
                break;
            }
            page += 1;
        }

        debug!(apps = apps.len(), pages = page, "Fetched network applications");
        Ok(apps)
    }
}

/// Interpret a relayer reply
fn relay_result(status: StatusCode, body: &str) -> RelayResult {
    if !status.is_success() {
        return RelayResult::Failure(format!("relayer returned {}: {}", status, body));
    }

    match serde_json::from_str::<RelayReply>(body) {
        Ok(RelayReply { error: Some(error), .. }) if !error.is_null() => {
            RelayResult::Failure(match error {
                serde_json::Value::String(message) => message,
                other => other.to_string(),
            })
        }
        Ok(RelayReply { response: Some(payload), .. }) => RelayResult::Success(payload),
        Ok(_) => RelayResult::Failure("relayer reply carried no response".to_string()),
        Err(e) => {
            warn!("Unreadable relayer reply: {}", e);
            RelayResult::Failure(format!("unreadable relayer reply: {}", e))
        }
    }
}

fn request_error(e: reqwest::Error) -> SyncCheckError {
    if e.is_timeout() {
        NetworkError::Timeout(e.to_string()).into()
    } else {
        NetworkError::ConnectionFailed(e.to_string()).into()
    }
}
