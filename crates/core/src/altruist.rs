//! Altruist (trusted reference node) height lookups.

use crate::payload::block_height_from_value;
use async_trait::async_trait;
use reqwest::Url;
use std::time::Duration;
use synccheck_common::types::{CheckRecipe, SENTINEL_HEIGHT};
use tracing::{debug, error};

/// Independent source of a chain's current height
#[async_trait]
pub trait AltruistClient: Send + Sync {
    /// Height reported by the altruist at `altruist_url`, or 0 on any failure
    async fn block_height(&self, recipe: &CheckRecipe, altruist_url: &str) -> u64;
}

/// Altruist lookups over plain HTTP
pub struct HttpAltruist {
    client: reqwest::Client,
}

impl HttpAltruist {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AltruistClient for HttpAltruist {
    async fn block_height(&self, recipe: &CheckRecipe, altruist_url: &str) -> u64 {
        let redacted = redact_url(altruist_url);
        let service_node = format!("fallback:{}", redacted);
        let url = format!("{}{}", altruist_url, recipe.path.as_deref().unwrap_or(""));

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(recipe.body.clone())
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                error!(
                    relay_type = "FALLBACK",
                    service_node = %service_node,
                    "Altruist request failed: {}",
                    e
                );
                return SENTINEL_HEIGHT;
            }
        };

        if !response.status().is_success() {
            error!(
                relay_type = "FALLBACK",
                service_node = %service_node,
                status = %response.status(),
                "Altruist returned error status"
            );
            return SENTINEL_HEIGHT;
        }

        match response.json::<serde_json::Value>().await {
            Ok(payload) => {
                let height = block_height_from_value(&payload, &recipe.result_key);
                debug!(altruist = %redacted, height, "Altruist height");
                height
            }
            Err(e) => {
                error!(
                    relay_type = "FALLBACK",
                    service_node = %service_node,
                    "Altruist payload is not JSON: {}",
                    e
                );
                SENTINEL_HEIGHT
            }
        }
    }
}

/// Strip `user:pass@` credentials from a URL before it is logged
pub fn redact_url(raw: &str) -> String {
    if let Ok(mut url) = Url::parse(raw) {
        if url.username().is_empty() && url.password().is_none() {
            return raw.to_string();
        }
        if url.set_username("").is_ok() && url.set_password(None).is_ok() {
            return url.to_string();
        }
    }

    // Unparseable: drop everything between the scheme separator and the last '@' of the authority
    let Some(scheme_end) = raw.find("://") else {
        return raw.to_string();
    };
    let authority_start = scheme_end + 3;
    let authority_end = raw[authority_start..]
        .find('/')
        .map(|i| authority_start + i)
        .unwrap_or(raw.len());

    match raw[authority_start..authority_end].rfind('@') {
        Some(at) => format!("{}{}", &raw[..authority_start], &raw[authority_start + at + 1..]),
        None => raw.to_string(),
    }
}
