//! Batch fan-out across every (application, chain) pair.
//!
//! Each pair runs as its own task so a slow, failing or panicking pair
//! never holds back or aborts the others.

use crate::config::OrchestratorConfig;
use crate::sync_checker::{SyncCheckRequest, SyncChecker};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use synccheck_common::traits::{AppDirectory, RelayClient};
use synccheck_common::types::{Application, Chain, NetworkApp, Node};
use synccheck_common::utils::metrics::SyncCheckMetrics;
use synccheck_common::{Result, SyncCheckError};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

/// One pair scheduled for a check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckTarget {
    pub application: Application,
    pub chain: Chain,
}

/// A completed check
#[derive(Debug, Clone)]
pub struct PairOutcome {
    pub application_id: String,
    pub chain_id: String,
    pub request_id: String,
    pub session_key: String,
    pub total_nodes: usize,
    pub synced: Vec<Node>,
}

/// A pair whose check could not run
#[derive(Debug, Clone)]
pub struct PairFailure {
    pub application_id: String,
    pub chain_id: String,
    pub error: String,
    /// Worth retrying on the next batch
    pub recoverable: bool,
}

/// Result of one batch
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<PairOutcome>,
    pub failures: Vec<PairFailure>,
}

impl BatchReport {
    pub fn checked(&self) -> usize {
        self.outcomes.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn total(&self) -> usize {
        self.checked() + self.failed()
    }
}

/// Pairs to check: every chain the network assigns to a catalog
/// application that is also a chain this gateway serves.
///
/// Applications unknown to the network, or with no staked chains, are
/// skipped. Duplicate chain assignments are checked once.
pub fn plan_targets(
    applications: &[Application],
    chains: &[Chain],
    network_apps: &[NetworkApp],
) -> Vec<CheckTarget> {
    let chain_index: HashMap<&str, &Chain> = chains.iter().map(|c| (c.id.as_str(), c)).collect();
    let network_index: HashMap<&str, &NetworkApp> = network_apps
        .iter()
        .filter(|app| !app.chains.is_empty())
        .map(|app| (app.public_key.as_str(), app))
        .collect();

    let mut targets = Vec::new();
    for application in applications {
        let Some(network_app) = network_index.get(application.public_key.as_str()) else {
            continue;
        };

        let mut seen = HashSet::new();
        for chain_id in &network_app.chains {
            if !seen.insert(chain_id.as_str()) {
                continue;
            }
            if let Some(chain) = chain_index.get(chain_id.as_str()) {
                targets.push(CheckTarget {
                    application: application.clone(),
                    chain: (*chain).clone(),
                });
            }
        }
    }

    targets
}

/// Runs sync checks for every pair of a batch concurrently
pub struct CheckOrchestrator {
    checker: Arc<SyncChecker>,
    relay: Arc<dyn RelayClient>,
    directory: Arc<dyn AppDirectory>,
    config: OrchestratorConfig,
    metrics: Option<Arc<SyncCheckMetrics>>,
}

impl CheckOrchestrator {
    pub fn new(
        checker: Arc<SyncChecker>,
        relay: Arc<dyn RelayClient>,
        directory: Arc<dyn AppDirectory>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            checker,
            relay,
            directory,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<SyncCheckMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Plan against the live network and check every pair.
    /// Fails only when the network's application list cannot be fetched.
    pub async fn run(&self, applications: &[Application], chains: &[Chain]) -> Result<BatchReport> {
        let network_apps = self.directory.apps_in_network().await?;
        let targets = plan_targets(applications, chains, &network_apps);

        info!(
            applications = applications.len(),
            chains = chains.len(),
            network_apps = network_apps.len(),
            pairs = targets.len(),
            "Starting sync check batch"
        );

        Ok(self.run_targets(targets).await)
    }

    /// Check the given pairs concurrently and collect per-pair outcomes
    pub async fn run_targets(&self, targets: Vec<CheckTarget>) -> BatchReport {
        let limiter = self
            .config
            .max_concurrency
            .map(|permits| Arc::new(Semaphore::new(permits.clamp(1, Semaphore::MAX_PERMITS))));

        let mut handles = Vec::with_capacity(targets.len());
        for target in targets {
            let application_id = target.application.id.clone();
            let chain_id = target.chain.id.clone();
            let checker = self.checker.clone();
            let relay = self.relay.clone();
            let limiter = limiter.clone();

            let handle = tokio::spawn(async move {
                let _permit = match limiter {
                    Some(limiter) => limiter.acquire_owned().await.ok(),
                    None => None,
                };
                check_target(checker, relay, target).await
            });

            handles.push((application_id, chain_id, handle));
        }

        let mut report = BatchReport::default();
        for (application_id, chain_id, handle) in handles {
            let (error, recoverable) = match handle.await {
                Ok(Ok(outcome)) => {
                    report.outcomes.push(outcome);
                    continue;
                }
                Ok(Err(e)) => (e.to_string(), e.is_recoverable()),
                Err(join_error) => (format!("check task aborted: {}", join_error), false),
            };

            if recoverable {
                warn!(
                    application_id = %application_id,
                    blockchain_id = %chain_id,
                    "SYNC CHECK PAIR FAILED: {}",
                    error
                );
            } else {
                error!(
                    application_id = %application_id,
                    blockchain_id = %chain_id,
                    "SYNC CHECK PAIR FAILED: {}",
                    error
                );
            }
            if let Some(metrics) = &self.metrics {
                metrics.pair_failures_total.inc();
            }
            report.failures.push(PairFailure {
                application_id,
                chain_id,
                error,
                recoverable,
            });
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_batch(report.failed());
        }
        info!(checked = report.checked(), failed = report.failed(), "Sync check batch complete");
        report
    }
}

async fn check_target(
    checker: Arc<SyncChecker>,
    relay: Arc<dyn RelayClient>,
    target: CheckTarget,
) -> Result<PairOutcome> {
    let CheckTarget { application, chain } = target;
    let request_id = Uuid::new_v4().to_string();

    let session = relay
        .current_session(&application.aat, &chain.id)
        .await
        .map_err(|e| match e {
            SyncCheckError::SessionNotFound { .. } => e,
            other => SyncCheckError::SessionNotFound {
                application: application.id.clone(),
                chain: chain.id.clone(),
                reason: other.to_string(),
            },
        })?;

    if session.nodes.is_empty() {
        warn!(
            application_id = %application.id,
            blockchain_id = %chain.id,
            session_key = %session.key,
            "Session has no nodes"
        );
    }

    let synced = checker
        .check(SyncCheckRequest {
            session: &session,
            chain: &chain,
            application: &application,
            request_id: &request_id,
        })
        .await;

    Ok(PairOutcome {
        application_id: application.id,
        chain_id: chain.id,
        request_id,
        session_key: session.key,
        total_nodes: session.nodes.len(),
        synced,
    })
}
