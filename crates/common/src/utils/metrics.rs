use prometheus::{
    Counter, Gauge, Histogram, Registry, TextEncoder, Encoder,
    opts, histogram_opts
};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use std::sync::Arc;
use tracing::{debug, info};

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether the metrics endpoint is served
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Metrics bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// `/health` reports stale once the last batch is older than this
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

fn default_enabled() -> bool { true }
fn default_bind_address() -> String { "0.0.0.0:9090".to_string() }
fn default_stale_after_secs() -> u64 { 600 }

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            bind_address: default_bind_address(),
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

/// Counters and timings for sync check cycles
#[derive(Debug)]
pub struct SyncCheckMetrics {
    registry: Registry,

    // Check cycle metrics
    pub checks_total: Counter,
    pub checks_skipped_locked_total: Counter,
    pub check_duration: Histogram,
    pub fallback_unfiltered_total: Counter,

    // Node classification metrics
    pub nodes_in_sync_total: Counter,
    pub nodes_behind_total: Counter,
    pub node_failures_total: Counter,

    // Cross-check metrics
    pub quorum_failures_total: Counter,
    pub altruist_failures_total: Counter,
    pub consensus_relays_total: Counter,

    // Orchestrator metrics
    pub pair_failures_total: Counter,
    pub last_batch_timestamp: Gauge,
    pub last_batch_failed_pairs: Gauge,
}

impl SyncCheckMetrics {
    /// Create new metrics instance
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let checks_total = Counter::with_opts(opts!(
            "synccheck_checks_total",
            "Total number of session sync checks started"
        ))?;

        let checks_skipped_locked_total = Counter::with_opts(opts!(
            "synccheck_checks_skipped_locked_total",
            "Checks skipped because every cache instance already held the session lock"
        ))?;

        let check_duration = Histogram::with_opts(histogram_opts!(
            "synccheck_check_duration_seconds",
            "Time spent running a session sync check"
        ))?;

        let fallback_unfiltered_total = Counter::with_opts(opts!(
            "synccheck_fallback_unfiltered_total",
            "Checks that returned the unfiltered node set after quorum and altruist both failed"
        ))?;

        let nodes_in_sync_total = Counter::with_opts(opts!(
            "synccheck_nodes_in_sync_total",
            "Nodes classified as in sync"
        ))?;

        let nodes_behind_total = Counter::with_opts(opts!(
            "synccheck_nodes_behind_total",
            "Nodes classified as behind"
        ))?;

        let node_failures_total = Counter::with_opts(opts!(
            "synccheck_node_failures_total",
            "Per-node checks that failed or returned invalid data"
        ))?;

        let quorum_failures_total = Counter::with_opts(opts!(
            "synccheck_quorum_failures_total",
            "Checks where peers could not establish a consensus height"
        ))?;

        let altruist_failures_total = Counter::with_opts(opts!(
            "synccheck_altruist_failures_total",
            "Altruist queries that failed or returned invalid data"
        ))?;

        let consensus_relays_total = Counter::with_opts(opts!(
            "synccheck_consensus_relays_total",
            "Consensus challenge relays sent for sessions with lagging nodes"
        ))?;

        let pair_failures_total = Counter::with_opts(opts!(
            "synccheck_pair_failures_total",
            "Application/chain pairs whose check aborted"
        ))?;

        let last_batch_timestamp = Gauge::with_opts(opts!(
            "synccheck_last_batch_timestamp_seconds",
            "Unix time at which the last batch completed"
        ))?;

        let last_batch_failed_pairs = Gauge::with_opts(opts!(
            "synccheck_last_batch_failed_pairs",
            "Pairs that failed in the last completed batch"
        ))?;

        registry.register(Box::new(checks_total.clone()))?;
        registry.register(Box::new(checks_skipped_locked_total.clone()))?;
        registry.register(Box::new(check_duration.clone()))?;
        registry.register(Box::new(fallback_unfiltered_total.clone()))?;
        registry.register(Box::new(nodes_in_sync_total.clone()))?;
        registry.register(Box::new(nodes_behind_total.clone()))?;
        registry.register(Box::new(node_failures_total.clone()))?;
        registry.register(Box::new(quorum_failures_total.clone()))?;
        registry.register(Box::new(altruist_failures_total.clone()))?;
        registry.register(Box::new(consensus_relays_total.clone()))?;
        registry.register(Box::new(pair_failures_total.clone()))?;
        registry.register(Box::new(last_batch_timestamp.clone()))?;
        registry.register(Box::new(last_batch_failed_pairs.clone()))?;

        info!("Metrics system initialized");
        Ok(Self {
            registry,
            checks_total,
            checks_skipped_locked_total,
            check_duration,
            fallback_unfiltered_total,
            nodes_in_sync_total,
            nodes_behind_total,
            node_failures_total,
            quorum_failures_total,
            altruist_failures_total,
            consensus_relays_total,
            pair_failures_total,
            last_batch_timestamp,
            last_batch_failed_pairs,
        })
    }

    /// Record the classification outcome of one completed check
    pub fn record_classification(&self, in_sync: usize, behind: usize) {
        self.nodes_in_sync_total.inc_by(in_sync as f64);
        self.nodes_behind_total.inc_by(behind as f64);
        debug!("Recorded check: {} in sync, {} behind", in_sync, behind);
    }

    /// Mark a batch as completed now
    pub fn record_batch(&self, failed_pairs: usize) {
        self.last_batch_timestamp.set(chrono::Utc::now().timestamp() as f64);
        self.last_batch_failed_pairs.set(failed_pairs as f64);
    }

    /// Completion time of the last batch, if any has completed
    pub fn last_batch_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        let secs = self.last_batch_timestamp.get() as i64;
        if secs <= 0 {
            return None;
        }
        chrono::DateTime::from_timestamp(secs, 0)
    }

    /// Get metrics for HTTP export
    pub fn gather(&self) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Timer helper for measuring a check's duration
pub struct Timer {
    start: Instant,
    metrics: Option<Arc<SyncCheckMetrics>>,
}

impl Timer {
    pub fn new(metrics: Option<Arc<SyncCheckMetrics>>) -> Self {
        Self {
            start: Instant::now(),
            metrics,
        }
    }

    /// Finish timing and record duration
    pub fn finish(self) -> Duration {
        let duration = self.start.elapsed();
        if let Some(metrics) = &self.metrics {
            metrics.check_duration.observe(duration.as_secs_f64());
        }
        duration
    }
}
