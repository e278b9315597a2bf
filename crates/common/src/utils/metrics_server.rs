use crate::utils::metrics::{MetricsConfig, SyncCheckMetrics};
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Clone)]
struct ServerState {
    metrics: Arc<SyncCheckMetrics>,
    stale_after: Duration,
}

/// Serves `/metrics` (Prometheus text) and `/health` (batch freshness)
pub struct MetricsServer {
    state: ServerState,
    bind_address: String,
}

impl MetricsServer {
    pub fn new(metrics: Arc<SyncCheckMetrics>, config: &MetricsConfig) -> Self {
        Self {
            state: ServerState {
                metrics,
                stale_after: Duration::from_secs(config.stale_after_secs),
            },
            bind_address: config.bind_address.clone(),
        }
    }

    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let app = router(self.state.clone());

        let listener = tokio::net::TcpListener::bind(&self.bind_address).await?;
        info!("Metrics server listening on {}", self.bind_address);

        axum::serve(listener, app).await?;
        Ok(())
    }
}

async fn metrics_handler(State(state): State<ServerState>) -> Result<String, StatusCode> {
    state.metrics.gather().map_err(|err| {
        error!("Failed to gather metrics: {}", err);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// `starting` until the first batch completes, `stale` (503) once the last
/// batch is older than the configured window
async fn health_handler(State(state): State<ServerState>) -> (StatusCode, Json<Value>) {
    let now = chrono::Utc::now();
    let last_batch = state.metrics.last_batch_at();
    let failed_pairs = state.metrics.last_batch_failed_pairs.get() as u64;

    let (code, status) = match last_batch {
        None => (StatusCode::OK, "starting"),
        Some(at) if (now - at).to_std().unwrap_or_default() > state.stale_after => {
            (StatusCode::SERVICE_UNAVAILABLE, "stale")
        }
        Some(_) => (StatusCode::OK, "healthy"),
    };

    (
        code,
        Json(json!({
            "status": status,
            "timestamp": now.to_rfc3339(),
            "last_batch_at": last_batch.map(|at| at.to_rfc3339()),
            "last_batch_failed_pairs": failed_pairs,
        })),
    )
}

fn router(state: ServerState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}
