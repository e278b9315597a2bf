mod cli;
mod config_loader;

use anyhow::{anyhow, Context};
use clap::Parser;
use std::sync::Arc;
use synccheck_cache::CacheCoordinator;
use synccheck_common::utils::logging::init_logging;
use synccheck_common::utils::metrics::SyncCheckMetrics;
use synccheck_common::utils::metrics_server::MetricsServer;
use synccheck_core::{CheckOrchestrator, HttpAltruist, SyncChecker};
use synccheck_network::{CachedNodeLocator, PocketClient};
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Parse CLI
    let args = cli::Cli::parse();

    // 2. Load Config
    let config = config_loader::load_app_config(&args.config, args.catalog.clone(), args.debug)?;

    // 3. Setup Logging
    init_logging(&config.logging).map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;
    info!("Loaded config from {:?}", args.config);

    let catalog = config_loader::load_catalog(&config.catalog_path)?;
    info!(
        applications = catalog.applications.len(),
        chains = catalog.chains.len(),
        "Loaded catalog from {:?}",
        config.catalog_path
    );

    // 4. Metrics
    let metrics = Arc::new(SyncCheckMetrics::new().context("Failed to register metrics")?);
    if config.metrics.enabled {
        let server = MetricsServer::new(metrics.clone(), &config.metrics);
        tokio::spawn(async move {
            if let Err(e) = server.start().await {
                error!("Metrics server stopped: {}", e);
            }
        });
    }

    // 5. Wire components
    let cache = Arc::new(CacheCoordinator::from_config(&config.cache)?);
    if cache.is_empty() {
        anyhow::bail!("At least one cache instance must be configured");
    }
    info!(instances = cache.len(), "Cache coordinator ready");
    let pocket = Arc::new(PocketClient::new(&config.network)?);
    let locator = Arc::new(CachedNodeLocator::new(&config.network)?);
    let altruist = Arc::new(HttpAltruist::new(config.checker.altruist_timeout()));

    let checker = Arc::new(
        SyncChecker::new(config.checker.clone(), cache, pocket.clone(), altruist, locator)
            .with_metrics(metrics.clone()),
    );
    let orchestrator =
        CheckOrchestrator::new(checker, pocket.clone(), pocket, config.orchestrator.clone())
            .with_metrics(metrics);

    // 6. Run
    if args.once {
        let report = orchestrator.run(&catalog.applications, &catalog.chains).await?;
        info!(checked = report.checked(), failed = report.failed(), "Single batch finished");
        return Ok(());
    }

    let mut interval = tokio::time::interval(config.orchestrator.interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!(interval_secs = config.orchestrator.interval().as_secs(), "Sync checker started");

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = orchestrator.run(&catalog.applications, &catalog.chains).await {
                    error!("Sync check batch failed: {}", e);
                }
            }
            _ = &mut shutdown => break,
        }
    }

    info!("Shutting down gracefully");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM. The batch in progress, if any, finishes first.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
