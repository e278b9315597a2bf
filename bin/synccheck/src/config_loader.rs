use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use synccheck_cache::CacheConfig;
use synccheck_common::types::{Application, Chain};
use synccheck_common::utils::config::{load_config, load_config_with_env};
use synccheck_common::utils::logging::LoggingConfig;
use synccheck_common::utils::metrics::MetricsConfig;
use synccheck_core::{OrchestratorConfig, SyncCheckConfig};
use synccheck_network::NetworkConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub checker: SyncCheckConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    pub network: NetworkConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("catalog.json")
}

/// Applications and chains this gateway serves
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Catalog {
    #[serde(default)]
    pub applications: Vec<Application>,
    #[serde(default)]
    pub chains: Vec<Chain>,
}

pub fn load_app_config<P: AsRef<Path>>(
    path: P,
    catalog_override: Option<PathBuf>,
    debug: bool,
) -> Result<AppConfig> {
    let mut config: AppConfig = load_config_with_env(path)?;

    if let Some(catalog) = catalog_override {
        config.catalog_path = catalog;
    }
    if debug {
        config.logging.level = "debug".to_string();
    }

    Ok(config)
}

pub fn load_catalog<P: AsRef<Path>>(path: P) -> Result<Catalog> {
    let catalog: Catalog = load_config(&path)
        .with_context(|| format!("Failed to load catalog {:?}", path.as_ref()))?;

    let mut seen = HashSet::new();
    for chain in &catalog.chains {
        if !seen.insert(chain.id.as_str()) {
            bail!("Duplicate chain {} in catalog", chain.id);
        }
        if chain.sync_check.result_key.is_empty() {
            bail!("Chain {} has an empty sync check result key", chain.id);
        }
    }

    Ok(catalog)
}
