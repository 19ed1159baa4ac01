//! Quorum - multi-agent investment decisions for crypto markets
//!
//! Analysts report on a market snapshot, bull and bear researchers debate
//! it, a trader turns the judge's stance into a sized trade, and a risk gate
//! plus fund manager decide whether it stands.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use quorum::models::{MarketDataPackage, QuorumConfig};
//! use quorum::agents::{Pipeline, ProviderRegistry};
//! use quorum::store::ReportStore;
//! ```

pub use quorum_agents as agents;
pub use quorum_models as models;
pub use quorum_store as store;

use std::path::Path;

use anyhow::Context;
use quorum_agents::{Pipeline, ProviderRegistry};
use quorum_models::{DecisionReport, MarketDataPackage, QuorumConfig, PACKAGE_SCHEMA_VERSION};
use quorum_store::ReportStore;
use tracing::{info, warn};

/// Read and validate a TOML configuration file.
pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<QuorumConfig> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    parse_config(&raw).with_context(|| format!("Invalid config: {}", path.display()))
}

pub fn parse_config(raw: &str) -> anyhow::Result<QuorumConfig> {
    let config: QuorumConfig = toml::from_str(raw).context("Failed to parse config")?;
    config.validate()?;
    Ok(config)
}

/// Decode a market snapshot, rejecting schema versions this build does not know.
pub fn parse_package(raw: &str) -> anyhow::Result<MarketDataPackage> {
    let package: MarketDataPackage =
        serde_json::from_str(raw).context("Failed to parse MarketDataPackage JSON")?;
    anyhow::ensure!(
        package.schema_version == PACKAGE_SCHEMA_VERSION,
        "unsupported package schema_version {} (expected {PACKAGE_SCHEMA_VERSION})",
        package.schema_version
    );
    Ok(package)
}

pub fn build_registry(config: &QuorumConfig) -> anyhow::Result<ProviderRegistry> {
    ProviderRegistry::from_configs(&config.providers).context("Failed to build LLM providers")
}

/// Build a pipeline from configuration, constructing the configured providers.
pub fn build_pipeline(config: &QuorumConfig) -> anyhow::Result<Pipeline> {
    let registry = build_registry(config)?;
    Pipeline::from_registry(config.pipeline.clone(), &registry)
        .context("Failed to build pipeline")
}

pub fn open_store(config: &QuorumConfig) -> anyhow::Result<Option<ReportStore>> {
    config
        .store
        .as_ref()
        .map(|store| ReportStore::open(store).context("Failed to open report store"))
        .transpose()
}

/// Run one package through the pipeline and persist the report if a store is given.
///
/// A persistence failure is logged and does not discard the report.
pub async fn analyze(
    pipeline: &Pipeline,
    package: MarketDataPackage,
    store: Option<&ReportStore>,
) -> DecisionReport {
    let report = pipeline.run(package).await;
    if let Some(store) = store {
        match store.save(&report).await {
            Ok(()) => info!(id = %report.id, "Report persisted"),
            Err(e) => warn!(id = %report.id, error = %e, "Failed to persist report"),
        }
    }
    report
}
