//! Course-catalog change monitor.
//!
//! Polls the remote catalog for every configured (college, degree,
//! department) combination, diffs each fetch against the stored snapshot
//! and reports changes to Telegram.

mod catalog;
mod config;
mod diff;
mod monitor;
mod report;
mod snapshot;
mod types;

use crate::config::MonitorConfig;
use crate::types::MonitorState;
use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "monitor.json".to_string());
    let config = MonitorConfig::load_from_file(Path::new(&config_path))
        .with_context(|| format!("failed to load configuration from {config_path}"))?;

    info!(
        datasets = config.datasets().len(),
        poll_interval_secs = config.poll_interval_secs,
        "starting course catalog monitor"
    );

    let state = Arc::new(MonitorState::from_config(config)?);

    tokio::select! {
        _ = monitor::run(Arc::clone(&state)) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received; stopping");
        }
    }

    Ok(())
}
