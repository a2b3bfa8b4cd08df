//! Shared application state.

use crate::catalog::{CatalogClient, CatalogConfig};
use crate::config::MonitorConfig;
use crate::diff::KeySelector;
use crate::monitor::stats::MonitorStats;
use crate::report::{ChangeReporter, TelegramClient};
use crate::snapshot::SnapshotStore;
use anyhow::Context;

/// Everything a polling iteration needs, shared behind an `Arc`.
pub struct MonitorState {
    pub config: MonitorConfig,
    pub catalog: CatalogClient,
    pub store: SnapshotStore,
    pub reporter: ChangeReporter,
    pub key: KeySelector,
    pub stats: MonitorStats,
}

impl MonitorState {
    /// Assembles the application state from loaded configuration.
    pub fn from_config(config: MonitorConfig) -> anyhow::Result<Self> {
        let catalog = CatalogClient::new(CatalogConfig {
            base_url: config.source.base_url.clone(),
            session_cookie: config.source.session_cookie.clone(),
            max_pages: config.source.max_pages,
            max_concurrent_fetches: config.source.max_concurrent_fetches,
            min_fetch_interval: config.source.min_fetch_interval(),
            ..CatalogConfig::default()
        })
        .context("failed to build catalog client")?;

        let telegram = TelegramClient::new(&config.bot_token)
            .context("failed to build telegram client")?;
        let reporter = ChangeReporter::new(
            telegram,
            config.chat_ids.clone(),
            config.notification_cooldown(),
        );

        let store = SnapshotStore::new(config.data_dir.clone());

        Ok(Self {
            config,
            catalog,
            store,
            reporter,
            key: KeySelector::default(),
            stats: MonitorStats::new(),
        })
    }
}
