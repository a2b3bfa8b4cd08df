//! Catalog fetch subsystem: rate-limited HTTP client plus pagination.

mod client;
mod error;

pub use client::{CatalogClient, CatalogConfig};
pub use error::FetchError;

use crate::config::DatasetKey;
use crate::monitor::stats::MonitorStats;
use serde_json::{Map, Value};
use tracing::warn;

/// Fetches every page of raw rows for one dataset.
///
/// Pages are requested from 1 upward; the first empty page terminates the
/// sequence. A page-level failure is logged, counted, and treated as end of
/// data; rows from earlier pages are kept.
pub async fn fetch_dataset(
    client: &CatalogClient,
    dataset: &DatasetKey,
    stats: &MonitorStats,
) -> Vec<Map<String, Value>> {
    let mut rows = Vec::new();
    for page in 1..=client.max_pages() {
        match client.fetch_page(dataset, page).await {
            Ok(page_rows) if page_rows.is_empty() => break,
            Ok(mut page_rows) => rows.append(&mut page_rows),
            Err(e) => {
                stats.record_error();
                warn!(
                    dataset = %dataset.label(),
                    page,
                    error = %e,
                    "page fetch failed; treating as end of data"
                );
                break;
            }
        }
    }
    rows
}
