//! Polling orchestration: the per-dataset reconcile cycle and the
//! supervisory loop.
//!
//! Every error is contained at the dataset-iteration boundary; one
//! dataset's failure never blocks the others, and the loop never
//! terminates on error. It only pauses with bounded backoff before
//! retrying.

pub mod stats;

use crate::catalog;
use crate::config::DatasetKey;
use crate::diff::{self, ChangeSet, KeySelector, RecordSet};
use crate::snapshot::SnapshotStore;
use crate::types::MonitorState;
use rand::Rng;
use self::stats::MonitorStats;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const BACKOFF_BASE_MS: u64 = 30_000;
const BACKOFF_CAP_MS: u64 = 600_000;

/// Loads the previous snapshot, diffs against it and persists the new one.
///
/// First run (no readable snapshot) suppresses reporting entirely; a diff
/// failure is logged, counted and degrades to an empty change set. The new
/// snapshot is persisted unconditionally so stored data stays fresh.
pub fn reconcile(
    store: &SnapshotStore,
    dataset: &DatasetKey,
    current: &RecordSet,
    key: &KeySelector,
    watched_fields: &[String],
    stats: &MonitorStats,
) -> ChangeSet {
    let dataset_id = dataset.storage_key();

    let changes = match store.load(&dataset_id) {
        None => {
            info!(dataset = %dataset.label(), "no previous snapshot; bootstrapping");
            ChangeSet::default()
        }
        Some(previous) => {
            let previous = diff::normalize_records(previous);
            match diff::compute_diff(&previous, current, key, watched_fields) {
                Ok(changes) => changes,
                Err(e) => {
                    stats.record_error();
                    error!(
                        dataset = %dataset.label(),
                        error = %e,
                        "comparison failed; skipping reporting for this cycle"
                    );
                    ChangeSet::default()
                }
            }
        }
    };

    if let Err(e) = store.save(&dataset_id, current) {
        stats.record_error();
        error!(
            dataset = %dataset.label(),
            error = %e,
            "failed to persist snapshot; prior snapshot left intact"
        );
    }

    changes
}

/// One full polling iteration over every configured dataset.
///
/// Returns the number of datasets that yielded data, which the supervisory
/// loop uses to detect a fully failing iteration.
pub async fn run_iteration(state: &Arc<MonitorState>) -> usize {
    let watched_fields = state.config.enabled_fields();
    let mut datasets_with_data = 0;

    for dataset in state.config.datasets() {
        let raw = catalog::fetch_dataset(&state.catalog, &dataset, &state.stats).await;
        if raw.is_empty() {
            warn!(dataset = %dataset.label(), "no data available; snapshot left untouched");
            continue;
        }
        datasets_with_data += 1;

        let current = diff::normalize_raw(&raw);
        let changes = reconcile(
            &state.store,
            &dataset,
            &current,
            &state.key,
            &watched_fields,
            &state.stats,
        );

        if changes.is_empty() {
            debug!(dataset = %dataset.label(), records = current.len(), "no changes detected");
            continue;
        }

        state.stats.record_changes(changes.change_count() as u64);
        info!(
            dataset = %dataset.label(),
            added = changes.added.len(),
            removed = changes.removed.len(),
            modified = changes.modified.len(),
            "changes detected"
        );
        state
            .reporter
            .report(&dataset.label(), &changes, current.schema(), &state.stats)
            .await;
    }

    datasets_with_data
}

/// Supervisory loop: iterates forever on the polling cadence, sends health
/// reports on their interval, and backs off (bounded, jittered) while every
/// dataset is failing.
pub async fn run(state: Arc<MonitorState>) {
    let mut consecutive_failures: u32 = 0;
    let mut last_health_report = Instant::now();

    loop {
        let started = Instant::now();
        let datasets_with_data = run_iteration(&state).await;
        state.stats.record_iteration();

        if last_health_report.elapsed() >= state.config.health_report_interval() {
            state
                .reporter
                .send_health_report(&state.stats.snapshot(), &state.stats)
                .await;
            last_health_report = Instant::now();
        }

        let delay = if datasets_with_data == 0 {
            consecutive_failures = consecutive_failures.saturating_add(1);
            let delay = backoff_delay(consecutive_failures);
            warn!(
                consecutive_failures,
                delay_secs = delay.as_secs(),
                "iteration yielded no data; backing off"
            );
            delay
        } else {
            consecutive_failures = 0;
            state.config.poll_interval()
        };

        debug!(
            iteration_ms = started.elapsed().as_millis() as u64,
            sleep_secs = delay.as_secs(),
            "iteration complete"
        );
        tokio::time::sleep(delay).await;
    }
}

/// Doubling delay with a hard cap and 0-20% jitter.
fn backoff_delay(consecutive_failures: u32) -> Duration {
    let exponential =
        BACKOFF_BASE_MS * 2u64.pow(consecutive_failures.saturating_sub(1).min(5));
    let capped = exponential.min(BACKOFF_CAP_MS);
    let jitter = rand::thread_rng().gen_range(0..=(capped / 5));
    Duration::from_millis(capped + jitter)
}
