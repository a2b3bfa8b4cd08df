//! Static monitor configuration.
//!
//! Loaded once at startup from a JSON file. The college / degree /
//! department entries enumerate the monitored dataset combinations; the
//! watched-field list carries the notification toggles in priority order.

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One selectable catalog parameter: a human label plus the numeric id the
/// upstream RPC expects.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ParamEntry {
    pub label: String,
    pub id: String,
}

/// A watched record field with its notification toggle.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchedField {
    pub field: String,
    #[serde(default = "default_true")]
    pub notify: bool,
}

/// Remote-source settings for the catalog client.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub base_url: String,
    #[serde(default)]
    pub session_cookie: Option<String>,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
    #[serde(default = "default_min_fetch_interval_ms")]
    pub min_fetch_interval_ms: u64,
}

impl SourceConfig {
    pub fn min_fetch_interval(&self) -> Duration {
        Duration::from_millis(self.min_fetch_interval_ms)
    }
}

/// Top-level monitor configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    pub bot_token: String,
    pub chat_ids: Vec<String>,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_health_report_interval_secs")]
    pub health_report_interval_secs: u64,
    #[serde(default = "default_notification_cooldown_secs")]
    pub notification_cooldown_secs: u64,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    pub source: SourceConfig,
    pub colleges: Vec<ParamEntry>,
    pub degrees: Vec<ParamEntry>,
    pub departments: Vec<ParamEntry>,
    /// college id → department ids monitored for it; an absent college
    /// monitors every department
    #[serde(default)]
    pub department_allowlist: HashMap<String, Vec<String>>,
    #[serde(default = "default_watched_fields")]
    pub watched_fields: Vec<WatchedField>,
}

impl MonitorConfig {
    /// Loads configuration from a JSON file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: MonitorConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Enumerates every monitored dataset combination, honoring the
    /// per-college department allowlist.
    pub fn datasets(&self) -> Vec<DatasetKey> {
        let mut keys = Vec::new();
        for college in &self.colleges {
            for degree in &self.degrees {
                for department in &self.departments {
                    if let Some(allowed) = self.department_allowlist.get(&college.id) {
                        if !allowed.contains(&department.id) {
                            continue;
                        }
                    }
                    keys.push(DatasetKey {
                        college: college.clone(),
                        degree: degree.clone(),
                        department: department.clone(),
                    });
                }
            }
        }
        keys
    }

    /// Watched fields with notifications enabled, in priority order.
    pub fn enabled_fields(&self) -> Vec<String> {
        self.watched_fields
            .iter()
            .filter(|f| f.notify)
            .map(|f| f.field.clone())
            .collect()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn health_report_interval(&self) -> Duration {
        Duration::from_secs(self.health_report_interval_secs)
    }

    pub fn notification_cooldown(&self) -> Duration {
        Duration::from_secs(self.notification_cooldown_secs)
    }
}

/// One monitored (college, degree, department) slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetKey {
    pub college: ParamEntry,
    pub degree: ParamEntry,
    pub department: ParamEntry,
}

impl DatasetKey {
    /// Human label used in notifications and logs.
    pub fn label(&self) -> String {
        format!(
            "{} / {} / {}",
            self.college.label, self.degree.label, self.department.label
        )
    }

    /// Stable filesystem-safe identifier for the snapshot store.
    pub fn storage_key(&self) -> String {
        sanitize(&format!(
            "{}_{}_{}",
            self.college.label, self.degree.label, self.department.label
        ))
    }
}

fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn default_true() -> bool {
    true
}

fn default_max_pages() -> u32 {
    99
}

fn default_max_concurrent_fetches() -> usize {
    5
}

fn default_min_fetch_interval_ms() -> u64 {
    1000
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_health_report_interval_secs() -> u64 {
    3600
}

fn default_notification_cooldown_secs() -> u64 {
    300
}

fn default_data_dir() -> String {
    "data".to_string()
}

/// Default priority order; remarks changes are tracked but not notified.
fn default_watched_fields() -> Vec<WatchedField> {
    let mut fields: Vec<WatchedField> = ["status", "times", "days", "rooms", "lecturers", "hours"]
        .iter()
        .map(|field| WatchedField {
            field: field.to_string(),
            notify: true,
        })
        .collect();
    fields.push(WatchedField {
        field: "remarks".to_string(),
        notify: false,
    });
    fields
}
