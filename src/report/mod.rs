//! Change reporting: turns computed diffs into notification text and
//! delivers one message per change event to every configured chat.
//!
//! Delivery failures are logged per recipient and never abort the remaining
//! recipients or messages. Identical messages are debounced within the
//! configured cooldown window.

mod telegram;

pub use telegram::{DeliveryError, TelegramClient};

use crate::diff::{ChangeSet, FieldDiff, Record};
use crate::monitor::stats::{MonitorStats, StatsSnapshot};
use dashmap::DashMap;
use futures::future::join_all;
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

const ADDED_HEADER: &str = "Changes Occurs: NEW COURSE(S) ADDED";
const REMOVED_HEADER: &str = "Changes Occurs: COURSE(S) DELETED";

/// Maps a raw status code to its display label.
///
/// Unknown codes pass through unchanged.
pub fn status_label(code: &str) -> &str {
    match code {
        "1" => "Available",
        "2" => "Cancelled",
        "3" => "Closed",
        other => other,
    }
}

/// Delivers change notifications and health reports to Telegram chats.
pub struct ChangeReporter {
    client: TelegramClient,
    chat_ids: Vec<String>,
    cooldown: Duration,
    /// message digest → last delivery time
    recent: DashMap<String, Instant>,
}

impl ChangeReporter {
    pub fn new(client: TelegramClient, chat_ids: Vec<String>, cooldown: Duration) -> Self {
        Self {
            client,
            chat_ids,
            cooldown,
            recent: DashMap::new(),
        }
    }

    /// Delivers one message per added record, one per removed record and one
    /// per field diff, labeled with the dataset's display name.
    pub async fn report(
        &self,
        label: &str,
        changes: &ChangeSet,
        schema: &[String],
        stats: &MonitorStats,
    ) {
        for record in &changes.added {
            self.deliver(&format_record_message(ADDED_HEADER, record, schema, label), stats)
                .await;
        }
        for record in &changes.removed {
            self.deliver(
                &format_record_message(REMOVED_HEADER, record, schema, label),
                stats,
            )
            .await;
        }
        for diff in &changes.modified {
            self.deliver(&format_field_diff(diff, label), stats).await;
        }
    }

    /// Sends the periodic health summary to every chat.
    pub async fn send_health_report(&self, snapshot: &StatsSnapshot, stats: &MonitorStats) {
        self.deliver(&format_health_report(snapshot), stats).await;
    }

    async fn deliver(&self, text: &str, stats: &MonitorStats) {
        if self.on_cooldown(text) {
            debug!("identical notification within cooldown window; suppressed");
            return;
        }

        let sends = self.chat_ids.iter().map(|chat_id| async move {
            (chat_id, self.client.send_message(chat_id, text).await)
        });
        for (chat_id, result) in join_all(sends).await {
            match result {
                Ok(()) => {
                    stats.record_notification();
                    info!(chat_id = %chat_id, "notification delivered");
                }
                Err(e) => {
                    stats.record_error();
                    error!(chat_id = %chat_id, error = %e, "failed to deliver notification");
                }
            }
        }
    }

    /// True when an identical message went out inside the cooldown window.
    /// A zero cooldown disables debouncing entirely.
    fn on_cooldown(&self, text: &str) -> bool {
        if self.cooldown.is_zero() {
            return false;
        }
        let digest = message_digest(text);
        let now = Instant::now();
        let mut hit = false;
        self.recent
            .entry(digest)
            .and_modify(|last| {
                if last.elapsed() < self.cooldown {
                    hit = true;
                } else {
                    *last = now;
                }
            })
            .or_insert(now);
        hit
    }
}

/// Digest of the message text; the ledger never holds full message bodies.
fn message_digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let result = hasher.finalize();
    result[..16].iter().map(|b| format!("{b:02x}")).collect()
}

fn format_record_message(header: &str, record: &Record, schema: &[String], label: &str) -> String {
    let mut lines = Vec::with_capacity(schema.len() + 4);
    lines.push(header.to_string());
    lines.push(String::new());
    for field in schema {
        let value = if field == "status" {
            status_label(record.get(field)).to_string()
        } else {
            record.get(field).to_string()
        };
        lines.push(format!("{} : {}", title_case(field), value));
    }
    lines.push(String::new());
    lines.push(label.to_string());
    lines.join("\n")
}

fn format_field_diff(diff: &FieldDiff, label: &str) -> String {
    let field_title = title_case(&diff.field);
    let (previous, current) = if diff.field == "status" {
        (
            status_label(&diff.previous).to_string(),
            status_label(&diff.current).to_string(),
        )
    } else {
        (diff.previous.clone(), diff.current.clone())
    };

    format!(
        "Changes Detected in {field_title}\n\n\
         Course Name: {name}\n\
         Section: {section}\n\
         Previous {field_title}: {previous}\n\
         New {field_title}: {current}\n\n\
         {label}",
        name = diff.key.name,
        section = diff.key.section,
    )
}

fn format_health_report(snapshot: &StatsSnapshot) -> String {
    format!(
        "🤖 Course Monitor Health Report\n\
         Report Time: {}\n\
         Uptime: {:.1} hours\n\
         Iterations: {}\n\
         Changes Detected: {}\n\
         Notifications Sent: {}\n\
         Errors: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        snapshot.uptime.as_secs_f64() / 3600.0,
        snapshot.iterations_completed,
        snapshot.changes_detected,
        snapshot.notifications_sent,
        snapshot.errors_encountered,
    )
}

fn title_case(field: &str) -> String {
    let mut chars = field.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
