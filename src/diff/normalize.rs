//! Canonicalization of raw catalog rows into comparable record sets.
//!
//! Normalization makes equality checks meaningful: it trims whitespace,
//! collapses every null-like representation to the empty string, and cleans
//! the `remarks` field whose upstream markup repair leaves stray dashes.
//! Status codes are kept raw here; mapping them to labels is presentation
//! and belongs to the reporter.

use super::types::{Record, RecordSet};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// Schema fields the catalog endpoint is known to serve, in column order.
pub const EXPECTED_FIELDS: [&str; 9] = [
    "name",
    "sectionNo",
    "status",
    "times",
    "days",
    "rooms",
    "lecturers",
    "hours",
    "remarks",
];

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Canonicalizes raw JSON rows from the fetcher into a [`RecordSet`].
///
/// Malformed rows pass through with best-effort string coercion; this
/// function never fails.
pub fn normalize_raw(raw_records: &[Map<String, Value>]) -> RecordSet {
    let schema = build_schema(raw_records);
    let mut set = RecordSet::new(schema.clone());
    for raw in raw_records {
        let mut record = Record::new();
        for field in &schema {
            let value = raw.get(field).map(coerce_value).unwrap_or_default();
            record.set(field.clone(), normalize_value(field, &value));
        }
        set.push(record);
    }
    set
}

/// Re-canonicalizes a record set loaded from storage.
///
/// Stored snapshots were written normalized, but the same cleanup is applied
/// on the way in so both sides of every comparison agree even after the
/// cleanup rules change between runs.
pub fn normalize_records(set: RecordSet) -> RecordSet {
    let schema = set.schema().to_vec();
    let mut normalized = RecordSet::new(schema.clone());
    for record in set.records() {
        let mut cleaned = Record::new();
        for field in &schema {
            cleaned.set(field.clone(), normalize_value(field, record.get(field)));
        }
        normalized.push(cleaned);
    }
    normalized
}

/// Expected fields first, then any extra upstream fields in first-seen order.
fn build_schema(raw_records: &[Map<String, Value>]) -> Vec<String> {
    let mut schema: Vec<String> = EXPECTED_FIELDS.iter().map(|f| f.to_string()).collect();
    for raw in raw_records {
        for field in raw.keys() {
            if !schema.iter().any(|known| known == field) {
                schema.push(field.clone());
            }
        }
    }
    schema
}

/// Best-effort string coercion of a JSON scalar.
fn coerce_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn normalize_value(field: &str, value: &str) -> String {
    let trimmed = value.trim();
    if is_null_like(trimmed) {
        return String::new();
    }
    if field == "remarks" {
        return clean_remarks(trimmed);
    }
    trimmed.to_string()
}

/// True for every representation that means "no value".
pub(crate) fn is_null_like(value: &str) -> bool {
    value.is_empty()
        || value.eq_ignore_ascii_case("nan")
        || value.eq_ignore_ascii_case("null")
        || value.eq_ignore_ascii_case("none")
}

/// Remarks arrive with `-` separators injected by the payload repair; strip
/// them and collapse the leftover whitespace so stored and freshly fetched
/// values stay comparable.
fn clean_remarks(value: &str) -> String {
    let stripped = value.replace('-', "");
    WHITESPACE_RE.replace_all(&stripped, " ").trim().to_string()
}
