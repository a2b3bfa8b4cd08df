//! The change-detection engine.
//!
//! Given two normalized record sets it computes added records, removed
//! records and per-field modifications. Additions and removals take
//! precedence over field diffs: any net record-count change for the dataset
//! is reported as add/remove events and the field-level pass is skipped for
//! that cycle.

use super::normalize::is_null_like;
use super::types::{ChangeSet, FieldDiff, Record, RecordSet, NAME_FIELD};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Errors raised on structural problems during comparison.
///
/// These are caught at the orchestration layer: a failed comparison is
/// logged, counted, and yields an empty [`ChangeSet`] for the cycle.
#[derive(Debug, Error)]
pub enum DiffError {
    /// The join key field is missing from a snapshot's schema.
    #[error("snapshot schema is missing key field `{field}`")]
    MissingKeyField { field: String },

    /// The two snapshots do not share a field list.
    #[error("snapshot schemas do not match: {message}")]
    SchemaMismatch { message: String },
}

/// Selects the join key used to match records across snapshots.
///
/// The catalog source treats the course name as the effective join key, so
/// that is the default; section numbers only participate in the display
/// identity.
#[derive(Debug, Clone)]
pub struct KeySelector {
    join_field: String,
}

impl KeySelector {
    pub fn new(join_field: impl Into<String>) -> Self {
        Self {
            join_field: join_field.into(),
        }
    }

    pub fn join_field(&self) -> &str {
        &self.join_field
    }

    fn key_of<'a>(&self, record: &'a Record) -> &'a str {
        record.get(&self.join_field)
    }
}

impl Default for KeySelector {
    fn default() -> Self {
        Self::new(NAME_FIELD)
    }
}

/// Computes the structured diff between two normalized record sets.
///
/// Algorithm:
/// 1. structural short-circuit: if the sets hold the same records
///    (order-independent multiset equality), return an empty change set;
/// 2. identity pass: partition by join-key presence into added/removed;
/// 3. add/remove precedence: any addition or removal suppresses the
///    field-level pass for this cycle;
/// 4. field-level pass: for each watched field (declaration order), for each
///    current record (source order), emit one [`FieldDiff`] per real change.
pub fn compute_diff(
    previous: &RecordSet,
    current: &RecordSet,
    key: &KeySelector,
    watched_fields: &[String],
) -> Result<ChangeSet, DiffError> {
    if structurally_equal(previous, current) {
        return Ok(ChangeSet::default());
    }
    check_schemas(previous, current, key)?;

    let previous_keys: HashSet<&str> = previous.records().iter().map(|r| key.key_of(r)).collect();
    let current_keys: HashSet<&str> = current.records().iter().map(|r| key.key_of(r)).collect();

    let added: Vec<Record> = current
        .records()
        .iter()
        .filter(|r| !previous_keys.contains(key.key_of(r)))
        .cloned()
        .collect();
    let removed: Vec<Record> = previous
        .records()
        .iter()
        .filter(|r| !current_keys.contains(key.key_of(r)))
        .cloned()
        .collect();

    if !added.is_empty() || !removed.is_empty() {
        return Ok(ChangeSet {
            added,
            removed,
            modified: Vec::new(),
        });
    }

    // First record wins for a duplicated join key, matching source behavior.
    let mut previous_by_key: HashMap<&str, &Record> = HashMap::new();
    for record in previous.records() {
        previous_by_key.entry(key.key_of(record)).or_insert(record);
    }

    let mut modified = Vec::new();
    for field in watched_fields {
        if !current.schema().iter().any(|f| f == field) {
            continue;
        }
        for record in current.records() {
            let Some(prev) = previous_by_key.get(key.key_of(record)) else {
                continue;
            };
            let prev_value = prev.get(field);
            let curr_value = record.get(field);
            if !values_equivalent(prev_value, curr_value) {
                modified.push(FieldDiff {
                    key: record.key(),
                    field: field.clone(),
                    previous: prev_value.to_string(),
                    current: curr_value.to_string(),
                });
            }
        }
    }

    Ok(ChangeSet {
        added,
        removed,
        modified,
    })
}

/// Order-independent one-to-one match of full field maps.
fn structurally_equal(a: &RecordSet, b: &RecordSet) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut counts: HashMap<&Record, usize> = HashMap::with_capacity(a.len());
    for record in a.records() {
        *counts.entry(record).or_default() += 1;
    }
    for record in b.records() {
        match counts.get_mut(record) {
            Some(count) if *count > 0 => *count -= 1,
            _ => return false,
        }
    }
    true
}

fn check_schemas(
    previous: &RecordSet,
    current: &RecordSet,
    key: &KeySelector,
) -> Result<(), DiffError> {
    let join = key.join_field();
    for schema in [previous.schema(), current.schema()] {
        if !schema.iter().any(|f| f == join) {
            return Err(DiffError::MissingKeyField {
                field: join.to_string(),
            });
        }
    }

    let prev_fields: HashSet<&str> = previous.schema().iter().map(String::as_str).collect();
    let curr_fields: HashSet<&str> = current.schema().iter().map(String::as_str).collect();
    if prev_fields != curr_fields {
        let only_prev: Vec<&str> = prev_fields.difference(&curr_fields).copied().collect();
        let only_curr: Vec<&str> = curr_fields.difference(&prev_fields).copied().collect();
        return Err(DiffError::SchemaMismatch {
            message: format!(
                "only in previous: {only_prev:?}, only in current: {only_curr:?}"
            ),
        });
    }
    Ok(())
}

/// Guards against empty-vs-null churn: values are equivalent when they match
/// after trimming, or when both reduce to an empty state.
fn values_equivalent(a: &str, b: &str) -> bool {
    let a = a.trim();
    let b = b.trim();
    a == b || (is_null_like(a) && is_null_like(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::normalize::{normalize_raw, EXPECTED_FIELDS};
    use serde_json::{json, Map, Value};

    fn course(name: &str, section: &str, pairs: &[(&str, &str)]) -> Map<String, Value> {
        let mut row = Map::new();
        row.insert("name".to_string(), json!(name));
        row.insert("sectionNo".to_string(), json!(section));
        for (field, value) in pairs {
            row.insert(field.to_string(), json!(value));
        }
        row
    }

    fn set_of(rows: Vec<Map<String, Value>>) -> RecordSet {
        normalize_raw(&rows)
    }

    fn watched() -> Vec<String> {
        ["status", "times", "days", "rooms", "lecturers", "hours"]
            .iter()
            .map(|f| f.to_string())
            .collect()
    }

    #[test]
    fn test_idempotence() {
        let set = set_of(vec![
            course("CS101", "1", &[("status", "1"), ("rooms", "A1")]),
            course("MATH200", "2", &[("status", "3")]),
        ]);
        let changes = compute_diff(&set, &set, &KeySelector::default(), &watched()).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_scenario_status_change() {
        let previous = set_of(vec![course("CS101", "1", &[("status", "1")])]);
        let current = set_of(vec![course("CS101", "1", &[("status", "2")])]);

        let changes =
            compute_diff(&previous, &current, &KeySelector::default(), &watched()).unwrap();
        assert!(changes.added.is_empty());
        assert!(changes.removed.is_empty());
        assert_eq!(changes.modified.len(), 1);

        let diff = &changes.modified[0];
        assert_eq!(diff.key.to_string(), "CS101/1");
        assert_eq!(diff.field, "status");
        assert_eq!(diff.previous, "1");
        assert_eq!(diff.current, "2");
    }

    #[test]
    fn test_scenario_removal_suppresses_field_diffs() {
        let previous = set_of(vec![
            course("CS101", "1", &[("status", "1")]),
            course("MATH200", "1", &[("status", "1")]),
        ]);
        // MATH200 disappears and CS101's status also changed
        let current = set_of(vec![course("CS101", "1", &[("status", "2")])]);

        let changes =
            compute_diff(&previous, &current, &KeySelector::default(), &watched()).unwrap();
        assert!(changes.added.is_empty());
        assert_eq!(changes.removed.len(), 1);
        assert_eq!(changes.removed[0].get("name"), "MATH200");
        assert!(changes.modified.is_empty());
    }

    #[test]
    fn test_addition_suppresses_field_diffs() {
        let previous = set_of(vec![course("CS101", "1", &[("rooms", "A1")])]);
        let current = set_of(vec![
            course("CS101", "1", &[("rooms", "B2")]),
            course("PHYS150", "1", &[("rooms", "C3")]),
        ]);

        let changes =
            compute_diff(&previous, &current, &KeySelector::default(), &watched()).unwrap();
        assert_eq!(changes.added.len(), 1);
        assert_eq!(changes.added[0].get("name"), "PHYS150");
        assert!(changes.removed.is_empty());
        assert!(changes.modified.is_empty());
    }

    #[test]
    fn test_symmetry_of_identity() {
        let a = set_of(vec![
            course("CS101", "1", &[]),
            course("MATH200", "1", &[]),
        ]);
        let b = set_of(vec![
            course("CS101", "1", &[]),
            course("PHYS150", "1", &[]),
        ]);

        let forward = compute_diff(&a, &b, &KeySelector::default(), &watched()).unwrap();
        let backward = compute_diff(&b, &a, &KeySelector::default(), &watched()).unwrap();
        assert_eq!(forward.added, backward.removed);
        assert_eq!(forward.removed, backward.added);
    }

    #[test]
    fn test_whitespace_only_difference_is_no_change() {
        let previous = set_of(vec![course("CS101", "1", &[("rooms", " Room 5")])]);
        let current = set_of(vec![course("CS101", "1", &[("rooms", "Room 5")])]);

        let changes =
            compute_diff(&previous, &current, &KeySelector::default(), &watched()).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_null_representations_do_not_churn() {
        // normalization collapses both sides to "", so no diff is emitted
        let previous = set_of(vec![course("CS101", "1", &[("times", "nan")])]);
        let current = set_of(vec![course("CS101", "1", &[("times", "  ")])]);

        let changes =
            compute_diff(&previous, &current, &KeySelector::default(), &watched()).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_multiple_changed_fields_yield_independent_diffs() {
        let previous = set_of(vec![course(
            "CS101",
            "1",
            &[("status", "1"), ("rooms", "A1"), ("days", "Mon")],
        )]);
        let current = set_of(vec![course(
            "CS101",
            "1",
            &[("status", "2"), ("rooms", "B2"), ("days", "Mon")],
        )]);

        let changes =
            compute_diff(&previous, &current, &KeySelector::default(), &watched()).unwrap();
        // watched-field declaration order: status before rooms
        assert_eq!(changes.modified.len(), 2);
        assert_eq!(changes.modified[0].field, "status");
        assert_eq!(changes.modified[1].field, "rooms");
    }

    #[test]
    fn test_field_diff_ordering_is_field_then_record() {
        let previous = set_of(vec![
            course("CS101", "1", &[("status", "1"), ("rooms", "A1")]),
            course("MATH200", "1", &[("status", "1"), ("rooms", "A2")]),
        ]);
        let current = set_of(vec![
            course("CS101", "1", &[("status", "2"), ("rooms", "B1")]),
            course("MATH200", "1", &[("status", "3"), ("rooms", "B2")]),
        ]);

        let changes =
            compute_diff(&previous, &current, &KeySelector::default(), &watched()).unwrap();
        let order: Vec<(String, String)> = changes
            .modified
            .iter()
            .map(|d| (d.field.clone(), d.key.name.clone()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("status".to_string(), "CS101".to_string()),
                ("status".to_string(), "MATH200".to_string()),
                ("rooms".to_string(), "CS101".to_string()),
                ("rooms".to_string(), "MATH200".to_string()),
            ]
        );
    }

    #[test]
    fn test_unwatched_field_change_is_ignored() {
        let previous = set_of(vec![course("CS101", "1", &[("remarks", "old note")])]);
        let current = set_of(vec![course("CS101", "1", &[("remarks", "new note")])]);

        // remarks is not in the watched list here
        let changes =
            compute_diff(&previous, &current, &KeySelector::default(), &watched()).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_schema_mismatch_is_an_error() {
        let previous = set_of(vec![course("CS101", "1", &[])]);
        let mut current = RecordSet::new(vec!["name".to_string(), "unexpected".to_string()]);
        let mut record = Record::new();
        record.set("name", "CS101");
        record.set("unexpected", "x");
        current.push(record);

        let result = compute_diff(&previous, &current, &KeySelector::default(), &watched());
        assert!(matches!(result, Err(DiffError::SchemaMismatch { .. })));
    }

    #[test]
    fn test_missing_key_field_is_an_error() {
        // sets must differ so the structural short-circuit does not apply
        let previous = set_of(vec![course("CS101", "1", &[("rooms", "A1")])]);
        let current = set_of(vec![course("CS101", "1", &[("rooms", "B2")])]);

        let selector = KeySelector::new("no_such_field");
        let result = compute_diff(&previous, &current, &selector, &watched());
        assert!(matches!(result, Err(DiffError::MissingKeyField { .. })));
    }

    #[test]
    fn test_expected_schema_round_trips_through_short_circuit() {
        // identical sets with every expected field populated short-circuit
        let pairs: Vec<(&str, &str)> = EXPECTED_FIELDS
            .iter()
            .skip(2)
            .map(|f| (*f, "value"))
            .collect();
        let a = set_of(vec![course("CS101", "1", &pairs)]);
        let b = set_of(vec![course("CS101", "1", &pairs)]);
        let changes = compute_diff(&a, &b, &KeySelector::default(), &watched()).unwrap();
        assert!(changes.is_empty());
    }
}
