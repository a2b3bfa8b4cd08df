//! CSV-backed snapshot persistence.
//!
//! Each dataset's last-known record set lives in one CSV file with a header
//! row matching the schema. Reads tolerate a missing file (first run) and a
//! malformed file (logged, treated as absent). Writes go through a temp
//! file and a rename so an interrupted cycle never leaves a torn snapshot.

use crate::diff::{Record, RecordSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Errors raised while persisting or reading snapshots.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed snapshot file: {message}")]
    Malformed { message: String },
}

/// Stores one CSV snapshot per dataset under a data directory.
pub struct SnapshotStore {
    data_dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn path_for(&self, dataset_id: &str) -> PathBuf {
        self.data_dir.join(format!("{dataset_id}.csv"))
    }

    /// Loads the last-known snapshot for a dataset.
    ///
    /// Returns `None` on the first run (no file) and on an unreadable or
    /// malformed file, which degrades to bootstrap behavior upstream.
    pub fn load(&self, dataset_id: &str) -> Option<RecordSet> {
        let path = self.path_for(dataset_id);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read snapshot; treating as absent");
                return None;
            }
        };

        match parse_csv(&content) {
            Ok(set) => Some(set),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "malformed snapshot; treating as absent");
                None
            }
        }
    }

    /// Persists a record set as the dataset's new snapshot.
    ///
    /// Write-then-swap: the content lands in a sibling temp file which is
    /// renamed over the target, so a failed write leaves the prior snapshot
    /// intact.
    pub fn save(&self, dataset_id: &str, set: &RecordSet) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.data_dir)?;
        let path = self.path_for(dataset_id);
        let temp_path = path.with_extension("csv.tmp");

        fs::write(&temp_path, encode_csv(set))?;
        fs::rename(&temp_path, &path)?;
        Ok(())
    }
}

fn encode_csv(set: &RecordSet) -> String {
    let mut out = String::new();
    push_row(&mut out, set.schema().iter().map(String::as_str));
    for record in set.records() {
        push_row(&mut out, set.schema().iter().map(|field| record.get(field)));
    }
    out
}

fn push_row<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    let mut first = true;
    for field in fields {
        if !first {
            out.push(',');
        }
        first = false;
        out.push_str(&escape_field(field));
    }
    out.push('\n');
}

fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn parse_csv(content: &str) -> Result<RecordSet, PersistenceError> {
    let rows = parse_rows(content)?;
    let mut rows = rows.into_iter();
    let header = rows.next().ok_or(PersistenceError::Malformed {
        message: "missing header row".to_string(),
    })?;

    let mut set = RecordSet::new(header.clone());
    for (index, row) in rows.enumerate() {
        if row.len() != header.len() {
            return Err(PersistenceError::Malformed {
                message: format!(
                    "row {} has {} fields, header has {}",
                    index + 1,
                    row.len(),
                    header.len()
                ),
            });
        }
        let mut record = Record::new();
        for (field, value) in header.iter().zip(row) {
            record.set(field.clone(), value);
        }
        set.push(record);
    }
    Ok(set)
}

/// RFC-4180-style row splitting: quoted fields may hold commas, doubled
/// quotes and line breaks.
fn parse_rows(content: &str) -> Result<Vec<Vec<String>>, PersistenceError> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;

    let mut chars = content.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => {
                row.push(std::mem::take(&mut field));
            }
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(PersistenceError::Malformed {
            message: "unterminated quoted field".to_string(),
        });
    }
    // final row without a trailing newline
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::RecordSet;
    use tempfile::TempDir;

    fn sample_set() -> RecordSet {
        let schema = vec![
            "name".to_string(),
            "sectionNo".to_string(),
            "remarks".to_string(),
        ];
        let mut set = RecordSet::new(schema);
        let mut a = Record::new();
        a.set("name", "CS101");
        a.set("sectionNo", "1");
        a.set("remarks", "meets Mon, Wed");
        set.push(a);
        let mut b = Record::new();
        b.set("name", "Poetry \"Advanced\"");
        b.set("sectionNo", "2");
        b.set("remarks", "line one\nline two");
        set.push(b);
        set
    }

    #[test]
    fn test_round_trip_with_quoting() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());

        let original = sample_set();
        store.save("eng_bachelors_cs", &original).unwrap();
        let loaded = store.load("eng_bachelors_cs").unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        assert!(store.load("never_written").is_none());
    }

    #[test]
    fn test_malformed_file_is_none() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());

        std::fs::write(dir.path().join("bad.csv"), "name,sectionNo\nonly_one_field\n").unwrap();
        assert!(store.load("bad").is_none());

        std::fs::write(dir.path().join("unbalanced.csv"), "name\n\"open quote\n").unwrap();
        assert!(store.load("unbalanced").is_none());
    }

    #[test]
    fn test_empty_file_is_none() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        std::fs::write(dir.path().join("empty.csv"), "").unwrap();
        assert!(store.load("empty").is_none());
    }

    #[test]
    fn test_header_only_round_trips_as_empty_set() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());

        let set = RecordSet::new(vec!["name".to_string(), "status".to_string()]);
        store.save("empty_dataset", &set).unwrap();
        let loaded = store.load("empty_dataset").unwrap();
        assert!(loaded.is_empty());
        assert_eq!(loaded.schema(), set.schema());
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        store.save("clean", &sample_set()).unwrap();

        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map(|x| x == "tmp").unwrap_or(false))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_save_replaces_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());

        store.save("replaced", &sample_set()).unwrap();
        let smaller = RecordSet::new(vec!["name".to_string()]);
        store.save("replaced", &smaller).unwrap();

        let loaded = store.load("replaced").unwrap();
        assert!(loaded.is_empty());
        assert_eq!(loaded.schema(), smaller.schema());
    }

    #[test]
    fn test_crlf_content_parses() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        std::fs::write(
            dir.path().join("crlf.csv"),
            "name,status\r\nCS101,1\r\n",
        )
        .unwrap();
        let loaded = store.load("crlf").unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.records()[0].get("status"), "1");
    }
}
