/// Data model for snapshot comparison
use std::collections::BTreeMap;
use std::fmt;

/// Field holding the course name, the effective join key across snapshots.
pub const NAME_FIELD: &str = "name";

/// Field holding the section number, part of the display identity.
pub const SECTION_FIELD: &str = "sectionNo";

/// One course-section offering as a field → value map.
///
/// All values are strings; canonicalization happens in the normalizer, so
/// two records compare equal exactly when they carry the same data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Record {
    fields: BTreeMap<String, String>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value for a field, or the empty string when absent.
    pub fn get(&self, field: &str) -> &str {
        self.fields.get(field).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Display identity of this record: (course name, section number).
    pub fn key(&self) -> RecordKey {
        RecordKey {
            name: self.get(NAME_FIELD).to_string(),
            section: self.get(SECTION_FIELD).to_string(),
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut record = Record::new();
        for (field, value) in iter {
            record.set(field, value);
        }
        record
    }
}

/// An ordered sequence of records sharing one schema, representing one
/// dataset at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSet {
    schema: Vec<String>,
    records: Vec<Record>,
}

impl RecordSet {
    pub fn new(schema: Vec<String>) -> Self {
        Self {
            schema,
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    /// The field list, in column order.
    pub fn schema(&self) -> &[String] {
        &self.schema
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// The natural identity of a record: (course name, section number).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordKey {
    pub name: String,
    pub section: String,
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.section)
    }
}

/// A single changed field on a record present in both snapshots.
///
/// Invariant: `previous` and `current` differ after normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDiff {
    pub key: RecordKey,
    pub field: String,
    pub previous: String,
    pub current: String,
}

/// Structured diff of two record sets. Produced fresh per comparison and
/// never mutated after being returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: Vec<Record>,
    pub removed: Vec<Record>,
    pub modified: Vec<FieldDiff>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// Total number of change events (one notification each).
    pub fn change_count(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len()
    }
}
