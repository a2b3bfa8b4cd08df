/// Snapshot change detection: canonicalization plus the diff engine
mod engine;
mod normalize;
mod types;

pub use engine::{compute_diff, DiffError, KeySelector};
pub use normalize::{normalize_raw, normalize_records, EXPECTED_FIELDS};
pub use types::{ChangeSet, FieldDiff, Record, RecordKey, RecordSet, NAME_FIELD, SECTION_FIELD};
