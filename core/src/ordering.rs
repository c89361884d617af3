//! Display ordering of files within an item
//!
//! Files are ordered by SeriesNumber, InstanceNumber and SliceLocation, then
//! by name, then by id. A missing ordering tag sorts before any present
//! value, so files without DICOM positions group at the front by name.

use crate::types::FileDisplayRecord;
use std::cmp::Ordering;

/// Compares two records for display order
///
/// The order is total: two records compare equal only if every field is
/// equal.
pub fn compare(a: &FileDisplayRecord, b: &FileDisplayRecord) -> Ordering {
    a.series_number
        .cmp(&b.series_number)
        .then_with(|| a.instance_number.cmp(&b.instance_number))
        .then_with(|| a.slice_location.cmp(&b.slice_location))
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.id.cmp(&b.id))
}

/// Sorts records into display order
pub fn sort_records(records: &mut [FileDisplayRecord]) {
    records.sort_by(compare);
}

/// Inserts a record at its sorted position
///
/// A record with the same id is replaced rather than duplicated. The slice
/// is expected to be sorted already.
pub fn insert_sorted(records: &mut Vec<FileDisplayRecord>, record: FileDisplayRecord) {
    records.retain(|existing| existing.id != record.id);
    let position = records.partition_point(|existing| compare(existing, &record) == Ordering::Less);
    records.insert(position, record);
}

impl PartialOrd for FileDisplayRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FileDisplayRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(self, other)
    }
}
