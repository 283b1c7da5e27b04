// ============================================================================
// src/executor/sort.rs - Record ordering
// ============================================================================
//
// Multi-key comparison of records by sort descriptors, applied left to
// right. Values are compared with `Value::total_cmp`, so NULL / missing
// fields come last for ascending keys and first for descending keys.
// Records equal under every descriptor keep store order (ascending
// sequence), which makes the order total and the sort stable.
//
// ============================================================================

use crate::core::SortDescriptor;
use crate::entity::Record;
use std::cmp::Ordering;

/// Comparator for records based on a list of sort descriptors.
pub struct RecordComparator<'a> {
    descriptors: &'a [SortDescriptor],
}

impl<'a> RecordComparator<'a> {
    pub fn new(descriptors: &'a [SortDescriptor]) -> Self {
        Self { descriptors }
    }

    /// Compares by descriptors only; equal records stay `Equal`.
    pub fn compare_keys(&self, left: &Record, right: &Record) -> Ordering {
        for descriptor in self.descriptors {
            let ordering = left
                .value(descriptor.key())
                .total_cmp(&right.value(descriptor.key()));
            let ordering = if descriptor.is_ascending() {
                ordering
            } else {
                ordering.reverse()
            };

            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Total order: descriptors first, then store order.
    pub fn compare(&self, left: &Record, right: &Record) -> Ordering {
        self.compare_keys(left, right)
            .then_with(|| left.sequence().cmp(&right.sequence()))
    }
}

pub struct SortExecutor;

impl SortExecutor {
    /// Sorts records in place: store order first, then a stable sort by the
    /// descriptors.
    pub fn sort<R: AsRef<Record>>(records: &mut [R], descriptors: &[SortDescriptor]) {
        if records.len() < 2 {
            return;
        }

        let comparator = RecordComparator::new(descriptors);
        records.sort_by(|left, right| comparator.compare(left.as_ref(), right.as_ref()));
    }
}

impl AsRef<Record> for Record {
    fn as_ref(&self) -> &Record {
        self
    }
}
