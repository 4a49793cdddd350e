//! Ordered, id-keyed record accumulator.

use ledgersync_protocol::Record;
use std::collections::HashMap;

/// Outcome of merging one page into the accumulator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Records merged (newly inserted or overwritten).
    pub merged: usize,
    /// Records dropped for lack of a usable id.
    pub dropped: usize,
}

/// An insertion-ordered map from record id to record.
///
/// A later arrival overwrites an earlier record with the same id while
/// keeping the first-seen position, so snapshots stay deterministic when
/// shifting page boundaries deliver a record twice.
#[derive(Debug, Default)]
pub struct RecordSet {
    records: Vec<Record>,
    index: HashMap<String, usize>,
}

impl RecordSet {
    /// Creates an empty record set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of unique records accumulated.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no records have been accumulated.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Removes all records.
    pub fn clear(&mut self) {
        self.records.clear();
        self.index.clear();
    }

    /// Returns the record stored under `id`, if any.
    pub fn get(&self, id: &str) -> Option<&Record> {
        self.index.get(id).map(|&pos| &self.records[pos])
    }

    /// Inserts one record under `id`, overwriting any earlier record with
    /// the same id in place.
    pub fn insert(&mut self, id: String, record: Record) {
        match self.index.get(&id) {
            Some(&pos) => self.records[pos] = record,
            None => {
                self.index.insert(id, self.records.len());
                self.records.push(record);
            }
        }
    }

    /// Merges one page of records, dropping those without a usable id.
    pub fn merge_page(&mut self, items: Vec<Record>) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        for item in items {
            match item.id() {
                Some(id) => {
                    self.insert(id, item);
                    outcome.merged += 1;
                }
                None => outcome.dropped += 1,
            }
        }
        outcome
    }

    /// Returns an owned copy of the accumulated records in first-seen order.
    pub fn snapshot(&self) -> Vec<Record> {
        self.records.clone()
    }
}
