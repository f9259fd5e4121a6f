use std::collections::HashSet;

use sweep_core::Record;

use crate::extract::{Extracted, RecordExtractor};

/// Identity-keyed, insertion-ordered record set.
#[derive(Debug, Default, Clone)]
pub struct RecordIndex {
    seen: HashSet<String>,
    records: Vec<Record>,
    skipped: usize,
    malformed: usize,
}

impl RecordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.seen.contains(identity)
    }

    /// Returns false when a record with the same identity is already present.
    pub fn insert(&mut self, record: Record) -> bool {
        if self.seen.contains(record.identity()) {
            return false;
        }
        self.seen.insert(record.identity().to_string());
        self.records.push(record);
        true
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// Non-data nodes seen across all passes (counted per observation).
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Structurally broken nodes seen across all passes (counted per observation).
    pub fn malformed(&self) -> usize {
        self.malformed
    }
}

/// Extracts every rendered node not yet in `index`; returns how many were added.
///
/// Safe to call repeatedly over the same window.
pub fn collect_visible<N, X>(nodes: &[N], extractor: &X, index: &mut RecordIndex) -> usize
where
    X: RecordExtractor<N> + ?Sized,
{
    let mut added = 0;
    for node in nodes {
        match extractor.extract(node) {
            Extracted::Record(record) => {
                if index.insert(record) {
                    added += 1;
                }
            }
            Extracted::Skip => index.skipped += 1,
            Extracted::Malformed(reason) => {
                sweep_logging::sweep_trace!("dropping malformed node: {}", reason);
                index.malformed += 1;
            }
        }
    }
    added
}
