//! Derived ranking cache
//!
//! The ranking is a materialized ordering of document records by click
//! count, descending. It is derived state, never authoritative: the
//! registry invalidates it inside every mutation's critical section and
//! it is rebuilt lazily on the next read (or eagerly by the update
//! poller). The cache itself carries no lock; it lives inside the
//! registry's guarded table state.

use crate::types::DocumentRecord;

/// Invalidate-on-write cache of the full click ranking
#[derive(Debug, Default)]
pub struct RankingCache {
    entries: Vec<DocumentRecord>,
    valid: bool,
}

impl RankingCache {
    /// Create an empty, invalid cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the cache stale. Called whenever any record is created,
    /// deleted, or has its clicks/name/content changed.
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// Whether the cached ordering still reflects the table
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Rebuild the ordering from the live records.
    ///
    /// Full O(n log n) materialization: clicks descending, ties broken
    /// by ascending id so repeated reads are reproducible. The unstable
    /// sort is fine because ids are unique, making the comparator total.
    pub fn rebuild<'a>(&mut self, records: impl Iterator<Item = &'a DocumentRecord>) {
        let mut entries: Vec<DocumentRecord> = records.cloned().collect();
        entries.sort_unstable_by(|a, b| b.clicks.cmp(&a.clicks).then_with(|| a.id.cmp(&b.id)));
        self.entries = entries;
        self.valid = true;
    }

    /// Independent copy of the cached ordering
    pub fn snapshot(&self) -> Vec<DocumentRecord> {
        self.entries.clone()
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cached ordering is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
