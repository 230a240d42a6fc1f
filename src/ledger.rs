//! Per-user ledger of every job id ever applied to.
//!
//! Loaded from history at session start, consulted before every
//! candidate, and written back whole when the session finalizes. Ids
//! are opaque text and never expire.

use std::collections::{BTreeSet, HashSet};

#[derive(Debug, Default)]
pub struct Ledger {
    ids: HashSet<String>,
}

impl Ledger {
    pub fn from_ids<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    pub fn is_known(&self, job_id: &str) -> bool {
        self.ids.contains(job_id)
    }

    /// Records an application. Idempotent: recording an id twice leaves
    /// one entry. Returns whether the id was new.
    pub fn record(&mut self, job_id: impl Into<String>) -> bool {
        self.ids.insert(job_id.into())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Sorted snapshot for the persisted history document.
    pub fn to_sorted(&self) -> BTreeSet<String> {
        self.ids.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_twice_keeps_one_entry() {
        let mut ledger = Ledger::default();
        assert!(ledger.is_empty());
        assert!(ledger.record("job-1"));
        assert!(!ledger.record("job-1"));
        assert_eq!(ledger.len(), 1);
        assert!(!ledger.is_empty());
        assert!(ledger.is_known("job-1"));
    }

    #[test]
    fn loads_existing_ids_and_exports_sorted() {
        let mut ledger = Ledger::from_ids(["b".to_string(), "a".to_string()]);
        ledger.record("c");

        let sorted: Vec<_> = ledger.to_sorted().into_iter().collect();
        assert_eq!(sorted, vec!["a", "b", "c"]);
    }

    #[test]
    fn unknown_ids_are_not_known() {
        let ledger = Ledger::from_ids(["x".to_string()]);
        assert!(!ledger.is_known("y"));
    }
}
