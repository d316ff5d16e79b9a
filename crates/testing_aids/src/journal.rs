// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// A shared, ordered record of events, used to assert on the order in which callbacks ran.
///
/// Clones share the same record, so a test can hand one clone to the code under test (for
/// example through a wirelet) and inspect another.
#[derive(Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    /// A copy of all entries in the order they were recorded.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Position of the first entry equal to `entry`.
    ///
    /// # Panics
    ///
    /// Panics if no such entry was recorded.
    #[must_use]
    pub fn position(&self, entry: &str) -> usize {
        let entries = self.entries.lock();
        entries
            .iter()
            .position(|recorded| recorded == entry)
            .unwrap_or_else(|| panic!("entry '{entry}' not recorded, got {entries:?}"))
    }

    /// Asserts that `first` was recorded before `second`.
    ///
    /// # Panics
    ///
    /// Panics if either entry is missing or they were recorded the other way around.
    pub fn assert_before(&self, first: &str, second: &str) {
        let (a, b) = (self.position(first), self.position(second));
        assert!(a < b, "expected '{first}' before '{second}', got {:?}", self.entries());
    }

    /// Number of entries equal to `entry`.
    #[must_use]
    pub fn count(&self, entry: &str) -> usize {
        self.entries.lock().iter().filter(|recorded| *recorded == entry).count()
    }
}

impl fmt::Debug for Journal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.lock().iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_entries() {
        let journal = Journal::new();
        let clone = journal.clone();

        journal.record("a");
        clone.record("b");
        clone.record("a");

        assert_eq!(journal.entries(), ["a", "b", "a"]);
        assert_eq!(journal.count("a"), 2);
        journal.assert_before("a", "b");
    }

    #[test]
    #[should_panic]
    fn missing_entry_panics() {
        let _ = Journal::new().position("nothing");
    }
}
