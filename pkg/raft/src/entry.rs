//! The log data model: an immutable `Entry` and the append-mostly `Log`
//! that stores them, sentinel included.

use serde::{Deserialize, Serialize};

/// An immutable `{term, value}` pair. Index 0 of every log holds the
/// sentinel `Entry { term: 0, value: 0 }`, which is never overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub term: u64,
    pub value: i64,
}

impl Entry {
    pub const SENTINEL: Entry = Entry { term: 0, value: 0 };

    pub fn is_sentinel(&self) -> bool {
        *self == Self::SENTINEL
    }
}

impl Default for Entry {
    fn default() -> Self {
        Self::SENTINEL
    }
}

/// An append-mostly ordered sequence of `Entry`, indexed from 0.
///
/// Index 0 is always the sentinel; this is established at construction and
/// preserved by `truncate_to` (which refuses to drop below length 1).
#[derive(Debug, Clone)]
pub struct Log {
    entries: Vec<Entry>,
}

impl Log {
    /// A fresh log containing only the sentinel at index 0.
    pub fn new() -> Self {
        Log {
            entries: vec![Entry::SENTINEL],
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Index of the last entry in the log (always ≥ 0, since the sentinel
    /// is never removed).
    pub fn last_index(&self) -> usize {
        self.entries.len() - 1
    }

    pub fn last_term(&self) -> u64 {
        self.entries[self.last_index()].term
    }

    pub fn get(&self, index: usize) -> Option<Entry> {
        self.entries.get(index).copied()
    }

    /// Appends `entry` at `index`, extending the log by exactly one slot if
    /// `index == len()`, then truncates to length `index + 1`. This is the
    /// one primitive the AppendEntries handler needs: place one entry and
    /// drop any conflicting suffix in a single step.
    pub fn set_and_truncate(&mut self, index: usize, entry: Entry) {
        if index == self.entries.len() {
            self.entries.push(entry);
        } else {
            self.entries[index] = entry;
        }
        self.entries.truncate(index + 1);
    }

    /// Appends a new entry at the end of the log, returning its index.
    pub fn append(&mut self, entry: Entry) -> usize {
        self.entries.push(entry);
        self.last_index()
    }

    pub fn as_slice(&self) -> &[Entry] {
        &self.entries
    }
}

impl Default for Log {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_log_has_only_sentinel() {
        let log = Log::new();
        assert_eq!(log.len(), 1);
        assert_eq!(log.get(0), Some(Entry::SENTINEL));
    }

    #[test]
    fn append_extends_length() {
        let mut log = Log::new();
        let idx = log.append(Entry { term: 1, value: 7 });
        assert_eq!(idx, 1);
        assert_eq!(log.len(), 2);
        assert_eq!(log.get(1), Some(Entry { term: 1, value: 7 }));
    }

    #[test]
    fn set_and_truncate_drops_conflicting_suffix() {
        let mut log = Log::new();
        log.append(Entry { term: 1, value: 1 });
        log.append(Entry { term: 1, value: 2 });
        log.append(Entry { term: 1, value: 3 });
        assert_eq!(log.len(), 4);

        // A leader overwrites index 1 with a newer-term entry; indices 2,3
        // are conflicting suffix and must be dropped.
        log.set_and_truncate(1, Entry { term: 2, value: 99 });
        assert_eq!(log.len(), 2);
        assert_eq!(log.get(1), Some(Entry { term: 2, value: 99 }));
    }

    #[test]
    fn set_and_truncate_extends_by_one_slot() {
        let mut log = Log::new();
        log.set_and_truncate(1, Entry { term: 1, value: 5 });
        assert_eq!(log.len(), 2);
    }
}
