// LogWeave - sources/merged/index.rs
//
// Sorted index of a merged source.
//
// One `MergedLineIndex` per visible row, ordered by (timestamp, source id).
// Rows of one source keep their relative order. Every mutation reports the
// lowest position it touched to a `MergeChanges` tracker and renumbers the
// merged entry indices from that position on.

use super::changes::MergeChanges;
use crate::core::model::{EntryIndex, SourceId};
use chrono::{DateTime, Utc};

/// One row of the merged source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergedLineIndex {
    pub source_id: SourceId,
    /// Row within the owning source.
    pub source_line_index: usize,
    /// Entry index reported by the owning source.
    pub original_entry_index: EntryIndex,
    /// Entry index within the merged source.
    pub merged_entry_index: EntryIndex,
    pub timestamp: DateTime<Utc>,
}

impl MergedLineIndex {
    pub fn new(
        source_id: SourceId,
        source_line_index: usize,
        original_entry_index: EntryIndex,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            source_id,
            source_line_index,
            original_entry_index,
            merged_entry_index: EntryIndex::INVALID,
            timestamp,
        }
    }

    fn sort_key(&self) -> (DateTime<Utc>, SourceId) {
        (self.timestamp, self.source_id)
    }

    /// Whether `self` continues the entry `previous` belongs to.
    fn same_entry_as(&self, previous: &MergedLineIndex) -> bool {
        self.source_id == previous.source_id
            && self.original_entry_index.is_valid()
            && self.original_entry_index == previous.original_entry_index
    }
}

#[derive(Debug, Default)]
pub struct MergedIndex {
    rows: Vec<MergedLineIndex>,
}

impl MergedIndex {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&MergedLineIndex> {
        self.rows.get(position)
    }

    pub fn rows(&self) -> &[MergedLineIndex] {
        &self.rows
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    /// Drops every row of `source`.
    pub fn reset_source(&mut self, source: SourceId, changes: &mut MergeChanges) {
        self.remove_where(changes, |row| row.source_id == source);
    }

    /// Drops the rows of `source` at or after `first` (an index within that
    /// source).
    pub fn remove_from(&mut self, source: SourceId, first: usize, changes: &mut MergeChanges) {
        self.remove_where(changes, |row| {
            row.source_id == source && row.source_line_index >= first
        });
    }

    fn remove_where<F>(&mut self, changes: &mut MergeChanges, predicate: F)
    where
        F: Fn(&MergedLineIndex) -> bool,
    {
        let Some(lowest) = self.rows.iter().position(&predicate) else {
            return;
        };
        self.rows.retain(|row| !predicate(row));
        changes.touch(lowest);
        self.renumber_from(lowest);
    }

    /// Inserts `incoming` keeping the index sorted.
    ///
    /// `incoming` is stably sorted first; each row then lands after every
    /// existing row with an equal key, as if inserted one by one at the
    /// upper bound of its key.
    pub fn append(&mut self, mut incoming: Vec<MergedLineIndex>, changes: &mut MergeChanges) {
        if incoming.is_empty() {
            return;
        }
        incoming.sort_by_key(MergedLineIndex::sort_key);

        let first_key = incoming[0].sort_key();
        let start = self.rows.partition_point(|row| row.sort_key() <= first_key);
        let tail = self.rows.split_off(start);
        self.rows.reserve(tail.len() + incoming.len());

        let mut tail = tail.into_iter().peekable();
        let mut incoming = incoming.into_iter().peekable();
        loop {
            let take_incoming = match (tail.peek(), incoming.peek()) {
                (Some(existing), Some(new)) => new.sort_key() < existing.sort_key(),
                (None, Some(_)) => true,
                (Some(_), None) => false,
                (None, None) => break,
            };
            let next = if take_incoming {
                incoming.next()
            } else {
                tail.next()
            };
            self.rows.extend(next);
        }

        changes.touch(start);
        self.renumber_from(start);
    }

    /// Recomputes merged entry indices for every row at or after `position`.
    fn renumber_from(&mut self, position: usize) {
        for i in position..self.rows.len() {
            let merged = match i.checked_sub(1).map(|p| self.rows[p]) {
                None => EntryIndex::new(0),
                Some(previous) if self.rows[i].same_entry_as(&previous) => {
                    previous.merged_entry_index
                }
                Some(previous) => previous.merged_entry_index.next(),
            };
            self.rows[i].merged_entry_index = merged;
        }
    }
}
