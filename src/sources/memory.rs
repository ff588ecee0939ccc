// LogWeave - sources/memory.rs
//
// In-memory producer source.
//
// Rows are added, truncated or cleared through `&self` methods from any
// thread. The source has no backlog of its own: it is always 100%
// processed and flushes its listeners after every mutation.
//
// INDEX, ORIGINAL_INDEX, LINE_NUMBER, ORIGINAL_LINE_NUMBER, LOG_ENTRY_INDEX,
// ELAPSED_TIME and DELTA_TIME are computed; every other column is stored
// as given.
//
// Mutations queue their notifications while the state lock is held, so
// listeners see them in the order they were applied, and deliver them once
// it has been released. A listener may therefore call back into the source.

use crate::core::column::{self, Column, Value};
use crate::core::model::{
    EmptyReason, EntryIndex, LineIndex, LogEntry, Percentage, Properties,
};
use crate::core::source::{LogSource, LogSourceListener};
use crate::sources::base::SourceBase;
use crate::sources::listeners::ListenerCollection;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

struct StoredRow {
    entry_index: EntryIndex,
    values: LogEntry,
}

/// Timestamp range and widest line over the stored rows.
#[derive(Default)]
struct RowStats {
    /// Timestamp of the first row that has one; ELAPSED_TIME is relative to it.
    first: Option<DateTime<Utc>>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    max_characters: usize,
}

impl RowStats {
    fn include(&mut self, values: &LogEntry) {
        if let Some(ts) = values.timestamp() {
            self.first.get_or_insert(ts);
            self.start = Some(self.start.map_or(ts, |start| start.min(ts)));
            self.end = Some(self.end.map_or(ts, |end| end.max(ts)));
        }
        if let Some(raw) = values.raw_content() {
            self.max_characters = self.max_characters.max(raw.chars().count());
        }
    }
}

#[derive(Default)]
struct MemoryState {
    rows: Vec<StoredRow>,
    stats: RowStats,
    next_entry: usize,
    size: Option<u64>,
    last_modified: Option<DateTime<Utc>>,
    empty_reason: EmptyReason,
}

impl MemoryState {
    fn push(&mut self, entry_index: EntryIndex, values: LogEntry) {
        self.stats.include(&values);
        self.rows.push(StoredRow {
            entry_index,
            values,
        });
    }

    /// Keeps the first `len` rows. The statistics are rebuilt from the
    /// survivors.
    fn truncate(&mut self, len: usize) -> usize {
        let removed = self.rows.len().saturating_sub(len);
        if removed == 0 {
            return 0;
        }
        self.rows.truncate(len);
        self.stats = RowStats::default();
        for row in &self.rows {
            self.stats.include(&row.values);
        }
        self.next_entry = self
            .rows
            .last()
            .map(|r| r.entry_index.next().value() as usize)
            .unwrap_or(0);
        removed
    }

    fn clear(&mut self) {
        self.rows.clear();
        self.stats = RowStats::default();
        self.next_entry = 0;
    }

    fn properties(&self) -> Properties {
        let mut properties = Properties {
            log_entry_count: self.rows.len(),
            size: self.size,
            last_modified: self.last_modified,
            start_timestamp: self.stats.start,
            end_timestamp: self.stats.end,
            duration: None,
            percentage_processed: Percentage::HUNDRED,
            empty_reason: self.empty_reason,
            max_characters_per_line: self.stats.max_characters,
        };
        properties.update_duration();
        properties
    }

    fn timestamp_at(&self, index: usize) -> Option<DateTime<Utc>> {
        self.rows.get(index).and_then(|r| r.values.timestamp())
    }

    fn value(&self, index: LineIndex, column: &Column) -> Value {
        let Some(i) = index.within(self.rows.len()) else {
            return column.default_value().clone();
        };
        let row = &self.rows[i];
        if *column == column::INDEX || *column == column::ORIGINAL_INDEX {
            Value::Line(index)
        } else if *column == column::LINE_NUMBER || *column == column::ORIGINAL_LINE_NUMBER {
            Value::Int(i as i64 + 1)
        } else if *column == column::LOG_ENTRY_INDEX {
            Value::Entry(row.entry_index)
        } else if *column == column::ELAPSED_TIME {
            Value::Duration(
                row.values
                    .timestamp()
                    .zip(self.stats.first)
                    .map(|(ts, first)| ts - first),
            )
        } else if *column == column::DELTA_TIME {
            let previous = i.checked_sub(1).and_then(|p| self.timestamp_at(p));
            Value::Duration(row.values.timestamp().zip(previous).map(|(ts, p)| ts - p))
        } else {
            row.values.get(column).clone()
        }
    }
}

pub struct InMemoryLogSource {
    base: SourceBase,
    columns: Vec<Column>,
    state: Mutex<MemoryState>,
}

impl InMemoryLogSource {
    /// Creates an empty source exposing the minimum columns plus `extra`.
    pub fn new(name: impl Into<String>, extra: &[Column]) -> Arc<Self> {
        let source = Arc::new(Self {
            base: SourceBase::new(name),
            columns: column::combine_with_minimum(extra),
            state: Mutex::new(MemoryState::default()),
        });
        let properties = source.lock().properties();
        source.base.store_properties(properties);
        source
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Keeps only the values of declared columns whose type matches.
    fn sanitize(&self, entry: LogEntry) -> LogEntry {
        let mut clean = LogEntry::new();
        for column in entry.columns() {
            let Some(declared) = self.columns.iter().find(|c| *c == column) else {
                tracing::trace!(source = self.name(), column = %column, "Dropping undeclared column");
                continue;
            };
            let value = entry.get(column);
            if value.kind() != declared.kind() {
                tracing::warn!(
                    source = self.name(),
                    column = %column,
                    expected = ?declared.kind(),
                    actual = ?value.kind(),
                    "Value type mismatch; using column default"
                );
                continue;
            }
            clean.set(declared, value.clone());
        }
        clean
    }

    /// Applies `mutate` and queues its notifications with `record` under
    /// the state lock, then delivers them and publishes the new properties.
    fn mutate<R>(
        &self,
        mutate: impl FnOnce(&mut MemoryState) -> R,
        record: impl FnOnce(&ListenerCollection, &R, usize),
    ) -> R {
        let listeners = self.base.listeners();
        let result = {
            let mut state = self.lock();
            let result = mutate(&mut state);
            record(listeners, &result, state.rows.len());
            listeners.record_flush();
            result
        };
        listeners.deliver(self);
        // Published after delivery so a reader of the snapshot has already
        // been told about its rows. Taken under the state lock so concurrent
        // writers cannot publish out of order.
        let state = self.lock();
        self.base.store_properties(state.properties());
        result
    }

    /// Appends a single-line entry and returns its row index.
    pub fn add_entry(&self, entry: LogEntry) -> LineIndex {
        self.add_multiline_entry(vec![entry])
    }

    /// Appends several single-line entries.
    pub fn add_entries(&self, entries: impl IntoIterator<Item = LogEntry>) {
        let entries: Vec<LogEntry> = entries.into_iter().map(|e| self.sanitize(e)).collect();
        self.mutate(
            |state| {
                for values in entries {
                    let entry_index = EntryIndex::from(state.next_entry);
                    state.next_entry += 1;
                    state.push(entry_index, values);
                }
            },
            |listeners, _, count| listeners.record_read(count),
        );
    }

    /// Appends one logical entry spanning `lines` rows (sharing one entry
    /// index). Returns the index of its first row.
    pub fn add_multiline_entry(&self, lines: Vec<LogEntry>) -> LineIndex {
        let lines: Vec<LogEntry> = lines.into_iter().map(|e| self.sanitize(e)).collect();
        self.mutate(
            |state| {
                let first = LineIndex::from(state.rows.len());
                if lines.is_empty() {
                    return first;
                }
                let entry_index = EntryIndex::from(state.next_entry);
                state.next_entry += 1;
                for values in lines {
                    state.push(entry_index, values);
                }
                first
            },
            |listeners, _, count| listeners.record_read(count),
        )
    }

    /// Removes every row from `index` onward.
    pub fn remove_from(&self, index: usize) {
        self.mutate(
            |state| state.truncate(index),
            |listeners, removed, _| {
                if *removed > 0 {
                    listeners.record_remove(index);
                }
            },
        );
    }

    /// Removes every row.
    pub fn clear(&self) {
        self.mutate(MemoryState::clear, |listeners, _, _| listeners.record_reset());
    }

    pub fn set_size(&self, size: Option<u64>) {
        self.mutate(|state| state.size = size, |_, _, _| {});
    }

    pub fn set_last_modified(&self, last_modified: Option<DateTime<Utc>>) {
        self.mutate(|state| state.last_modified = last_modified, |_, _, _| {});
    }

    pub fn set_empty_reason(&self, reason: EmptyReason) {
        self.mutate(|state| state.empty_reason = reason, |_, _, _| {});
    }
}

impl LogSource for InMemoryLogSource {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn columns(&self) -> Vec<Column> {
        self.columns.clone()
    }

    fn properties(&self) -> Properties {
        self.base.properties()
    }

    fn get_column(&self, indices: &[LineIndex], column: &Column, dest: &mut [Value]) {
        let state = self.lock();
        for (slot, &index) in dest.iter_mut().zip(indices) {
            *slot = state.value(index, column);
        }
    }

    fn add_listener(
        &self,
        listener: Arc<dyn LogSourceListener>,
        maximum_wait: Duration,
        maximum_batch: usize,
    ) {
        if self.base.is_disposed() {
            tracing::debug!(source = self.name(), "Ignoring listener added after disposal");
            return;
        }
        let listeners = self.base.listeners();
        {
            // The catch-up count must match the rows a mutation last queued.
            let _state = self.lock();
            listeners.record_listener(listener, maximum_wait, maximum_batch);
            listeners.record_flush();
        }
        listeners.deliver(self);
    }

    fn remove_listener(&self, listener: &Arc<dyn LogSourceListener>) {
        self.base.remove_listener(listener);
    }

    fn dispose(&self) {
        self.base.dispose(|| {});
    }
}

impl Drop for InMemoryLogSource {
    fn drop(&mut self) {
        self.dispose();
    }
}
