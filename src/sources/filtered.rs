// LogWeave - sources/filtered.rs
//
// Filtering transform.
//
// Exposes only the rows of logical entries that pass the configured
// predicates. Filtering is entry-granular: an entry is retained when at
// least one of its rows passes the line filter (if any) and the entry as a
// whole passes the entry filter (if any); a retained entry keeps all of its
// rows. Retained entries are renumbered 0, 1, 2, ... without gaps.
//
// State:
//   - `index` (shared with readers): filtered row -> (original row,
//     renumbered entry);
//   - `progress` (tick only): how far the upstream has been read and the
//     rows of the entry currently being read ("pending entry").
//
// The pending entry cannot be judged for good until a row of the next
// entry arrives. When the upstream has nothing more to offer it is judged
// provisionally; later rows of the same entry then either extend the
// retained rows or withdraw them.

use crate::core::column::{self, Column, Value};
use crate::core::filter::{LogEntryFilter, LogLineFilter};
use crate::core::model::{EntryIndex, LineIndex, LogEntry, Percentage, Properties};
use crate::core::modification::{Modification, Section};
use crate::core::scheduler::TaskScheduler;
use crate::core::source::{LogSource, LogSourceExt, LogSourceListener};
use crate::sources::base::{ProcessingSource, SourceBase};
use crate::sources::{PendingModifications, SourceOptions};
use crate::util::constants::{ENTRY_START_SEARCH_CHUNK, FILTER_READ_CHUNK_SIZE};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FilteredRow {
    original: usize,
    entry: EntryIndex,
}

#[derive(Default)]
struct FilterIndex {
    rows: Vec<FilteredRow>,
}

impl FilterIndex {
    fn original(&self, index: LineIndex) -> LineIndex {
        index
            .within(self.rows.len())
            .map(|i| LineIndex::from(self.rows[i].original))
            .unwrap_or(LineIndex::INVALID)
    }
}

/// Rows of the entry currently being read.
struct PendingEntry {
    upstream_entry: EntryIndex,
    lines: Vec<(usize, LogEntry)>,
    /// How many of `lines` are already part of the index (always its tail).
    emitted: usize,
}

impl PendingEntry {
    fn new(emitted: usize) -> Self {
        Self {
            upstream_entry: EntryIndex::INVALID,
            lines: Vec::new(),
            emitted,
        }
    }

    /// Whether `entry` continues this pending entry.
    fn continues_with(&self, entry: EntryIndex) -> bool {
        self.lines.is_empty() || (entry.is_valid() && entry == self.upstream_entry)
    }
}

#[derive(Default)]
struct Progress {
    /// Rows the upstream is known to hold.
    full_count: usize,
    /// Next upstream row to read.
    current: usize,
    pending: Option<PendingEntry>,
}

pub struct FilteredLogSource {
    base: SourceBase,
    upstream: Arc<dyn LogSource>,
    line_filter: Option<Arc<dyn LogLineFilter>>,
    entry_filter: Option<Arc<dyn LogEntryFilter>>,
    pending: Arc<PendingModifications>,
    options: SourceOptions,
    index: Mutex<FilterIndex>,
    progress: Mutex<Progress>,
}

impl FilteredLogSource {
    pub fn new(
        scheduler: Arc<dyn TaskScheduler>,
        upstream: Arc<dyn LogSource>,
        line_filter: Option<Arc<dyn LogLineFilter>>,
        entry_filter: Option<Arc<dyn LogEntryFilter>>,
        options: SourceOptions,
    ) -> Arc<Self> {
        let source = Arc::new(Self {
            base: SourceBase::new(format!("filtered({})", upstream.name())),
            upstream,
            line_filter,
            entry_filter,
            pending: Arc::new(PendingModifications::new(options.batch_size)),
            options,
            index: Mutex::new(FilterIndex::default()),
            progress: Mutex::new(Progress::default()),
        });
        source.upstream.add_listener(
            source.pending.clone(),
            options.maximum_wait,
            options.batch_size,
        );
        SourceBase::start(&source, scheduler, options.maximum_wait);
        source
    }

    fn lock_index(&self) -> MutexGuard<'_, FilterIndex> {
        self.index.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Translates a row of the upstream into a row of this source, or
    /// `INVALID` if that row is not retained.
    pub fn line_index_of_original(&self, original: LineIndex) -> LineIndex {
        let Some(original) = original.get() else {
            return LineIndex::INVALID;
        };
        let index = self.lock_index();
        match index.rows.binary_search_by_key(&original, |r| r.original) {
            Ok(i) => LineIndex::from(i),
            Err(_) => LineIndex::INVALID,
        }
    }

    // -------------------------------------------------------------------------
    // Predicates
    // -------------------------------------------------------------------------

    fn guarded<F: FnOnce() -> bool>(&self, what: &'static str, predicate: F) -> bool {
        match catch_unwind(AssertUnwindSafe(predicate)) {
            Ok(passes) => passes,
            Err(_) => {
                tracing::error!(source = self.name(), what, "Filter panicked; rejecting");
                false
            }
        }
    }

    fn entry_passes(&self, lines: &[LogEntry]) -> bool {
        let line_ok = match &self.line_filter {
            None => true,
            Some(filter) => lines
                .iter()
                .any(|line| self.guarded("line filter", || filter.passes_line(line))),
        };
        line_ok
            && match &self.entry_filter {
                None => true,
                Some(filter) => self.guarded("entry filter", || filter.passes_entry(lines)),
            }
    }

    /// Judges `pending` and brings the index in line with the verdict.
    fn evaluate(&self, pending: &mut PendingEntry) {
        let lines: Vec<LogEntry> = pending.lines.iter().map(|(_, l)| l.clone()).collect();
        let passes = !lines.is_empty() && self.entry_passes(&lines);

        let mut removed_from = None;
        {
            let mut index = self.lock_index();
            if pending.emitted > pending.lines.len() || (!passes && pending.emitted > 0) {
                let keep = index.rows.len().saturating_sub(pending.emitted);
                index.rows.truncate(keep);
                pending.emitted = 0;
                removed_from = Some(keep);
            }
            if passes {
                let entry = if pending.emitted > 0 {
                    index.rows.last().map(|r| r.entry)
                } else {
                    index.rows.last().map(|r| r.entry.next())
                }
                .unwrap_or(EntryIndex::new(0));
                for (original, _) in &pending.lines[pending.emitted..] {
                    index.rows.push(FilteredRow {
                        original: *original,
                        entry,
                    });
                }
                pending.emitted = pending.lines.len();
            }
        }
        if let Some(first) = removed_from {
            self.base.listeners().remove(self, first);
        }
    }

    // -------------------------------------------------------------------------
    // Modifications
    // -------------------------------------------------------------------------

    fn clear(&self, progress: &mut Progress) {
        *progress = Progress::default();
        self.lock_index().rows.clear();
        self.base.listeners().reset(self);
    }

    /// First row of the upstream entry containing `row`.
    fn entry_start(&self, row: usize, progress: &Progress) -> usize {
        if let Some(first) = progress
            .pending
            .as_ref()
            .and_then(|p| p.lines.first())
            .map(|(original, _)| *original)
            .filter(|first| *first <= row)
        {
            return first;
        }

        let entry = self
            .upstream
            .values(&[LineIndex::from(row)], &column::LOG_ENTRY_INDEX)
            .first()
            .and_then(Value::as_entry)
            .unwrap_or(EntryIndex::INVALID);
        if !entry.is_valid() {
            return row;
        }
        let mut start = row;
        while start > 0 {
            let lower = start.saturating_sub(ENTRY_START_SEARCH_CHUNK);
            let entries = self
                .upstream
                .section_values(Section::new(lower, start - lower), &column::LOG_ENTRY_INDEX);
            match entries.iter().rposition(|v| v.as_entry() != Some(entry)) {
                Some(offset) => return lower + offset + 1,
                None => start = lower,
            }
        }
        0
    }

    fn invalidate(&self, first: usize, progress: &mut Progress) {
        let (cut, removed) = {
            let mut index = self.lock_index();
            let cut = index.rows.partition_point(|r| r.original < first);
            let removed = index.rows.len() - cut;
            index.rows.truncate(cut);
            (cut, removed)
        };
        if removed > 0 {
            tracing::debug!(source = self.name(), first, removed, "Upstream invalidated rows");
            self.base.listeners().remove(self, cut);
        }

        progress.full_count = progress.full_count.min(first);
        if first >= progress.current {
            // Nothing at or after `first` was read yet.
            return;
        }

        // The entry containing `first - 1` may continue past the cut; read it
        // again from its first row.
        let resume = if first == 0 {
            0
        } else {
            self.entry_start(first - 1, progress)
        };
        let emitted = {
            let index = self.lock_index();
            index.rows.len() - index.rows.partition_point(|r| r.original < resume)
        };
        progress.current = resume;
        progress.pending = (emitted > 0).then(|| PendingEntry::new(emitted));
    }

    fn appended(&self, start: usize, count: usize, progress: &mut Progress) {
        if start > progress.full_count {
            tracing::warn!(
                source = self.name(),
                start,
                known = progress.full_count,
                "Ignoring append beyond the known row count"
            );
            return;
        }
        progress.full_count = progress.full_count.max(start + count);
    }

    /// Reads and judges up to `budget` upstream rows. Returns the number of
    /// rows read.
    fn read_rows(&self, budget: usize, progress: &mut Progress) -> usize {
        let columns = self.upstream.columns();
        let mut read = 0;
        while read < budget && progress.current < progress.full_count {
            let start = progress.current;
            let end = progress
                .full_count
                .min(start + FILTER_READ_CHUNK_SIZE.min(budget - read));
            let rows = self
                .upstream
                .section_entries(Section::new(start, end - start), &columns)
                .entries();

            for (offset, row) in rows.into_iter().enumerate() {
                let original = start + offset;
                let entry = row.entry_index();
                let continues = progress
                    .pending
                    .as_ref()
                    .map_or(false, |p| p.continues_with(entry));
                if !continues {
                    if let Some(mut finished) = progress.pending.take() {
                        self.evaluate(&mut finished);
                    }
                    progress.pending = Some(PendingEntry::new(0));
                }
                if let Some(pending) = progress.pending.as_mut() {
                    if pending.lines.is_empty() {
                        pending.upstream_entry = entry;
                    }
                    pending.lines.push((original, row));
                }
            }

            read += end - start;
            progress.current = end;
        }

        // Nothing more to read for now: judge the last entry provisionally.
        if progress.current >= progress.full_count {
            if let Some(pending) = progress.pending.as_mut() {
                if !pending.lines.is_empty() {
                    self.evaluate(pending);
                }
            }
        }
        read
    }

    fn update_properties(&self, progress: &Progress) -> Properties {
        let upstream = self.upstream.properties();
        let queued = self.pending.pending_lines();
        let own = if self.pending.is_empty() && progress.current >= progress.full_count {
            Percentage::HUNDRED
        } else {
            Percentage::of(
                progress.current,
                progress.full_count.max(progress.current) + queued.max(1),
            )
        };
        Properties {
            log_entry_count: self.lock_index().rows.len(),
            percentage_processed: upstream.percentage_processed * own,
            ..upstream
        }
    }
}

impl ProcessingSource for FilteredLogSource {
    fn base(&self) -> &SourceBase {
        &self.base
    }

    fn tick(&self) -> Duration {
        let mut progress = self.progress.lock().unwrap_or_else(|p| p.into_inner());

        let modifications = self.pending.take_all();
        let performed_work = !modifications.is_empty();
        for modification in modifications {
            if self.base.is_disposed() {
                return self.options.maximum_wait;
            }
            match modification {
                Modification::Reset => self.clear(&mut progress),
                Modification::Removed(section) => self.invalidate(section.start(), &mut progress),
                Modification::Appended(section) => {
                    self.appended(section.start(), section.count, &mut progress)
                }
            }
        }

        let read = self.read_rows(self.options.max_lines_per_tick, &mut progress);
        let count = self.lock_index().rows.len();
        self.base.listeners().on_read(self, count);
        let properties = self.update_properties(&progress);
        self.base.publish(self, properties);

        if performed_work || progress.current < progress.full_count {
            tracing::trace!(source = self.name(), read, retained = count, "Filter tick");
            Duration::ZERO
        } else {
            self.options.maximum_wait
        }
    }
}

impl LogSource for FilteredLogSource {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn columns(&self) -> Vec<Column> {
        self.upstream.columns()
    }

    fn properties(&self) -> Properties {
        self.base.properties()
    }

    fn get_column(&self, indices: &[LineIndex], column: &Column, dest: &mut [Value]) {
        let computed = *column == column::INDEX
            || *column == column::ORIGINAL_INDEX
            || *column == column::LOG_ENTRY_INDEX
            || *column == column::LINE_NUMBER
            || *column == column::ORIGINAL_LINE_NUMBER;
        if computed {
            let index = self.lock_index();
            for (slot, &i) in dest.iter_mut().zip(indices) {
                *slot = match i.within(index.rows.len()) {
                    None => column.default_value().clone(),
                    Some(row) => {
                        let FilteredRow { original, entry } = index.rows[row];
                        if *column == column::INDEX {
                            Value::Line(i)
                        } else if *column == column::ORIGINAL_INDEX {
                            Value::Line(LineIndex::from(original))
                        } else if *column == column::LOG_ENTRY_INDEX {
                            Value::Entry(entry)
                        } else if *column == column::LINE_NUMBER {
                            Value::Int(row as i64 + 1)
                        } else {
                            Value::Int(original as i64 + 1)
                        }
                    }
                };
            }
            return;
        }

        if *column == column::DELTA_TIME {
            let (current, previous): (Vec<LineIndex>, Vec<LineIndex>) = {
                let index = self.lock_index();
                indices
                    .iter()
                    .map(|&i| (index.original(i), index.original(i - 1)))
                    .unzip()
            };
            let current = self.upstream.values(&current, &column::TIMESTAMP);
            let previous = self.upstream.values(&previous, &column::TIMESTAMP);
            for ((slot, now), before) in dest.iter_mut().zip(&current).zip(&previous) {
                *slot = Value::Duration(
                    now.as_timestamp()
                        .zip(before.as_timestamp())
                        .map(|(now, before)| now - before),
                );
            }
            return;
        }

        let originals: Vec<LineIndex> = {
            let index = self.lock_index();
            indices.iter().map(|&i| index.original(i)).collect()
        };
        self.upstream.get_column(&originals, column, dest);
    }

    fn add_listener(
        &self,
        listener: Arc<dyn LogSourceListener>,
        maximum_wait: Duration,
        maximum_batch: usize,
    ) {
        self.base
            .add_listener(self, listener, maximum_wait, maximum_batch);
    }

    fn remove_listener(&self, listener: &Arc<dyn LogSourceListener>) {
        self.base.remove_listener(listener);
    }

    fn dispose(&self) {
        self.base.dispose(|| {
            let handle: Arc<dyn LogSourceListener> = self.pending.clone();
            self.upstream.remove_listener(&handle);
            self.pending.clear();
            self.lock_index().rows.clear();
        });
    }
}

impl Drop for FilteredLogSource {
    fn drop(&mut self) {
        self.dispose();
    }
}
