// LogWeave - sources/merged/source.rs
//
// Chronological merge of several sources.
//
// Each upstream is registered with a small listener that tags its
// modifications with the upstream's `SourceId` (its position in the list
// given at construction). Per tick the merge drains a bounded batch of
// tagged modifications, reads the rows it needs from the upstreams without
// holding its own lock, then applies the batch to the `MergedIndex`:
// resets first, then removals, then appends. Rows without a timestamp are
// never merged.

use super::changes::MergeChanges;
use super::index::{MergedIndex, MergedLineIndex};
use crate::core::column::{self, Column, Value};
use crate::core::model::{
    EmptyReason, EntryIndex, LineIndex, Percentage, Properties, SourceId,
};
use crate::core::modification::Modification;
use crate::core::scheduler::TaskScheduler;
use crate::core::source::{LogSource, LogSourceExt, LogSourceListener};
use crate::sources::base::{ProcessingSource, SourceBase};
use crate::sources::SourceOptions;
use crate::util::constants::{MAX_MERGED_SOURCES, MERGE_BATCH_SIZE_PER_SOURCE};
use crate::util::error::SourceError;
use std::collections::VecDeque;
use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

// =============================================================================
// Modification queue
// =============================================================================

#[derive(Default)]
struct MergeQueue {
    items: Mutex<VecDeque<(SourceId, Modification)>>,
}

impl MergeQueue {
    fn lock(&self) -> MutexGuard<'_, VecDeque<(SourceId, Modification)>> {
        self.items.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn push(&self, source: SourceId, modification: Modification) {
        self.lock().extend(
            modification
                .split(MERGE_BATCH_SIZE_PER_SOURCE)
                .into_iter()
                .map(|m| (source, m)),
        );
    }

    /// Takes queued modifications until about `budget` appended rows are
    /// collected (at least one modification is always taken).
    fn take_batch(&self, budget: usize) -> Vec<(SourceId, Modification)> {
        let mut batch = Vec::new();
        let mut lines = 0;
        {
            let mut items = self.lock();
            while let Some((_, front)) = items.front() {
                let count = appended_lines(front);
                if !batch.is_empty() && lines + count > budget {
                    break;
                }
                lines += count;
                batch.extend(items.pop_front());
            }
        }
        drop_superseded(batch)
    }

    fn pending_lines(&self) -> usize {
        self.lock().iter().map(|(_, m)| appended_lines(m)).sum()
    }

    fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn clear(&self) {
        self.lock().clear();
    }
}

fn appended_lines(modification: &Modification) -> usize {
    modification
        .section()
        .filter(|_| modification.is_appended())
        .map_or(0, |section| section.count)
}

/// Drops every modification of a source that precedes that source's last
/// reset in `batch`.
fn drop_superseded(batch: Vec<(SourceId, Modification)>) -> Vec<(SourceId, Modification)> {
    let mut last_reset: Vec<Option<usize>> = vec![None; MAX_MERGED_SOURCES + 1];
    for (position, (source, modification)) in batch.iter().enumerate() {
        if modification.is_reset() {
            last_reset[source.0 as usize] = Some(position);
        }
    }
    batch
        .into_iter()
        .enumerate()
        .filter(|(position, (source, _))| {
            last_reset[source.0 as usize].map_or(true, |reset| *position >= reset)
        })
        .map(|(_, item)| item)
        .collect()
}

/// Tags the modifications of one upstream with its id.
struct SourceListener {
    id: SourceId,
    queue: Arc<MergeQueue>,
}

impl LogSourceListener for SourceListener {
    fn on_log_source_modified(&self, _source: &dyn LogSource, modification: Modification) {
        self.queue.push(self.id, modification);
    }
}

struct Upstream {
    source: Arc<dyn LogSource>,
    listener: Arc<dyn LogSourceListener>,
}

// =============================================================================
// MergedLogSource
// =============================================================================

pub struct MergedLogSource {
    base: SourceBase,
    upstreams: Vec<Upstream>,
    columns: Vec<Column>,
    queue: Arc<MergeQueue>,
    options: SourceOptions,
    index: Mutex<MergedIndex>,
}

impl MergedLogSource {
    /// Merges `sources`; ids are assigned by position.
    pub fn new(
        scheduler: Arc<dyn TaskScheduler>,
        sources: Vec<Arc<dyn LogSource>>,
        options: SourceOptions,
    ) -> Result<Arc<Self>, SourceError> {
        if sources.len() > MAX_MERGED_SOURCES {
            return Err(SourceError::TooManySources {
                count: sources.len(),
                max: MAX_MERGED_SOURCES,
            });
        }

        let queue = Arc::new(MergeQueue::default());
        let mut columns = column::minimum();
        let mut upstreams = Vec::with_capacity(sources.len());
        for (position, source) in sources.into_iter().enumerate() {
            for column in source.columns() {
                if !columns.contains(&column) {
                    columns.push(column);
                }
            }
            let listener: Arc<dyn LogSourceListener> = Arc::new(SourceListener {
                id: SourceId(position as u8),
                queue: queue.clone(),
            });
            upstreams.push(Upstream { source, listener });
        }
        if !columns.contains(&column::SOURCE_ID) {
            columns.push(column::SOURCE_ID.clone());
        }

        let name = format!(
            "merged({})",
            upstreams
                .iter()
                .map(|u| u.source.name())
                .collect::<Vec<_>>()
                .join(", ")
        );
        let merged = Arc::new(Self {
            base: SourceBase::new(name),
            upstreams,
            columns,
            queue,
            options,
            index: Mutex::new(MergedIndex::default()),
        });
        for upstream in &merged.upstreams {
            upstream.source.add_listener(
                upstream.listener.clone(),
                options.maximum_wait,
                MERGE_BATCH_SIZE_PER_SOURCE,
            );
        }
        tracing::debug!(
            source = merged.name(),
            sources = merged.upstreams.len(),
            "Merge created"
        );
        SourceBase::start(&merged, scheduler, options.maximum_wait);
        Ok(merged)
    }

    fn lock_index(&self) -> MutexGuard<'_, MergedIndex> {
        self.index.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Position within the merge of a row of upstream `source`, or `INVALID`
    /// if that row is not merged.
    pub fn line_index_of(&self, source: SourceId, source_line: LineIndex) -> LineIndex {
        let Some(line) = source_line.get() else {
            return LineIndex::INVALID;
        };
        self.lock_index()
            .rows()
            .iter()
            .position(|row| row.source_id == source && row.source_line_index == line)
            .map(LineIndex::from)
            .unwrap_or(LineIndex::INVALID)
    }

    /// The upstream rows each append in `batch` contributes, cut short where
    /// a later modification of the same source in the batch invalidates them.
    fn rows_to_fetch(&self, batch: &[(SourceId, Modification)]) -> Vec<(SourceId, Range<usize>)> {
        let mut cutoff: Vec<Option<usize>> = vec![None; self.upstreams.len()];
        let mut ranges = Vec::new();
        for (source, modification) in batch.iter().rev() {
            let Some(slot) = cutoff.get_mut(source.0 as usize) else {
                continue;
            };
            match modification {
                Modification::Reset => *slot = Some(0),
                Modification::Removed(section) => {
                    *slot = Some(slot.map_or(section.start(), |c| c.min(section.start())));
                }
                Modification::Appended(section) => {
                    let end = slot.map_or(section.end(), |c| c.min(section.end()));
                    if section.start() < end {
                        ranges.push((*source, section.start()..end));
                    }
                }
            }
        }
        ranges.reverse();
        ranges
    }

    /// Reads the index entries for `ranges`. Rows without a timestamp are
    /// skipped.
    fn fetch(&self, ranges: Vec<(SourceId, Range<usize>)>) -> Vec<MergedLineIndex> {
        let mut incoming = Vec::new();
        let mut untimed = 0usize;
        for (source, range) in ranges {
            let Some(upstream) = self.upstreams.get(source.0 as usize) else {
                continue;
            };
            let start = range.start;
            let indices: Vec<LineIndex> = range.map(LineIndex::from).collect();
            let buffer = upstream
                .source
                .entries(&indices, &[column::LOG_ENTRY_INDEX.clone(), column::TIMESTAMP.clone()]);
            let entries = buffer.column(&column::LOG_ENTRY_INDEX).unwrap_or(&[]);
            let timestamps = buffer.column(&column::TIMESTAMP).unwrap_or(&[]);
            for (offset, (entry, timestamp)) in entries.iter().zip(timestamps).enumerate() {
                match timestamp.as_timestamp() {
                    Some(timestamp) => incoming.push(MergedLineIndex::new(
                        source,
                        start + offset,
                        entry.as_entry().unwrap_or(EntryIndex::INVALID),
                        timestamp,
                    )),
                    None => untimed += 1,
                }
            }
        }
        if untimed > 0 {
            tracing::trace!(source = self.name(), untimed, "Skipped rows without timestamp");
        }
        incoming
    }

    fn process_batch(&self, batch: Vec<(SourceId, Modification)>) {
        let incoming = self.fetch(self.rows_to_fetch(&batch));
        let appended = incoming.len();

        let modifications = {
            let mut index = self.lock_index();
            let mut changes = MergeChanges::new(index.len());
            for (source, modification) in &batch {
                if modification.is_reset() {
                    index.reset_source(*source, &mut changes);
                }
            }
            for (source, modification) in &batch {
                if let Modification::Removed(section) = modification {
                    index.remove_from(*source, section.start(), &mut changes);
                }
            }
            index.append(incoming, &mut changes);
            changes.into_modifications(index.len())
        };

        tracing::trace!(
            source = self.name(),
            batch = batch.len(),
            appended,
            changes = modifications.len(),
            "Merge batch applied"
        );
        for modification in modifications {
            match modification {
                Modification::Reset => self.base.listeners().reset(self),
                Modification::Removed(section) => {
                    self.base.listeners().remove(self, section.start())
                }
                // New rows are announced by the read that ends every tick.
                Modification::Appended(_) => {}
            }
        }
    }

    fn update_properties(&self) -> Properties {
        let upstream: Vec<Properties> =
            self.upstreams.iter().map(|u| u.source.properties()).collect();
        let count = self.lock_index().len();

        let own = if self.queue.is_empty() {
            Percentage::HUNDRED
        } else {
            Percentage::of(count, count + self.queue.pending_lines().max(1))
        };
        let percentage_processed = upstream
            .iter()
            .fold(own, |total, p| total * p.percentage_processed);

        let empty_reason = match upstream.first() {
            Some(first)
                if count == 0 && upstream.iter().all(|p| p.empty_reason == first.empty_reason) =>
            {
                first.empty_reason
            }
            _ => EmptyReason::None,
        };

        let mut properties = Properties {
            log_entry_count: count,
            size: upstream.iter().filter_map(|p| p.size).reduce(|a, b| a + b),
            last_modified: upstream.iter().filter_map(|p| p.last_modified).max(),
            start_timestamp: upstream.iter().filter_map(|p| p.start_timestamp).min(),
            end_timestamp: upstream.iter().filter_map(|p| p.end_timestamp).max(),
            duration: None,
            percentage_processed,
            empty_reason,
            max_characters_per_line: upstream
                .iter()
                .map(|p| p.max_characters_per_line)
                .max()
                .unwrap_or(0),
        };
        properties.update_duration();
        properties
    }

    /// Serves a column computed from the index. Returns `false` for columns
    /// that must be read from the upstreams.
    fn computed_column(&self, indices: &[LineIndex], column: &Column, dest: &mut [Value]) -> bool {
        let index = self.lock_index();
        let rows = index.rows();
        let value_of = |position: usize| -> Option<Value> {
            let row = &rows[position];
            let value = if *column == column::INDEX || *column == column::ORIGINAL_INDEX {
                Value::Line(LineIndex::from(position))
            } else if *column == column::LOG_ENTRY_INDEX {
                Value::Entry(row.merged_entry_index)
            } else if *column == column::LINE_NUMBER {
                Value::Int(position as i64 + 1)
            } else if *column == column::SOURCE_ID {
                Value::Source(row.source_id)
            } else if *column == column::TIMESTAMP {
                Value::Timestamp(Some(row.timestamp))
            } else if *column == column::ELAPSED_TIME {
                Value::Duration(rows.first().map(|first| row.timestamp - first.timestamp))
            } else if *column == column::DELTA_TIME {
                Value::Duration(
                    position
                        .checked_sub(1)
                        .map(|previous| row.timestamp - rows[previous].timestamp),
                )
            } else {
                return None;
            };
            Some(value)
        };

        let computed = [
            &column::INDEX,
            &column::ORIGINAL_INDEX,
            &column::LOG_ENTRY_INDEX,
            &column::LINE_NUMBER,
            &column::SOURCE_ID,
            &column::TIMESTAMP,
            &column::ELAPSED_TIME,
            &column::DELTA_TIME,
        ];
        if !computed.contains(&column) {
            return false;
        }
        for (slot, i) in dest.iter_mut().zip(indices) {
            *slot = i
                .within(rows.len())
                .and_then(|position| value_of(position))
                .unwrap_or_else(|| column.default_value().clone());
        }
        true
    }
}

impl ProcessingSource for MergedLogSource {
    fn base(&self) -> &SourceBase {
        &self.base
    }

    fn tick(&self) -> Duration {
        let batch = self.queue.take_batch(self.options.max_lines_per_tick);
        let performed_work = !batch.is_empty();
        if performed_work && !self.base.is_disposed() {
            self.process_batch(batch);
        }

        let count = self.lock_index().len();
        self.base.listeners().on_read(self, count);
        let properties = self.update_properties();
        self.base.publish(self, properties);

        if performed_work || !self.queue.is_empty() {
            Duration::ZERO
        } else {
            self.options.maximum_wait
        }
    }
}

impl LogSource for MergedLogSource {
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
        if self.computed_column(indices, column, dest) {
            return;
        }

        // Group requested rows by owning upstream.
        let mut groups: Vec<(Vec<LineIndex>, Vec<usize>)> =
            vec![(Vec::new(), Vec::new()); self.upstreams.len()];
        {
            let index = self.lock_index();
            for (position, (slot, i)) in dest.iter_mut().zip(indices).enumerate() {
                match i.within(index.len()).and_then(|row| index.get(row)) {
                    Some(row) => {
                        let (lines, positions) = &mut groups[row.source_id.0 as usize];
                        lines.push(LineIndex::from(row.source_line_index));
                        positions.push(position);
                    }
                    None => *slot = column.default_value().clone(),
                }
            }
        }

        for (upstream, (lines, positions)) in self.upstreams.iter().zip(groups) {
            if lines.is_empty() {
                continue;
            }
            let values = upstream.source.values(&lines, column);
            for (position, value) in positions.into_iter().zip(values) {
                dest[position] = value;
            }
        }
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
            for upstream in &self.upstreams {
                upstream.source.remove_listener(&upstream.listener);
            }
            self.queue.clear();
            self.lock_index().clear();
        });
    }
}

impl Drop for MergedLogSource {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Severity;
    use crate::core::scheduler::ManualTaskScheduler;
    use crate::sources::{InMemoryLogSource, MultiLineLogSource};
    use crate::test_support::{continuation, line, ts, RecordingListener};

    fn options() -> SourceOptions {
        SourceOptions {
            maximum_wait: Duration::ZERO,
            ..Default::default()
        }
    }

    fn merge(
        scheduler: &Arc<ManualTaskScheduler>,
        sources: &[Arc<InMemoryLogSource>],
    ) -> Arc<MergedLogSource> {
        let sources = sources
            .iter()
            .map(|s| s.clone() as Arc<dyn LogSource>)
            .collect();
        MergedLogSource::new(scheduler.clone(), sources, options()).unwrap()
    }

    fn column_of(source: &dyn LogSource, column: &Column) -> Vec<Value> {
        let indices: Vec<LineIndex> = (0..source.count()).map(LineIndex::from).collect();
        source.values(&indices, column)
    }

    fn raw(source: &dyn LogSource) -> Vec<String> {
        column_of(source, &column::RAW_CONTENT)
            .iter()
            .map(|v| v.as_text().unwrap_or("").to_string())
            .collect()
    }

    #[test]
    fn test_two_sources_interleave_by_timestamp() {
        let scheduler = ManualTaskScheduler::new();
        let a = InMemoryLogSource::new("a", &[]);
        let b = InMemoryLogSource::new("b", &[]);
        let merged = merge(&scheduler, &[a.clone(), b.clone()]);

        a.add_entry(line("a0", Severity::Info, Some(0)));
        a.add_entry(line("a1", Severity::Info, Some(2)));
        a.add_entry(line("a2", Severity::Info, Some(3)));
        b.add_entry(line("b0", Severity::Info, Some(1)));
        scheduler.run(2);

        assert_eq!(raw(&*merged), vec!["a0", "b0", "a1", "a2"]);
        assert_eq!(
            column_of(&*merged, &column::SOURCE_ID),
            vec![
                Value::Source(SourceId(0)),
                Value::Source(SourceId(1)),
                Value::Source(SourceId(0)),
                Value::Source(SourceId(0)),
            ]
        );
        assert_eq!(
            column_of(&*merged, &column::LOG_ENTRY_INDEX),
            (0..4).map(|i| Value::Entry(EntryIndex::new(i))).collect::<Vec<_>>()
        );
        assert_eq!(
            merged.line_index_of(SourceId(1), LineIndex::from(0usize)),
            LineIndex::from(1usize)
        );
        assert!(merged.is_processing_complete());
    }

    #[test]
    fn test_single_source_round_trip() {
        let scheduler = ManualTaskScheduler::new();
        let a = InMemoryLogSource::new("a", &[]);
        for i in 0..5 {
            a.add_entry(line(&format!("row {i}"), Severity::Warning, Some(i)));
        }
        let merged = merge(&scheduler, &[a.clone()]);
        scheduler.run_once();

        assert_eq!(merged.count(), 5);
        for column in [&column::RAW_CONTENT, &column::LOG_LEVEL, &column::TIMESTAMP] {
            assert_eq!(column_of(&*merged, column), column_of(&*a, column));
        }
    }

    #[test]
    fn test_rows_without_timestamp_are_excluded() {
        let scheduler = ManualTaskScheduler::new();
        let a = InMemoryLogSource::new("a", &[]);
        a.add_entry(line("timed", Severity::Info, Some(1)));
        a.add_entry(line("untimed", Severity::Info, None));
        let merged = merge(&scheduler, &[a.clone()]);
        scheduler.run_once();
        assert_eq!(raw(&*merged), vec!["timed"]);
    }

    #[test]
    fn test_continuations_follow_their_parent() {
        let scheduler = ManualTaskScheduler::new();
        let a = InMemoryLogSource::new("a", &[]);
        let b = InMemoryLogSource::new("b", &[]);
        a.add_entry(line("a start", Severity::Error, Some(1)));
        a.add_entry(continuation("a more"));
        b.add_entry(line("b", Severity::Info, Some(2)));
        let grouped_a = MultiLineLogSource::new(scheduler.clone(), a.clone(), options());
        let merged = MergedLogSource::new(
            scheduler.clone(),
            vec![
                grouped_a.clone() as Arc<dyn LogSource>,
                b.clone() as Arc<dyn LogSource>,
            ],
            options(),
        )
        .unwrap();
        scheduler.run(2);

        assert_eq!(raw(&*merged), vec!["a start", "a more", "b"]);
        assert_eq!(
            column_of(&*merged, &column::LOG_ENTRY_INDEX),
            vec![
                Value::Entry(EntryIndex::new(0)),
                Value::Entry(EntryIndex::new(0)),
                Value::Entry(EntryIndex::new(1)),
            ]
        );
    }

    #[test]
    fn test_single_append_yields_one_notification() {
        let scheduler = ManualTaskScheduler::new();
        let a = InMemoryLogSource::new("a", &[]);
        let b = InMemoryLogSource::new("b", &[]);
        let merged = merge(&scheduler, &[a.clone(), b.clone()]);
        scheduler.run_once();
        let recorder = RecordingListener::new();
        merged.add_listener(recorder.clone(), Duration::ZERO, 100);
        recorder.clear();

        a.add_entry(line("only", Severity::Info, Some(1)));
        scheduler.run(3);
        assert_eq!(recorder.modifications(), vec![Modification::appended(0, 1)]);
    }

    #[test]
    fn test_reset_of_empty_source_is_silent() {
        let scheduler = ManualTaskScheduler::new();
        let a = InMemoryLogSource::new("a", &[]);
        let b = InMemoryLogSource::new("b", &[]);
        a.add_entry(line("a", Severity::Info, Some(1)));
        let merged = merge(&scheduler, &[a.clone(), b.clone()]);
        scheduler.run_once();
        let recorder = RecordingListener::new();
        merged.add_listener(recorder.clone(), Duration::ZERO, 100);
        recorder.clear();

        b.clear();
        scheduler.run(2);
        assert!(recorder.modifications().is_empty());
        assert_eq!(merged.count(), 1);
    }

    #[test]
    fn test_removal_in_one_source() {
        let scheduler = ManualTaskScheduler::new();
        let a = InMemoryLogSource::new("a", &[]);
        let b = InMemoryLogSource::new("b", &[]);
        a.add_entry(line("a0", Severity::Info, Some(0)));
        a.add_entry(line("a1", Severity::Info, Some(2)));
        b.add_entry(line("b0", Severity::Info, Some(1)));
        b.add_entry(line("b1", Severity::Info, Some(3)));
        let merged = merge(&scheduler, &[a.clone(), b.clone()]);
        scheduler.run_once();
        let recorder = RecordingListener::new();
        merged.add_listener(recorder.clone(), Duration::ZERO, 100);
        recorder.clear();

        a.remove_from(1);
        scheduler.run_once();
        assert_eq!(raw(&*merged), vec!["a0", "b0", "b1"]);
        assert_eq!(
            recorder.modifications(),
            vec![Modification::removed(2, 2), Modification::appended(2, 1)]
        );
    }

    #[test]
    fn test_append_then_removal_in_same_batch() {
        let scheduler = ManualTaskScheduler::new();
        let a = InMemoryLogSource::new("a", &[]);
        let merged = merge(&scheduler, &[a.clone()]);
        a.add_entry(line("keep", Severity::Info, Some(0)));
        a.add_entry(line("gone", Severity::Info, Some(1)));
        a.remove_from(1);
        scheduler.run_once();
        assert_eq!(raw(&*merged), vec!["keep"]);
    }

    #[test]
    fn test_properties_are_aggregated() {
        let scheduler = ManualTaskScheduler::new();
        let a = InMemoryLogSource::new("a", &[]);
        let b = InMemoryLogSource::new("b", &[]);
        a.set_size(Some(100));
        b.set_size(Some(50));
        a.add_entry(line("a", Severity::Info, Some(10)));
        b.add_entry(line("b", Severity::Info, Some(4)));
        let merged = merge(&scheduler, &[a.clone(), b.clone()]);
        scheduler.run_once();

        let properties = merged.properties();
        assert_eq!(properties.log_entry_count, 2);
        assert_eq!(properties.size, Some(150));
        assert_eq!(properties.start_timestamp, Some(ts(4)));
        assert_eq!(properties.end_timestamp, Some(ts(10)));
        assert_eq!(properties.duration, Some(chrono::TimeDelta::seconds(6)));
        assert!(properties.is_processing_complete());
    }

    #[test]
    fn test_all_empty_sources_complete() {
        let scheduler = ManualTaskScheduler::new();
        let a = InMemoryLogSource::new("a", &[]);
        let b = InMemoryLogSource::new("b", &[]);
        let merged = merge(&scheduler, &[a, b]);
        scheduler.run(2);
        assert_eq!(merged.count(), 0);
        assert!(merged.is_processing_complete());
    }

    #[test]
    fn test_too_many_sources() {
        let scheduler = ManualTaskScheduler::new();
        let sources: Vec<Arc<dyn LogSource>> = (0..=MAX_MERGED_SOURCES)
            .map(|i| InMemoryLogSource::new(format!("s{i}"), &[]) as Arc<dyn LogSource>)
            .collect();
        let result = MergedLogSource::new(scheduler, sources, options());
        assert!(matches!(
            result,
            Err(SourceError::TooManySources { count, .. }) if count == MAX_MERGED_SOURCES + 1
        ));
    }

    #[test]
    fn test_dispose_unregisters_from_upstreams() {
        let scheduler = ManualTaskScheduler::new();
        let a = InMemoryLogSource::new("a", &[]);
        let merged = merge(&scheduler, &[a.clone()]);
        merged.dispose();
        assert_eq!(scheduler.periodic_task_count(), 0);
        a.add_entry(line("late", Severity::Info, Some(1)));
        assert!(merged.queue.is_empty());
    }
}
