// LogWeave - sources/multiline.rs
//
// Multi-line grouping transform.
//
// Exposes the rows of its upstream unchanged, except that consecutive rows
// are grouped into logical entries: a row continues the previous entry
// when it carries neither a timestamp nor a recognised level. TIMESTAMP and
// LOG_LEVEL of a continuation row are served from the first row of its
// entry.
//
// Processing model:
//   - upstream modifications are queued by a `PendingModifications`
//     listener and applied at the start of each tick;
//   - at most `max_lines_per_tick` upstream rows are classified per tick;
//   - after an invalidation at row k, grouping resumes from the entry that
//     contains row k-1, so a continuation arriving after the cut joins the
//     entry it belongs to instead of starting a new one.

use crate::core::column::{self, Column, Value};
use crate::core::model::{EntryIndex, LineIndex, Percentage, Properties, Severity};
use crate::core::modification::{Modification, Section};
use crate::core::scheduler::TaskScheduler;
use crate::core::source::{LogSource, LogSourceExt, LogSourceListener};
use crate::sources::base::{ProcessingSource, SourceBase};
use crate::sources::{PendingModifications, SourceOptions};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Entry membership of one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EntryInfo {
    entry_index: EntryIndex,
    first_line: usize,
}

#[derive(Default)]
struct GroupingState {
    /// One element per classified upstream row.
    rows: Vec<EntryInfo>,
    /// Rows the upstream is known to hold.
    full_count: usize,
}

impl GroupingState {
    fn current_entry(&self) -> Option<EntryInfo> {
        self.rows.last().copied()
    }
}

pub struct MultiLineLogSource {
    base: SourceBase,
    upstream: Arc<dyn LogSource>,
    pending: Arc<PendingModifications>,
    options: SourceOptions,
    state: Mutex<GroupingState>,
}

impl MultiLineLogSource {
    pub fn new(
        scheduler: Arc<dyn TaskScheduler>,
        upstream: Arc<dyn LogSource>,
        options: SourceOptions,
    ) -> Arc<Self> {
        let source = Arc::new(Self {
            base: SourceBase::new(format!("multiline({})", upstream.name())),
            pending: Arc::new(PendingModifications::new(options.batch_size)),
            upstream,
            options,
            state: Mutex::new(GroupingState::default()),
        });
        source.upstream.add_listener(
            source.pending.clone(),
            options.maximum_wait,
            options.batch_size,
        );
        SourceBase::start(&source, scheduler, options.maximum_wait);
        source
    }

    fn lock(&self) -> MutexGuard<'_, GroupingState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn listener_handle(&self) -> Arc<dyn LogSourceListener> {
        self.pending.clone()
    }

    fn clear(&self) {
        let had_rows = {
            let mut state = self.lock();
            let had_rows = !state.rows.is_empty();
            *state = GroupingState::default();
            had_rows
        };
        tracing::debug!(source = self.name(), had_rows, "Upstream reset");
        self.base.listeners().reset(self);
    }

    fn invalidate(&self, first: usize) {
        let removed = {
            let mut state = self.lock();
            state.full_count = state.full_count.min(first);
            let removed = state.rows.len().saturating_sub(first);
            state.rows.truncate(first);
            removed
        };
        if removed > 0 {
            tracing::debug!(source = self.name(), first, removed, "Upstream invalidated rows");
            self.base.listeners().remove(self, first);
        }
    }

    fn appended(&self, start: usize, count: usize) {
        let mut state = self.lock();
        if start > state.full_count {
            tracing::warn!(
                source = self.name(),
                start,
                known = state.full_count,
                "Ignoring append beyond the known row count"
            );
            return;
        }
        state.full_count = state.full_count.max(start + count);
    }

    /// Classifies up to `budget` unprocessed rows. Returns how many rows were
    /// classified.
    fn classify(&self, budget: usize) -> usize {
        let (start, end) = {
            let state = self.lock();
            let start = state.rows.len();
            (start, state.full_count.min(start + budget))
        };
        if end <= start {
            return 0;
        }

        // Upstream reads happen without our lock held.
        let buffer = self.upstream.section_entries(
            Section::new(start, end - start),
            &[column::TIMESTAMP.clone(), column::LOG_LEVEL.clone()],
        );
        let timestamps = buffer.column(&column::TIMESTAMP).unwrap_or(&[]);
        let levels = buffer.column(&column::LOG_LEVEL).unwrap_or(&[]);

        let mut state = self.lock();
        if state.rows.len() != start {
            // Invalidated concurrently; the next tick starts over.
            return 0;
        }
        for (offset, (timestamp, level)) in timestamps.iter().zip(levels).enumerate() {
            let row = start + offset;
            if row >= state.full_count {
                break;
            }
            let level = level.as_level().unwrap_or(Severity::None);
            let continues =
                timestamp.as_timestamp().is_none() && !level.marks_entry_start();
            let info = match state.current_entry() {
                Some(current) if continues => current,
                Some(current) => EntryInfo {
                    entry_index: current.entry_index.next(),
                    first_line: row,
                },
                None => EntryInfo {
                    entry_index: EntryIndex::new(0),
                    first_line: row,
                },
            };
            state.rows.push(info);
        }
        state.rows.len() - start
    }

    fn update_properties(&self) -> Properties {
        let upstream = self.upstream.properties();
        let (count, full_count) = {
            let state = self.lock();
            (state.rows.len(), state.full_count)
        };
        let queued = self.pending.pending_lines();
        let own = if queued == 0 && self.pending.is_empty() && count >= full_count {
            Percentage::HUNDRED
        } else {
            Percentage::of(count, full_count.max(count) + queued.max(1))
        };
        Properties {
            log_entry_count: count,
            percentage_processed: upstream.percentage_processed * own,
            ..upstream
        }
    }

    /// Maps each requested row to the first row of its entry.
    fn first_lines(&self, indices: &[LineIndex]) -> Vec<LineIndex> {
        let state = self.lock();
        indices
            .iter()
            .map(|index| match index.within(state.rows.len()) {
                Some(i) => LineIndex::from(state.rows[i].first_line),
                None => LineIndex::INVALID,
            })
            .collect()
    }
}

impl ProcessingSource for MultiLineLogSource {
    fn base(&self) -> &SourceBase {
        &self.base
    }

    fn tick(&self) -> Duration {
        let modifications = self.pending.take_all();
        let performed_work = !modifications.is_empty();
        for modification in modifications {
            if self.base.is_disposed() {
                return self.options.maximum_wait;
            }
            match modification {
                Modification::Reset => self.clear(),
                Modification::Removed(section) => self.invalidate(section.start()),
                Modification::Appended(section) => self.appended(section.start(), section.count),
            }
        }

        let classified = self.classify(self.options.max_lines_per_tick);
        let count = self.lock().rows.len();
        self.base.listeners().on_read(self, count);
        let properties = self.update_properties();
        let more = !properties.percentage_processed.is_complete() && classified > 0;
        self.base.publish(self, properties);

        if performed_work || more {
            Duration::ZERO
        } else {
            self.options.maximum_wait
        }
    }
}

impl LogSource for MultiLineLogSource {
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
        if *column == column::LOG_ENTRY_INDEX {
            let state = self.lock();
            for (slot, index) in dest.iter_mut().zip(indices) {
                *slot = match index.within(state.rows.len()) {
                    Some(i) => Value::Entry(state.rows[i].entry_index),
                    None => column.default_value().clone(),
                };
            }
        } else if *column == column::TIMESTAMP || *column == column::LOG_LEVEL {
            let first_lines = self.first_lines(indices);
            self.upstream.get_column(&first_lines, column, dest);
        } else {
            // Rows not yet classified are not exposed.
            let visible = self.lock().rows.len();
            let translated: Vec<LineIndex> = indices
                .iter()
                .map(|i| if i.within(visible).is_some() { *i } else { LineIndex::INVALID })
                .collect();
            self.upstream.get_column(&translated, column, dest);
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
            self.upstream.remove_listener(&self.listener_handle());
            self.pending.clear();
            *self.lock() = GroupingState::default();
        });
    }
}

impl Drop for MultiLineLogSource {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scheduler::ManualTaskScheduler;
    use crate::sources::InMemoryLogSource;
    use crate::test_support::{continuation, line, RecordingListener, RegisteringListener};

    fn setup() -> (
        Arc<ManualTaskScheduler>,
        Arc<InMemoryLogSource>,
        Arc<MultiLineLogSource>,
    ) {
        let scheduler = ManualTaskScheduler::new();
        let upstream = InMemoryLogSource::new("raw", &[]);
        let options = SourceOptions {
            maximum_wait: Duration::ZERO,
            ..Default::default()
        };
        let multiline = MultiLineLogSource::new(scheduler.clone(), upstream.clone(), options);
        (scheduler, upstream, multiline)
    }

    fn entry_indices(source: &dyn LogSource) -> Vec<i64> {
        let indices: Vec<LineIndex> = (0..source.count()).map(LineIndex::from).collect();
        source
            .values(&indices, &column::LOG_ENTRY_INDEX)
            .iter()
            .map(|v| v.as_entry().map(|e| e.value()).unwrap_or(-1))
            .collect()
    }

    #[test]
    fn test_continuations_join_previous_entry() {
        let (scheduler, upstream, multiline) = setup();
        upstream.add_entry(line("DEBUG: start", Severity::Debug, Some(1)));
        upstream.add_entry(continuation("continuation"));
        upstream.add_entry(line("INFO: next", Severity::Info, Some(2)));
        scheduler.run_once();

        assert_eq!(multiline.count(), 3);
        assert_eq!(entry_indices(&*multiline), vec![0, 0, 1]);
        assert!(multiline.is_processing_complete());

        // The continuation row reports the timestamp and level of its entry.
        let row = LineIndex::from(1usize);
        assert_eq!(
            multiline.values(&[row], &column::LOG_LEVEL),
            vec![Value::Level(Severity::Debug)]
        );
        assert_eq!(
            multiline.values(&[row], &column::RAW_CONTENT),
            vec![Value::Text(Some("continuation".into()))]
        );
    }

    #[test]
    fn test_leading_continuation_starts_first_entry() {
        let (scheduler, upstream, multiline) = setup();
        upstream.add_entry(continuation("orphan"));
        upstream.add_entry(continuation("orphan 2"));
        scheduler.run_once();
        assert_eq!(entry_indices(&*multiline), vec![0, 0]);
    }

    #[test]
    fn test_invalidation_resumes_straddling_entry() {
        let (scheduler, upstream, multiline) = setup();
        upstream.add_entry(line("INFO: a", Severity::Info, Some(1)));
        upstream.add_entry(continuation("a.1"));
        upstream.add_entry(continuation("a.2"));
        upstream.add_entry(line("INFO: b", Severity::Info, Some(2)));
        scheduler.run_once();
        assert_eq!(entry_indices(&*multiline), vec![0, 0, 0, 1]);

        // Cut inside entry 0, then append another continuation of it.
        upstream.remove_from(2);
        upstream.add_entry(continuation("a.2 rewritten"));
        scheduler.run_once();
        assert_eq!(entry_indices(&*multiline), vec![0, 0, 0]);
    }

    #[test]
    fn test_per_tick_budget_bounds_work() {
        let scheduler = ManualTaskScheduler::new();
        let upstream = InMemoryLogSource::new("raw", &[]);
        let options = SourceOptions {
            maximum_wait: Duration::ZERO,
            max_lines_per_tick: 2,
            ..Default::default()
        };
        let multiline = MultiLineLogSource::new(scheduler.clone(), upstream.clone(), options);
        for i in 0..5 {
            upstream.add_entry(line(&format!("INFO: {i}"), Severity::Info, Some(i)));
        }
        scheduler.run_once();
        assert_eq!(multiline.count(), 2);
        assert!(!multiline.is_processing_complete());
        scheduler.run(2);
        assert_eq!(multiline.count(), 5);
        assert!(multiline.is_processing_complete());
    }

    #[test]
    fn test_listener_notifications() {
        let (scheduler, upstream, multiline) = setup();
        let recorder = RecordingListener::new();
        multiline.add_listener(recorder.clone(), Duration::ZERO, 100);
        upstream.add_entry(line("INFO: a", Severity::Info, Some(1)));
        upstream.add_entry(line("INFO: b", Severity::Info, Some(2)));
        scheduler.run_once();
        upstream.clear();
        scheduler.run_once();
        assert_eq!(
            recorder.modifications(),
            vec![
                Modification::Reset,
                Modification::appended(0, 2),
                Modification::Reset,
            ]
        );
    }

    #[test]
    fn test_listener_may_register_from_its_callback() {
        let (scheduler, upstream, multiline) = setup();
        upstream.add_entry(line("INFO: a", Severity::Info, Some(1)));
        upstream.add_entry(continuation("a.1"));
        scheduler.run_once();

        let outer = RegisteringListener::new();
        multiline.add_listener(outer.clone(), Duration::ZERO, 100);
        assert_eq!(multiline.base.listeners().len(), 2);
        assert_eq!(
            outer.late.modifications(),
            vec![Modification::Reset, Modification::appended(0, 2)]
        );

        upstream.clear();
        scheduler.run_once();
        upstream.add_entry(line("INFO: b", Severity::Info, Some(2)));
        scheduler.run_once();
        for recorder in [&outer.seen, &outer.late] {
            assert_eq!(recorder.visible_count(), 1);
            assert_eq!(recorder.modifications().last(), Some(&Modification::appended(0, 1)));
        }
    }

    #[test]
    fn test_dispose_unregisters_from_upstream() {
        let (scheduler, _upstream, multiline) = setup();
        multiline.dispose();
        multiline.dispose();
        assert_eq!(scheduler.periodic_task_count(), 0);
    }
}
