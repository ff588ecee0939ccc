// LogWeave - sources/base.rs
//
// Shared skeleton of every concrete source.
//
// `SourceBase` owns the cancellation flag, the periodic task registration,
// the listener collection and the published property snapshot. Transforms
// embed one and implement `ProcessingSource` so the base can drive their
// tick from the scheduler.
//
// Ownership: the periodic callback holds only a `Weak` reference to its
// source. Dropping the last `Arc` therefore disposes the source (via its
// `Drop`), which in turn unregisters the periodic task.

use crate::core::model::Properties;
use crate::core::scheduler::{TaskHandle, TaskScheduler};
use crate::core::source::{LogSource, LogSourceListener};
use crate::sources::listeners::ListenerCollection;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A source whose state is advanced by a periodic tick.
pub trait ProcessingSource: LogSource + 'static {
    fn base(&self) -> &SourceBase;

    /// Performs one processing step and returns the delay before the next.
    /// Must not panic; the scheduler catches panics but the step is lost.
    fn tick(&self) -> Duration;
}

pub struct SourceBase {
    name: String,
    task: Mutex<Option<(Arc<dyn TaskScheduler>, TaskHandle)>>,
    cancelled: AtomicBool,
    listeners: ListenerCollection,
    properties: Mutex<Properties>,
}

impl SourceBase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            task: Mutex::new(None),
            cancelled: AtomicBool::new(false),
            listeners: ListenerCollection::new(),
            properties: Mutex::new(Properties::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn listeners(&self) -> &ListenerCollection {
        &self.listeners
    }

    pub fn is_disposed(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Registers the periodic tick of `source` with `scheduler`.
    pub fn start<S: ProcessingSource>(
        source: &Arc<S>,
        scheduler: Arc<dyn TaskScheduler>,
        idle_delay: Duration,
    ) {
        let weak = Arc::downgrade(source);
        let handle = scheduler.start_periodic(
            source.base().name(),
            Box::new(move || match weak.upgrade() {
                Some(source) if !source.base().is_disposed() => source.tick(),
                _ => idle_delay,
            }),
        );

        let base = source.base();
        *base.task.lock().unwrap_or_else(|p| p.into_inner()) = Some((scheduler, handle));
        // A dispose racing with start must not leave the task behind.
        if base.is_disposed() {
            base.stop_task();
        }
        tracing::debug!(source = base.name(), "Source processing started");
    }

    fn stop_task(&self) {
        let task = self.task.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some((scheduler, handle)) = task {
            scheduler.stop_periodic(&handle);
        }
    }

    /// The current property snapshot.
    pub fn properties(&self) -> Properties {
        self.properties
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Replaces the property snapshot.
    ///
    /// When the new snapshot reports processing as complete, listeners are
    /// flushed first: a consumer that sees 100% has already received every
    /// change.
    pub fn publish(&self, source: &dyn LogSource, properties: Properties) {
        if properties.is_processing_complete() {
            self.listeners.flush(source);
        }
        self.store_properties(properties);
    }

    /// Replaces the property snapshot without touching listeners.
    pub fn store_properties(&self, properties: Properties) {
        *self.properties.lock().unwrap_or_else(|p| p.into_inner()) = properties;
    }

    pub fn add_listener(
        &self,
        source: &dyn LogSource,
        listener: Arc<dyn LogSourceListener>,
        maximum_wait: Duration,
        maximum_batch: usize,
    ) {
        if self.is_disposed() {
            tracing::debug!(source = self.name(), "Ignoring listener added after disposal");
            return;
        }
        self.listeners
            .add_listener(source, listener, maximum_wait, maximum_batch);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn LogSourceListener>) {
        self.listeners.remove_listener(listener);
    }

    /// Cancels processing, runs `extra` (typically unregistering from
    /// upstream sources) and drops all listeners. Only the first call has
    /// any effect; a panic in `extra` is logged and disposal completes.
    pub fn dispose<F: FnOnce()>(&self, extra: F) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop_task();
        if catch_unwind(AssertUnwindSafe(extra)).is_err() {
            tracing::error!(source = self.name(), "Panic while disposing source");
        }
        self.listeners.clear();
        tracing::debug!(source = self.name(), "Source disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::column::{Column, Value};
    use crate::core::model::{LineIndex, Percentage};
    use crate::core::modification::Modification;
    use crate::core::scheduler::ManualTaskScheduler;
    use crate::test_support::RecordingListener;
    use std::sync::atomic::AtomicUsize;

    struct Counter {
        base: SourceBase,
        ticks: AtomicUsize,
        rows: AtomicUsize,
    }

    impl Counter {
        fn create(scheduler: &Arc<ManualTaskScheduler>) -> Arc<Self> {
            let source = Arc::new(Self {
                base: SourceBase::new("counter"),
                ticks: AtomicUsize::new(0),
                rows: AtomicUsize::new(0),
            });
            SourceBase::start(&source, scheduler.clone(), Duration::from_millis(10));
            source
        }
    }

    impl LogSource for Counter {
        fn name(&self) -> &str {
            self.base.name()
        }
        fn columns(&self) -> Vec<Column> {
            crate::core::column::minimum()
        }
        fn properties(&self) -> Properties {
            self.base.properties()
        }
        fn get_column(&self, _: &[LineIndex], _: &Column, _: &mut [Value]) {}
        fn add_listener(&self, l: Arc<dyn LogSourceListener>, w: Duration, b: usize) {
            self.base.add_listener(self, l, w, b);
        }
        fn remove_listener(&self, l: &Arc<dyn LogSourceListener>) {
            self.base.remove_listener(l);
        }
        fn dispose(&self) {
            self.base.dispose(|| panic!("extra disposal failed"));
        }
    }

    impl ProcessingSource for Counter {
        fn base(&self) -> &SourceBase {
            &self.base
        }
        fn tick(&self) -> Duration {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            let rows = self.rows.load(Ordering::SeqCst);
            self.base.listeners().on_read(self, rows);
            self.base.publish(
                self,
                Properties {
                    log_entry_count: rows,
                    percentage_processed: Percentage::HUNDRED,
                    ..Default::default()
                },
            );
            Duration::from_millis(10)
        }
    }

    impl Drop for Counter {
        fn drop(&mut self) {
            self.dispose();
        }
    }

    #[test]
    fn test_completion_flushes_listeners() {
        let scheduler = ManualTaskScheduler::new();
        let source = Counter::create(&scheduler);
        let recorder = RecordingListener::new();
        source.add_listener(recorder.clone(), Duration::from_secs(3600), 1000);

        source.rows.store(3, Ordering::SeqCst);
        scheduler.run_once();
        assert!(source.properties().is_processing_complete());
        assert_eq!(
            recorder.modifications(),
            vec![Modification::Reset, Modification::appended(0, 3)]
        );
    }

    #[test]
    fn test_dispose_is_idempotent_and_stops_ticks() {
        let scheduler = ManualTaskScheduler::new();
        let source = Counter::create(&scheduler);
        scheduler.run_once();
        assert_eq!(source.ticks.load(Ordering::SeqCst), 1);

        source.dispose();
        source.dispose();
        assert!(source.base.is_disposed());
        assert_eq!(scheduler.periodic_task_count(), 0);
        scheduler.run_once();
        assert_eq!(source.ticks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropping_source_unregisters_task() {
        let scheduler = ManualTaskScheduler::new();
        let source = Counter::create(&scheduler);
        assert_eq!(scheduler.periodic_task_count(), 1);
        drop(source);
        assert_eq!(scheduler.periodic_task_count(), 0);
    }
}
