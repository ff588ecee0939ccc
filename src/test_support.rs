// LogWeave - test_support.rs
//
// Helpers shared by the unit tests of several modules.

use crate::core::column::{self, Column, Value};
use crate::core::model::{LineIndex, LogEntry, Properties, Severity};
use crate::core::modification::Modification;
use crate::core::source::{LogSource, LogSourceListener};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Records every modification it receives.
#[derive(Default)]
pub struct RecordingListener {
    modifications: Mutex<Vec<Modification>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn modifications(&self) -> Vec<Modification> {
        self.modifications.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.modifications.lock().unwrap().clear();
    }

    /// Replays the recorded modifications and returns the row count a
    /// consumer would believe the source holds.
    pub fn visible_count(&self) -> usize {
        let mut count = 0;
        for modification in self.modifications() {
            match modification {
                Modification::Reset => count = 0,
                Modification::Removed(section) => count = count.min(section.start()),
                Modification::Appended(section) => {
                    assert_eq!(section.start(), count, "appends must be contiguous");
                    count = section.end();
                }
            }
        }
        count
    }
}

impl LogSourceListener for RecordingListener {
    fn on_log_source_modified(&self, _source: &dyn LogSource, modification: Modification) {
        self.modifications.lock().unwrap().push(modification);
    }
}

/// Records like `RecordingListener` and, on its first `Reset`, registers
/// `late` with the source that sent it from inside the callback.
pub struct RegisteringListener {
    pub seen: Arc<RecordingListener>,
    pub late: Arc<RecordingListener>,
    registered: AtomicBool,
}

impl RegisteringListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            seen: RecordingListener::new(),
            late: RecordingListener::new(),
            registered: AtomicBool::new(false),
        })
    }
}

impl LogSourceListener for RegisteringListener {
    fn on_log_source_modified(&self, source: &dyn LogSource, modification: Modification) {
        self.seen.on_log_source_modified(source, modification);
        if modification.is_reset() && !self.registered.swap(true, Ordering::SeqCst) {
            source.add_listener(self.late.clone(), Duration::ZERO, 100);
        }
    }
}

/// A source without rows, used as the `source` argument of notifications.
pub struct StubSource {
    name: String,
}

impl StubSource {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
        })
    }
}

impl LogSource for StubSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> Vec<Column> {
        column::minimum()
    }

    fn properties(&self) -> Properties {
        Properties::default()
    }

    fn get_column(&self, indices: &[LineIndex], column: &Column, dest: &mut [Value]) {
        for slot in dest.iter_mut().take(indices.len()) {
            *slot = column.default_value().clone();
        }
    }

    fn add_listener(&self, _: Arc<dyn LogSourceListener>, _: Duration, _: usize) {}

    fn remove_listener(&self, _: &Arc<dyn LogSourceListener>) {}

    fn dispose(&self) {}
}

pub fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

/// A row with raw content, a level and an optional timestamp.
pub fn line(raw: &str, level: Severity, timestamp: Option<i64>) -> LogEntry {
    LogEntry::new()
        .with(&column::RAW_CONTENT, Value::Text(Some(raw.to_string())))
        .with(&column::LOG_LEVEL, Value::Level(level))
        .with(&column::TIMESTAMP, Value::Timestamp(timestamp.map(ts)))
}

/// A continuation row: raw content only.
pub fn continuation(raw: &str) -> LogEntry {
    LogEntry::new().with(&column::RAW_CONTENT, Value::Text(Some(raw.to_string())))
}
