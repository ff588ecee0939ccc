// LogWeave - core/source.rs
//
// The log source contract shared by producers and transforms.
//
// Every transform implements `LogSource` and consumes `LogSource`s, so
// transforms compose freely (filter on merge on multi-line on producer).
//
// Thread-safety: all methods may be called from any thread at any time,
// concurrently with the source's own processing tick.

use crate::core::buffer::LogBuffer;
use crate::core::column::{self, Column, Value};
use crate::core::model::{LineIndex, LogEntry, Properties};
use crate::core::modification::{Modification, Section};
use std::sync::Arc;
use std::time::Duration;

/// Observer of a log source.
///
/// Called synchronously on the notifying source's processing thread, never
/// while the source holds one of its internal locks. Implementations must
/// not panic and should return quickly.
pub trait LogSourceListener: Send + Sync {
    fn on_log_source_modified(&self, source: &dyn LogSource, modification: Modification);
}

pub trait LogSource: Send + Sync {
    /// Human-readable name used in log output.
    fn name(&self) -> &str;

    /// The columns this source can serve.
    fn columns(&self) -> Vec<Column>;

    /// A consistent snapshot of this source's properties.
    fn properties(&self) -> Properties;

    /// Reads `column` for each of `indices` into `dest` (which must be at
    /// least `indices.len()` long). Invalid or out-of-range indices, and
    /// columns the source doesn't serve, produce the column default.
    fn get_column(&self, indices: &[LineIndex], column: &Column, dest: &mut [Value]);

    /// Reads every column of `buffer` for `indices` into the buffer rows
    /// starting at `dest_offset`.
    fn get_entries(&self, indices: &[LineIndex], buffer: &mut LogBuffer, dest_offset: usize) {
        let columns = buffer.columns().to_vec();
        for column in &columns {
            if let Some(dest) = buffer.column_range_mut(column, dest_offset, indices.len()) {
                let n = dest.len();
                self.get_column(&indices[..n], column, dest);
            }
        }
    }

    /// Registers `listener`. It immediately receives `Reset` followed by the
    /// rows this source already holds, then every later change, batched so
    /// that at most `maximum_batch` rows are reported per notification and
    /// no change waits longer than `maximum_wait`.
    fn add_listener(
        &self,
        listener: Arc<dyn LogSourceListener>,
        maximum_wait: Duration,
        maximum_batch: usize,
    );

    fn remove_listener(&self, listener: &Arc<dyn LogSourceListener>);

    /// Stops processing, unregisters from all upstream sources and drops all
    /// listeners. Idempotent; never panics.
    fn dispose(&self);
}

/// Convenience reads built on top of [`LogSource`].
pub trait LogSourceExt: LogSource {
    fn count(&self) -> usize {
        self.properties().log_entry_count
    }

    fn is_processing_complete(&self) -> bool {
        self.properties().is_processing_complete()
    }

    /// Reads `column` for the given indices into a new vector.
    fn values(&self, indices: &[LineIndex], column: &Column) -> Vec<Value> {
        let mut values = column::defaults(column, indices.len());
        self.get_column(indices, column, &mut values);
        values
    }

    fn section_values(&self, section: Section, column: &Column) -> Vec<Value> {
        self.values(&section.indices(), column)
    }

    /// Reads `columns` for the given indices into a new buffer.
    fn entries(&self, indices: &[LineIndex], columns: &[Column]) -> LogBuffer {
        let mut buffer = LogBuffer::new(indices.len(), columns);
        self.get_entries(indices, &mut buffer, 0);
        buffer
    }

    fn section_entries(&self, section: Section, columns: &[Column]) -> LogBuffer {
        self.entries(&section.indices(), columns)
    }

    /// Reads all of this source's columns for one row.
    fn entry(&self, index: LineIndex) -> Option<LogEntry> {
        index.within(self.count())?;
        self.entries(&[index], &self.columns()).entry(0)
    }
}

impl<T: LogSource + ?Sized> LogSourceExt for T {}
