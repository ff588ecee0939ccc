// LogWeave - core/buffer.rs
//
// Fixed-size, column-major buffer of log rows.
//
// Each declared column owns one contiguous `Vec<Value>` so a source can fill
// a whole column slice with a single `get_column` call.

use crate::core::column::{Column, Value};
use crate::core::model::LogEntry;

#[derive(Debug, Clone, PartialEq)]
pub struct LogBuffer {
    columns: Vec<Column>,
    data: Vec<Vec<Value>>,
    len: usize,
}

impl LogBuffer {
    /// Creates a buffer of `len` rows with every cell set to its column default.
    pub fn new(len: usize, columns: &[Column]) -> Self {
        let mut unique: Vec<Column> = Vec::with_capacity(columns.len());
        for column in columns {
            if !unique.contains(column) {
                unique.push(column.clone());
            }
        }
        let data = unique
            .iter()
            .map(|c| vec![c.default_value().clone(); len])
            .collect();
        Self {
            columns: unique,
            data,
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn contains(&self, column: &Column) -> bool {
        self.columns.contains(column)
    }

    fn position(&self, column: &Column) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// All values of `column`, or `None` if the buffer doesn't hold it.
    pub fn column(&self, column: &Column) -> Option<&[Value]> {
        self.position(column).map(|p| self.data[p].as_slice())
    }

    pub fn column_mut(&mut self, column: &Column) -> Option<&mut [Value]> {
        self.position(column).map(|p| self.data[p].as_mut_slice())
    }

    /// The slice `[offset, offset + count)` of `column`, clamped to the
    /// buffer length.
    pub fn column_range_mut(
        &mut self,
        column: &Column,
        offset: usize,
        count: usize,
    ) -> Option<&mut [Value]> {
        let len = self.len;
        let start = offset.min(len);
        let end = offset.saturating_add(count).min(len);
        self.column_mut(column).map(|values| &mut values[start..end])
    }

    /// Copies `values` into `column` starting at `dest_offset`. Values that
    /// would land past the end of the buffer are dropped.
    pub fn copy_from_values(&mut self, column: &Column, dest_offset: usize, values: &[Value]) {
        if let Some(dest) = self.column_range_mut(column, dest_offset, values.len()) {
            let n = dest.len();
            dest.clone_from_slice(&values[..n]);
        }
    }

    /// Resets `count` cells of `column` starting at `offset` to the default.
    pub fn fill_default(&mut self, column: &Column, offset: usize, count: usize) {
        let default = column.default_value().clone();
        if let Some(dest) = self.column_range_mut(column, offset, count) {
            for slot in dest {
                *slot = default.clone();
            }
        }
    }

    /// Resets every cell of every column to its default.
    pub fn clear(&mut self) {
        for (column, values) in self.columns.iter().zip(self.data.iter_mut()) {
            for slot in values.iter_mut() {
                *slot = column.default_value().clone();
            }
        }
    }

    /// Extracts row `row` as an owned entry.
    pub fn entry(&self, row: usize) -> Option<LogEntry> {
        if row >= self.len {
            return None;
        }
        let mut entry = LogEntry::new();
        for (column, values) in self.columns.iter().zip(&self.data) {
            entry.set(column, values[row].clone());
        }
        Some(entry)
    }

    /// All rows as owned entries.
    pub fn entries(&self) -> Vec<LogEntry> {
        (0..self.len).filter_map(|row| self.entry(row)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::column::{LOG_LEVEL, RAW_CONTENT, TIMESTAMP};
    use crate::core::model::Severity;

    fn text(s: &str) -> Value {
        Value::Text(Some(s.to_string()))
    }

    #[test]
    fn test_new_buffer_holds_defaults() {
        let buffer = LogBuffer::new(3, &[RAW_CONTENT.clone(), LOG_LEVEL.clone(), RAW_CONTENT.clone()]);
        assert_eq!(buffer.columns().len(), 2);
        assert_eq!(
            buffer.column(&LOG_LEVEL).unwrap(),
            vec![Value::Level(Severity::None); 3].as_slice()
        );
        assert!(buffer.column(&TIMESTAMP).is_none());
    }

    #[test]
    fn test_copy_from_values_at_offset() {
        let mut buffer = LogBuffer::new(4, &[RAW_CONTENT.clone()]);
        buffer.copy_from_values(&RAW_CONTENT, 2, &[text("a"), text("b"), text("c")]);
        let values = buffer.column(&RAW_CONTENT).unwrap();
        assert_eq!(values[0], Value::Text(None));
        assert_eq!(values[2], text("a"));
        assert_eq!(values[3], text("b"));
    }

    #[test]
    fn test_fill_default_and_entry() {
        let mut buffer = LogBuffer::new(2, &[RAW_CONTENT.clone(), LOG_LEVEL.clone()]);
        buffer.copy_from_values(&RAW_CONTENT, 0, &[text("x"), text("y")]);
        buffer.fill_default(&RAW_CONTENT, 1, 5);
        assert_eq!(buffer.entry(0).unwrap().raw_content(), Some("x"));
        assert_eq!(buffer.entry(1).unwrap().raw_content(), None);
        assert!(buffer.entry(2).is_none());
        assert_eq!(buffer.entries().len(), 2);
    }
}
