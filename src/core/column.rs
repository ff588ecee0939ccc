// LogWeave - core/column.rs
//
// Column identities and the tagged value type stored in them.
//
// A column is an id plus a default value; the variant of the default fixes
// the column's value type. Two columns are the same column iff their ids
// are equal. Sources resolve a requested column once per read call and then
// work on whole slices of `Value`, never re-dispatching per row.

use crate::core::model::{EntryIndex, LineIndex, Severity, SourceId};
use chrono::{DateTime, TimeDelta, Utc};
use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};

// =============================================================================
// Value
// =============================================================================

/// A single cell of a log record.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Line(LineIndex),
    Entry(EntryIndex),
    Int(i64),
    Text(Option<String>),
    Level(Severity),
    Timestamp(Option<DateTime<Utc>>),
    Duration(Option<TimeDelta>),
    Source(SourceId),
}

/// The type tag of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Line,
    Entry,
    Int,
    Text,
    Level,
    Timestamp,
    Duration,
    Source,
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Line(_) => ValueKind::Line,
            Value::Entry(_) => ValueKind::Entry,
            Value::Int(_) => ValueKind::Int,
            Value::Text(_) => ValueKind::Text,
            Value::Level(_) => ValueKind::Level,
            Value::Timestamp(_) => ValueKind::Timestamp,
            Value::Duration(_) => ValueKind::Duration,
            Value::Source(_) => ValueKind::Source,
        }
    }

    pub fn as_line(&self) -> Option<LineIndex> {
        match self {
            Value::Line(index) => Some(*index),
            _ => None,
        }
    }

    pub fn as_entry(&self) -> Option<EntryIndex> {
        match self {
            Value::Entry(index) => Some(*index),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => text.as_deref(),
            _ => None,
        }
    }

    pub fn as_level(&self) -> Option<Severity> {
        match self {
            Value::Level(level) => Some(*level),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(ts) => *ts,
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<TimeDelta> {
        match self {
            Value::Duration(d) => *d,
            _ => None,
        }
    }

    pub fn as_source(&self) -> Option<SourceId> {
        match self {
            Value::Source(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Line(index) => write!(f, "{index}"),
            Value::Entry(index) => write!(f, "{}", index.value()),
            Value::Int(value) => write!(f, "{value}"),
            Value::Text(text) => f.write_str(text.as_deref().unwrap_or("")),
            Value::Level(level) => f.write_str(level.short_label()),
            Value::Timestamp(Some(ts)) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S%.3f")),
            Value::Timestamp(None) => f.write_str("-"),
            Value::Duration(Some(d)) => write!(f, "{}ms", d.num_milliseconds()),
            Value::Duration(None) => f.write_str("-"),
            Value::Source(id) => write!(f, "{id}"),
        }
    }
}

// =============================================================================
// Column
// =============================================================================

/// A column identity together with its default value.
#[derive(Debug, Clone)]
pub struct Column {
    id: Cow<'static, str>,
    default: Value,
}

impl Column {
    const fn well_known(id: &'static str, default: Value) -> Self {
        Self {
            id: Cow::Borrowed(id),
            default,
        }
    }

    /// Creates an extension column. Producers use this for columns beyond the
    /// well-known set (thread id, component, ...).
    pub fn custom(id: impl Into<String>, default: Value) -> Self {
        Self {
            id: Cow::Owned(id.into()),
            default,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn default_value(&self) -> &Value {
        &self.default
    }

    pub fn kind(&self) -> ValueKind {
        self.default.kind()
    }
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Column {}

impl Hash for Column {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

// =============================================================================
// Well-known columns
// =============================================================================

/// Index of the row in the source that serves it.
pub static INDEX: Column = Column::well_known("index", Value::Line(LineIndex::INVALID));

/// Index of the row in the source the row originally came from.
pub static ORIGINAL_INDEX: Column =
    Column::well_known("original_index", Value::Line(LineIndex::INVALID));

/// Index of the logical (multi-line) entry the row belongs to.
pub static LOG_ENTRY_INDEX: Column =
    Column::well_known("log_entry_index", Value::Entry(EntryIndex::INVALID));

/// 1-based line number in the serving source.
pub static LINE_NUMBER: Column = Column::well_known("line_number", Value::Int(0));

/// 1-based line number in the original source.
pub static ORIGINAL_LINE_NUMBER: Column =
    Column::well_known("original_line_number", Value::Int(0));

pub static RAW_CONTENT: Column = Column::well_known("raw_content", Value::Text(None));

pub static LOG_LEVEL: Column = Column::well_known("log_level", Value::Level(Severity::None));

pub static TIMESTAMP: Column = Column::well_known("timestamp", Value::Timestamp(None));

/// Time since the first timestamped row of the serving source.
pub static ELAPSED_TIME: Column = Column::well_known("elapsed_time", Value::Duration(None));

/// Time since the previous row of the serving source.
pub static DELTA_TIME: Column = Column::well_known("delta_time", Value::Duration(None));

/// Which merged upstream the row came from.
pub static SOURCE_ID: Column = Column::well_known("source_id", Value::Source(SourceId(0)));

/// The columns every source exposes.
pub fn minimum() -> Vec<Column> {
    [
        &INDEX,
        &ORIGINAL_INDEX,
        &LOG_ENTRY_INDEX,
        &LINE_NUMBER,
        &ORIGINAL_LINE_NUMBER,
        &RAW_CONTENT,
        &LOG_LEVEL,
        &TIMESTAMP,
        &ELAPSED_TIME,
        &DELTA_TIME,
    ]
    .into_iter()
    .cloned()
    .collect()
}

/// Unions `columns` with [`minimum`], keeping the order of first appearance.
pub fn combine_with_minimum(columns: &[Column]) -> Vec<Column> {
    let mut combined = minimum();
    for column in columns {
        if !combined.contains(column) {
            combined.push(column.clone());
        }
    }
    combined
}

/// Returns the default value of `column` repeated `count` times.
pub fn defaults(column: &Column, count: usize) -> Vec<Value> {
    vec![column.default_value().clone(); count]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_the_id() {
        let a = Column::custom("thread", Value::Text(None));
        let b = Column::custom("thread", Value::Int(0));
        assert_eq!(a, b);
        assert_ne!(a, RAW_CONTENT);
    }

    #[test]
    fn test_combine_with_minimum_dedups() {
        let thread = Column::custom("thread", Value::Text(None));
        let combined = combine_with_minimum(&[RAW_CONTENT.clone(), thread.clone(), SOURCE_ID.clone()]);
        assert_eq!(combined.len(), minimum().len() + 2);
        assert_eq!(combined.iter().filter(|c| **c == RAW_CONTENT).count(), 1);
        assert!(combined.contains(&thread));
        assert!(combined.contains(&SOURCE_ID));
    }

    #[test]
    fn test_kind_follows_default() {
        assert_eq!(TIMESTAMP.kind(), ValueKind::Timestamp);
        assert_eq!(LOG_ENTRY_INDEX.kind(), ValueKind::Entry);
        assert_eq!(Value::Text(Some("x".into())).as_text(), Some("x"));
        assert_eq!(Value::Int(3).as_text(), None);
    }
}
