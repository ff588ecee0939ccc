// LogWeave - core/model.rs
//
// Core data model types. Pure data definitions with no I/O, no threads,
// no platform dependencies (Atlas Layer Rule: Core depends on std only).
//
// These types are the shared vocabulary across all layers: row and entry
// indices, severity levels, progress percentages and the property snapshot
// every log source publishes.

use crate::core::column::{self, Column, Value};
use chrono::{DateTime, TimeDelta, Utc};
use std::fmt;
use std::ops::{Add, Mul, Sub};

// =============================================================================
// Row / entry indices
// =============================================================================

/// Index of a row ("line") inside a log source.
///
/// Negative values are invalid. Reads with an invalid index, or an index past
/// the end of a source, produce the column's default value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LineIndex(i64);

impl LineIndex {
    /// The sentinel used for "no such row".
    pub const INVALID: LineIndex = LineIndex(-1);

    pub const fn new(value: i64) -> Self {
        if value < 0 {
            Self::INVALID
        } else {
            Self(value)
        }
    }

    pub fn is_valid(self) -> bool {
        self.0 >= 0
    }

    /// The index as a `usize`, or `None` when invalid.
    pub fn get(self) -> Option<usize> {
        usize::try_from(self.0).ok()
    }

    /// The raw signed value (-1 when invalid).
    pub fn value(self) -> i64 {
        self.0
    }

    /// Returns `Some(i)` when this index addresses a row of a source holding
    /// `count` rows.
    pub fn within(self, count: usize) -> Option<usize> {
        self.get().filter(|&i| i < count)
    }
}

impl From<usize> for LineIndex {
    fn from(value: usize) -> Self {
        Self(value as i64)
    }
}

impl Add<i64> for LineIndex {
    type Output = LineIndex;

    fn add(self, rhs: i64) -> Self::Output {
        if self.is_valid() {
            LineIndex::new(self.0 + rhs)
        } else {
            self
        }
    }
}

impl Sub<i64> for LineIndex {
    type Output = LineIndex;

    fn sub(self, rhs: i64) -> Self::Output {
        self + (-rhs)
    }
}

impl fmt::Display for LineIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "#{}", self.0)
        } else {
            f.write_str("#invalid")
        }
    }
}

/// Index of a logical (possibly multi-line) entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryIndex(i64);

impl EntryIndex {
    pub const INVALID: EntryIndex = EntryIndex(-1);

    pub const fn new(value: i64) -> Self {
        if value < 0 {
            Self::INVALID
        } else {
            Self(value)
        }
    }

    pub fn is_valid(self) -> bool {
        self.0 >= 0
    }

    pub fn value(self) -> i64 {
        self.0
    }

    /// The entry following this one. The successor of an invalid index is 0.
    pub fn next(self) -> EntryIndex {
        if self.is_valid() {
            EntryIndex(self.0 + 1)
        } else {
            EntryIndex(0)
        }
    }
}

impl From<usize> for EntryIndex {
    fn from(value: usize) -> Self {
        Self(value as i64)
    }
}

/// Identifies which upstream source a merged row came from.
///
/// Ids are assigned explicitly, in registration order, when a merge is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SourceId(pub u8);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Severity
// =============================================================================

/// Normalised severity levels, ordered from most to least severe.
///
/// `None` marks a line without any level marker (typically the continuation
/// of a multi-line entry); `Other` marks a marker that could not be mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Severity {
    Critical,
    Error,
    Warning,
    Info,
    Debug,
    Trace,
    Other,
    #[default]
    None,
}

impl Severity {
    /// Returns all variants in display order (most severe first).
    pub fn all() -> &'static [Severity] {
        &[
            Severity::Critical,
            Severity::Error,
            Severity::Warning,
            Severity::Info,
            Severity::Debug,
            Severity::Trace,
            Severity::Other,
            Severity::None,
        ]
    }

    /// Human-readable label for display.
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Critical => "Critical",
            Severity::Error => "Error",
            Severity::Warning => "Warning",
            Severity::Info => "Info",
            Severity::Debug => "Debug",
            Severity::Trace => "Trace",
            Severity::Other => "Other",
            Severity::None => "None",
        }
    }

    /// Short label for compact display (e.g. table columns).
    pub fn short_label(&self) -> &'static str {
        match self {
            Severity::Critical => "CRIT",
            Severity::Error => "ERR",
            Severity::Warning => "WARN",
            Severity::Info => "INFO",
            Severity::Debug => "DBG",
            Severity::Trace => "TRC",
            Severity::Other => "???",
            Severity::None => "",
        }
    }

    /// Whether a line carrying this level starts a new log entry.
    pub fn marks_entry_start(&self) -> bool {
        !matches!(self, Severity::None | Severity::Other)
    }

    /// Parses a level keyword (case-insensitive), e.g. "warn" or "ERROR".
    pub fn from_keyword(keyword: &str) -> Option<Severity> {
        match keyword.to_ascii_lowercase().as_str() {
            "fatal" | "critical" | "crit" => Some(Severity::Critical),
            "error" | "err" => Some(Severity::Error),
            "warning" | "warn" => Some(Severity::Warning),
            "info" | "information" => Some(Severity::Info),
            "debug" | "dbg" => Some(Severity::Debug),
            "trace" | "trc" => Some(Severity::Trace),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Percentage
// =============================================================================

/// Fraction of upstream content a source has finished incorporating.
///
/// Stored as a ratio in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Percentage(f64);

impl Percentage {
    pub const ZERO: Percentage = Percentage(0.0);
    pub const HUNDRED: Percentage = Percentage(1.0);

    /// `part / total`, clamped. A `total` of zero counts as complete.
    pub fn of(part: usize, total: usize) -> Self {
        if total == 0 {
            return Self::HUNDRED;
        }
        Self(part as f64 / total as f64).clamped()
    }

    pub fn from_ratio(ratio: f64) -> Self {
        Self(ratio).clamped()
    }

    pub fn ratio(self) -> f64 {
        self.0
    }

    pub fn clamped(self) -> Self {
        if self.0.is_nan() {
            Self::ZERO
        } else {
            Self(self.0.clamp(0.0, 1.0))
        }
    }

    pub fn is_complete(self) -> bool {
        self.0 >= 1.0
    }
}

impl Default for Percentage {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Mul for Percentage {
    type Output = Percentage;

    fn mul(self, rhs: Percentage) -> Percentage {
        Percentage(self.0 * rhs.0).clamped()
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.0}%", self.0 * 100.0)
    }
}

// =============================================================================
// Properties
// =============================================================================

/// Why a source currently holds no data.
///
/// Upstream unavailability is surfaced here rather than as an error so
/// consumers can render an explanatory state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EmptyReason {
    #[default]
    None,
    SourceDoesNotExist,
    SourceCannotBeAccessed,
}

/// A consistent snapshot of all queryable properties of a source.
///
/// Sources replace their snapshot in one step so a reader never observes a
/// mix of old and new values.
#[derive(Debug, Clone, PartialEq)]
pub struct Properties {
    /// Number of rows currently exposed.
    pub log_entry_count: usize,
    /// Size of the underlying data in bytes, if known.
    pub size: Option<u64>,
    /// Last modification time of the underlying data, if known.
    pub last_modified: Option<DateTime<Utc>>,
    /// Earliest timestamp of any row.
    pub start_timestamp: Option<DateTime<Utc>>,
    /// Latest timestamp of any row.
    pub end_timestamp: Option<DateTime<Utc>>,
    /// `end_timestamp - start_timestamp`.
    pub duration: Option<TimeDelta>,
    /// How much of the available upstream data has been processed.
    pub percentage_processed: Percentage,
    /// Set when the source is empty because its data is unavailable.
    pub empty_reason: EmptyReason,
    /// Length (in chars) of the longest raw line seen.
    pub max_characters_per_line: usize,
}

impl Default for Properties {
    fn default() -> Self {
        Self {
            log_entry_count: 0,
            size: None,
            last_modified: None,
            start_timestamp: None,
            end_timestamp: None,
            duration: None,
            percentage_processed: Percentage::ZERO,
            empty_reason: EmptyReason::None,
            max_characters_per_line: 0,
        }
    }
}

impl Properties {
    /// Recomputes `duration` from the start and end timestamps.
    pub fn update_duration(&mut self) {
        self.duration = match (self.start_timestamp, self.end_timestamp) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        };
    }

    pub fn is_processing_complete(&self) -> bool {
        self.percentage_processed.is_complete()
    }
}

// =============================================================================
// LogEntry
// =============================================================================

/// One row worth of column values, detached from any source.
///
/// Columns that were not captured read as their default value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogEntry {
    cells: Vec<(Column, Value)>,
}

impl LogEntry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`LogEntry::set`].
    pub fn with(mut self, column: &Column, value: Value) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: &Column, value: Value) {
        match self.cells.iter_mut().find(|(c, _)| c == column) {
            Some((_, slot)) => *slot = value,
            None => self.cells.push((column.clone(), value)),
        }
    }

    pub fn contains(&self, column: &Column) -> bool {
        self.cells.iter().any(|(c, _)| c == column)
    }

    /// The value of `column`, or its default when not captured.
    pub fn get<'a>(&'a self, column: &'a Column) -> &'a Value {
        self.cells
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v)
            .unwrap_or_else(|| column.default_value())
    }

    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.cells.iter().map(|(c, _)| c)
    }

    pub fn index(&self) -> LineIndex {
        self.get(&column::INDEX)
            .as_line()
            .unwrap_or(LineIndex::INVALID)
    }

    pub fn original_index(&self) -> LineIndex {
        self.get(&column::ORIGINAL_INDEX)
            .as_line()
            .unwrap_or(LineIndex::INVALID)
    }

    pub fn entry_index(&self) -> EntryIndex {
        self.get(&column::LOG_ENTRY_INDEX)
            .as_entry()
            .unwrap_or(EntryIndex::INVALID)
    }

    pub fn raw_content(&self) -> Option<&str> {
        self.get(&column::RAW_CONTENT).as_text()
    }

    pub fn level(&self) -> Severity {
        self.get(&column::LOG_LEVEL).as_level().unwrap_or_default()
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.get(&column::TIMESTAMP).as_timestamp()
    }

    pub fn source_id(&self) -> SourceId {
        self.get(&column::SOURCE_ID).as_source().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_entry_defaults_for_absent_columns() {
        let entry = LogEntry::new()
            .with(&column::RAW_CONTENT, Value::Text(Some("hello".into())))
            .with(&column::LOG_LEVEL, Value::Level(Severity::Warning));
        assert_eq!(entry.raw_content(), Some("hello"));
        assert_eq!(entry.level(), Severity::Warning);
        assert_eq!(entry.timestamp(), None);
        assert_eq!(entry.index(), LineIndex::INVALID);
        assert!(!entry.contains(&column::TIMESTAMP));
    }

    #[test]
    fn test_log_entry_default_outlives_lookup_column() {
        let entry = LogEntry::new().with(&column::RAW_CONTENT, Value::Text(Some("x".into())));
        let thread = Column::custom("thread", Value::Text(Some("main".into())));
        let value = entry.get(&thread);
        assert_eq!(value.as_text(), Some("main"));

        // Accessors hand out borrows of the entry or of a static column.
        let raw: &str = entry.raw_content().unwrap_or_default();
        let level: &Value = entry.get(&column::LOG_LEVEL);
        assert_eq!((raw, level), ("x", column::LOG_LEVEL.default_value()));
    }

    #[test]
    fn test_log_entry_set_replaces() {
        let mut entry = LogEntry::new().with(&column::LOG_LEVEL, Value::Level(Severity::Info));
        entry.set(&column::LOG_LEVEL, Value::Level(Severity::Error));
        assert_eq!(entry.level(), Severity::Error);
        assert_eq!(entry.columns().count(), 1);
    }

    #[test]
    fn test_invalid_line_index_arithmetic_stays_invalid() {
        assert_eq!(LineIndex::INVALID + 5, LineIndex::INVALID);
        assert_eq!(LineIndex::from(0usize) - 1, LineIndex::INVALID);
        assert_eq!(LineIndex::from(3usize) - 1, LineIndex::from(2usize));
    }

    #[test]
    fn test_line_index_within() {
        assert_eq!(LineIndex::from(2usize).within(3), Some(2));
        assert_eq!(LineIndex::from(3usize).within(3), None);
        assert_eq!(LineIndex::INVALID.within(3), None);
    }

    #[test]
    fn test_entry_index_next() {
        assert_eq!(EntryIndex::INVALID.next(), EntryIndex::new(0));
        assert_eq!(EntryIndex::new(4).next(), EntryIndex::new(5));
    }

    #[test]
    fn test_percentage_of_empty_is_complete() {
        assert!(Percentage::of(0, 0).is_complete());
        assert!(!Percentage::of(1, 2).is_complete());
        assert!(Percentage::of(5, 2).is_complete());
    }

    #[test]
    fn test_percentage_product() {
        let half = Percentage::of(1, 2);
        assert_eq!((half * half).ratio(), 0.25);
        assert!((Percentage::HUNDRED * Percentage::HUNDRED).is_complete());
    }

    #[test]
    fn test_severity_keywords() {
        assert_eq!(Severity::from_keyword("WARN"), Some(Severity::Warning));
        assert_eq!(Severity::from_keyword("fatal"), Some(Severity::Critical));
        assert_eq!(Severity::from_keyword("banana"), None);
        assert!(!Severity::None.marks_entry_start());
        assert!(Severity::Debug.marks_entry_start());
    }

    #[test]
    fn test_duration_follows_timestamps() {
        let start = DateTime::from_timestamp(100, 0).unwrap();
        let end = DateTime::from_timestamp(160, 0).unwrap();
        let mut props = Properties {
            start_timestamp: Some(start),
            end_timestamp: Some(end),
            ..Default::default()
        };
        props.update_duration();
        assert_eq!(props.duration, Some(TimeDelta::seconds(60)));
    }
}
