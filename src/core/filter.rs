// LogWeave - core/filter.rs
//
// Predicates used by the filtering transform.
// All active criteria of a `FilterState` are AND-combined.
// Core layer: pure logic, no I/O.
//
// Two granularities exist:
//   - `LogLineFilter` judges a single row;
//   - `LogEntryFilter` judges a whole logical (multi-line) entry.
// The filtering transform retains an entry when at least one of its rows
// passes the line filter and the entry passes the entry filter.

use crate::core::model::{LogEntry, Severity};
use crate::util::error::FilterError;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashSet;

/// Judges a single row.
pub trait LogLineFilter: Send + Sync {
    fn passes_line(&self, line: &LogEntry) -> bool;
}

/// Judges a logical entry given all of its rows (at least one).
pub trait LogEntryFilter: Send + Sync {
    fn passes_entry(&self, lines: &[LogEntry]) -> bool;
}

impl<F> LogLineFilter for F
where
    F: Fn(&LogEntry) -> bool + Send + Sync,
{
    fn passes_line(&self, line: &LogEntry) -> bool {
        self(line)
    }
}

impl<F> LogEntryFilter for F
where
    F: Fn(&[LogEntry]) -> bool + Send + Sync,
{
    fn passes_entry(&self, lines: &[LogEntry]) -> bool {
        self(lines)
    }
}

/// Complete filter state. All fields are AND-combined when applied.
#[derive(Debug, Clone, Default)]
pub struct FilterState {
    /// Severity levels to include (empty = all).
    pub severity_levels: HashSet<Severity>,

    /// Start of time range (inclusive). None = no lower bound.
    pub time_start: Option<DateTime<Utc>>,

    /// End of time range (inclusive). None = no upper bound.
    pub time_end: Option<DateTime<Utc>>,

    /// Substring text search (case-insensitive). Empty = no filter.
    pub text_search: String,

    /// Compiled regex search. None = no regex filter.
    pub regex_search: Option<Regex>,
}

impl FilterState {
    /// Returns true if no filters are active.
    pub fn is_empty(&self) -> bool {
        self.severity_levels.is_empty()
            && self.time_start.is_none()
            && self.time_end.is_none()
            && self.text_search.is_empty()
            && self.regex_search.is_none()
    }

    /// Set the regex search pattern, compiling it.
    /// Returns an error if the pattern is invalid.
    pub fn set_regex(&mut self, pattern: &str) -> Result<(), FilterError> {
        if pattern.is_empty() {
            self.regex_search = None;
            return Ok(());
        }
        let regex = Regex::new(pattern).map_err(|e| FilterError::InvalidRegex {
            pattern: pattern.to_string(),
            source: e,
        })?;
        self.regex_search = Some(regex);
        Ok(())
    }

    /// Create a quick-filter for errors only.
    pub fn errors_only() -> Self {
        Self {
            severity_levels: [Severity::Critical, Severity::Error].into_iter().collect(),
            ..Default::default()
        }
    }

    /// Create a quick-filter for errors and warnings.
    pub fn errors_and_warnings() -> Self {
        Self {
            severity_levels: [Severity::Critical, Severity::Error, Severity::Warning]
                .into_iter()
                .collect(),
            ..Default::default()
        }
    }

    fn passes_level_and_time(&self, line: &LogEntry) -> bool {
        // Severity filter
        if !self.severity_levels.is_empty() && !self.severity_levels.contains(&line.level()) {
            return false;
        }

        // Time range filter. Rows without timestamps are excluded.
        if let Some(ref start) = self.time_start {
            match line.timestamp() {
                Some(ts) if ts < *start => return false,
                None => return false,
                _ => {}
            }
        }
        if let Some(ref end) = self.time_end {
            match line.timestamp() {
                Some(ts) if ts > *end => return false,
                None => return false,
                _ => {}
            }
        }
        true
    }

    fn passes_text(&self, line: &LogEntry) -> bool {
        let raw = line.raw_content().unwrap_or("");

        // Text search (case-insensitive substring)
        if !self.text_search.is_empty()
            && !raw
                .to_lowercase()
                .contains(&self.text_search.to_lowercase())
        {
            return false;
        }

        // Regex search
        if let Some(ref regex) = self.regex_search {
            if !regex.is_match(raw) {
                return false;
            }
        }
        true
    }
}

impl LogLineFilter for FilterState {
    fn passes_line(&self, line: &LogEntry) -> bool {
        self.passes_level_and_time(line) && self.passes_text(line)
    }
}

impl LogEntryFilter for FilterState {
    /// Level and time are judged on the first row; text criteria pass when
    /// any row of the entry matches.
    fn passes_entry(&self, lines: &[LogEntry]) -> bool {
        let Some(first) = lines.first() else {
            return false;
        };
        self.passes_level_and_time(first) && lines.iter().any(|line| self.passes_text(line))
    }
}
