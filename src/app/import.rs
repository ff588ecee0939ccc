// LogWeave - app/import.rs
//
// Minimal text importer: loads a whole text file into an in-memory source.
//
// Each line becomes one row carrying its raw text, a best-effort timestamp
// and a best-effort level. Lines without either are left for the multi-line
// grouping transform to attach to the preceding entry. There is no encoding
// detection (invalid UTF-8 is replaced) and no watching.

use crate::core::column::{self, Value};
use crate::core::model::{EmptyReason, LogEntry, Severity};
use crate::sources::InMemoryLogSource;
use crate::util::constants::{MAX_IMPORT_FILE_SIZE, MAX_IMPORT_LINE_CHARS};
use crate::util::error::ImportError;
use crate::util::logging;
use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use regex::Regex;
use std::io;
use std::path::Path;
use std::sync::{Arc, OnceLock};

/// Imports `path` into a new in-memory source named after the file.
///
/// A missing or unreadable file is not an error: the returned source is
/// empty and reports why through its `empty_reason` property.
pub fn import_file(path: &Path) -> Result<Arc<InMemoryLogSource>, ImportError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let source = InMemoryLogSource::new(name, &[]);

    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) => return unavailable(path, source, e),
    };
    if metadata.len() > MAX_IMPORT_FILE_SIZE {
        return Err(ImportError::FileTooLarge {
            path: path.to_path_buf(),
            size: metadata.len(),
            max_size: MAX_IMPORT_FILE_SIZE,
        });
    }

    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => return unavailable(path, source, e),
    };
    let content = String::from_utf8_lossy(&bytes);
    let entries: Vec<LogEntry> = content.lines().map(parse_line).collect();
    let count = entries.len();

    source.set_size(Some(metadata.len()));
    source.set_last_modified(metadata.modified().ok().map(DateTime::<Utc>::from));
    source.add_entries(entries);

    tracing::info!(
        file = %path.display(),
        lines = count,
        bytes = metadata.len(),
        "Imported file"
    );
    Ok(source)
}

/// Maps "not found" and "permission denied" onto an empty source; other
/// I/O failures are errors.
fn unavailable(
    path: &Path,
    source: Arc<InMemoryLogSource>,
    error: io::Error,
) -> Result<Arc<InMemoryLogSource>, ImportError> {
    let reason = match error.kind() {
        io::ErrorKind::NotFound => EmptyReason::SourceDoesNotExist,
        io::ErrorKind::PermissionDenied => EmptyReason::SourceCannotBeAccessed,
        _ => {
            return Err(ImportError::Io {
                path: path.to_path_buf(),
                source: error,
            })
        }
    };
    tracing::warn!(file = %path.display(), error = %error, ?reason, "File unavailable");
    source.set_empty_reason(reason);
    Ok(source)
}

/// Builds the row for one line of text.
pub fn parse_line(line: &str) -> LogEntry {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let raw: String = if line.chars().count() > MAX_IMPORT_LINE_CHARS {
        tracing::debug!(
            preview = logging::preview(line),
            "Truncating overlong line"
        );
        line.chars().take(MAX_IMPORT_LINE_CHARS).collect()
    } else {
        line.to_string()
    };

    let timestamp = sniff_timestamp(&raw);
    let level = detect_level(&raw);
    LogEntry::new()
        .with(&column::RAW_CONTENT, Value::Text(Some(raw)))
        .with(&column::TIMESTAMP, Value::Timestamp(timestamp))
        .with(&column::LOG_LEVEL, Value::Level(level))
}

/// Finds the first level keyword in `line`.
pub fn detect_level(line: &str) -> Severity {
    static LEVEL_RE: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(re) = LEVEL_RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(fatal|critical|crit|error|err|warning|warn|information|info|debug|dbg|trace|trc)\b",
        )
        .ok()
    }) else {
        return Severity::None;
    };
    re.find(line)
        .and_then(|m| Severity::from_keyword(m.as_str()))
        .unwrap_or(Severity::None)
}

/// Try to find and parse any recognisable timestamp embedded anywhere in
/// `line`, returning the first successful result.
///
/// Patterns are tried from most-precise (RFC 3339 with explicit timezone)
/// to least-precise (year-less BSD syslog), so higher-confidence results
/// take priority over looser matches on the same line.
pub fn sniff_timestamp(line: &str) -> Option<DateTime<Utc>> {
    struct Sniffer {
        re: Regex,
        parse: fn(&str) -> Option<DateTime<Utc>>,
    }

    fn naive(s: &str, formats: &[&str]) -> Option<DateTime<Utc>> {
        formats
            .iter()
            .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
            .map(|ndt| ndt.and_utc())
    }

    static SNIFFERS: OnceLock<Vec<Sniffer>> = OnceLock::new();

    let sniffers = SNIFFERS.get_or_init(|| {
        let tiers: [(&str, fn(&str) -> Option<DateTime<Utc>>); 7] = [
            // RFC 3339 with explicit timezone: 2024-01-15T14:30:22.123+05:30
            (
                r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:\d{2})",
                |s| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.into()),
            ),
            // log4j comma millis: 2024-01-15 14:30:22,123
            (r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2},\d+", |s| {
                let s = s.replace(',', ".").replace('T', " ");
                naive(&s, &["%Y-%m-%d %H:%M:%S%.f"])
            }),
            // ISO without timezone: 2024-01-15 14:30:22[.123]
            (r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?", |s| {
                let s = s.replace('T', " ");
                naive(&s, &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"])
            }),
            // Slash year-first: 2024/01/15 14:30:22
            (r"\d{4}/\d{2}/\d{2}[ T]\d{2}:\d{2}:\d{2}(?:\.\d+)?", |s| {
                let s = s.replace('/', "-").replace('T', " ");
                naive(&s, &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"])
            }),
            // Dot day-first: 26.02.2026 22:07:56.535
            (r"\d{2}\.\d{2}\.\d{4} \d{2}:\d{2}:\d{2}(?:\.\d+)?", |s| {
                naive(s, &["%d.%m.%Y %H:%M:%S%.f", "%d.%m.%Y %H:%M:%S"])
            }),
            // Apache combined: 15/Jan/2024:14:30:22 +0000
            (r"\d{2}/[A-Za-z]{3}/\d{4}:\d{2}:\d{2}:\d{2} [+-]\d{4}", |s| {
                DateTime::parse_from_str(s, "%d/%b/%Y:%H:%M:%S %z")
                    .ok()
                    .map(|dt| dt.into())
            }),
            // BSD syslog, year-less: Jan 15 14:30:22 (current year assumed)
            (r"[A-Z][a-z]{2} [ \d]\d \d{2}:\d{2}:\d{2}", |s| {
                let with_year = format!("{} {s}", Utc::now().year());
                naive(&with_year, &["%Y %b %e %H:%M:%S"])
            }),
        ];
        tiers
            .into_iter()
            .filter_map(|(pattern, parse)| match Regex::new(pattern) {
                Ok(re) => Some(Sniffer { re, parse }),
                Err(e) => {
                    tracing::error!(pattern, error = %e, "Invalid timestamp pattern");
                    None
                }
            })
            .collect()
    });

    sniffers.iter().find_map(|sniffer| {
        sniffer
            .re
            .find(line)
            .and_then(|m| (sniffer.parse)(m.as_str()))
    })
}
