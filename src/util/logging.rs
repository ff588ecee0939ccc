// LogWeave - util/logging.rs
//
// Structured logging with runtime-selectable debug mode.
// DevWorkflow Part A Rule 10: debug mode, structured timestamps,
// accessible channel, zero overhead when disabled.
//
// Activation:
//   - Environment variable: RUST_LOG=debug (or trace)
//   - CLI flag: --debug (sets RUST_LOG=debug)
//   - Config file: [logging] level = "debug"
//
// Output: stderr by default, or the file named by [logging] file.
// Never logs secrets, tokens, or PII at any level.

use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Initialise the logging subsystem.
///
/// `debug_flag` is true when the user passed --debug on the CLI.
/// `config_level` is the level from config.toml (if present).
/// `log_file` is the optional log file path from config.toml.
///
/// Priority: RUST_LOG env var > CLI --debug flag > config level > default "info".
pub fn init(debug_flag: bool, config_level: Option<&str>, log_file: Option<&str>) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if debug_flag {
        EnvFilter::new("debug")
    } else if let Some(level) = config_level {
        EnvFilter::new(level)
    } else {
        EnvFilter::new(super::constants::DEFAULT_LOG_LEVEL)
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .compact();

    // A log file that cannot be opened falls back to stderr; the failure is
    // reported once the subscriber is installed.
    let mut file_error = None;
    let file = log_file.and_then(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| file_error = Some((path.to_string(), e)))
            .ok()
    });

    // try_init: tests and embedding applications may already have installed
    // a global subscriber.
    let installed = match file {
        Some(file) => builder
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .try_init()
            .is_ok(),
        None => builder.with_writer(std::io::stderr).try_init().is_ok(),
    };

    if let Some((path, e)) = file_error {
        tracing::warn!(file = %path, error = %e, "Cannot open log file; logging to stderr");
    }

    tracing::debug!(
        app = super::constants::APP_NAME,
        version = super::constants::APP_VERSION,
        installed,
        "Logging initialised"
    );
}

/// Shortens `text` for inclusion in debug output (see `DEBUG_MAX_LINE_PREVIEW`).
pub fn preview(text: &str) -> &str {
    let max = super::constants::DEBUG_MAX_LINE_PREVIEW;
    match text.char_indices().nth(max) {
        Some((byte_pos, _)) => &text[..byte_pos],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_keeps_short_lines() {
        assert_eq!(preview("hello"), "hello");
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "ä".repeat(super::super::constants::DEBUG_MAX_LINE_PREVIEW + 10);
        let short = preview(&long);
        assert_eq!(
            short.chars().count(),
            super::super::constants::DEBUG_MAX_LINE_PREVIEW
        );
    }
}
