// LogWeave - platform/config.rs
//
// Platform-specific configuration directory resolution and config.toml
// loading with startup validation (DevWorkflow Part A Rule 13).
//
// Uses the `directories` crate for XDG (Linux), AppData (Windows),
// Library (macOS) compliance.

use crate::util::constants;
use crate::util::error::ConfigError;
use std::fmt::Display;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

/// Resolved platform paths for LogWeave configuration and data.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Configuration directory (e.g. ~/.config/logweave/ or %APPDATA%\LogWeave\config\)
    pub config_dir: PathBuf,

    /// Data directory for log output and caches.
    pub data_dir: PathBuf,
}

impl PlatformPaths {
    /// Resolve platform-appropriate paths.
    ///
    /// Falls back to current directory if platform dirs cannot be determined.
    pub fn resolve() -> Self {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", constants::APP_ID) {
            let config_dir = proj_dirs.config_dir().to_path_buf();
            let data_dir = proj_dirs.data_dir().to_path_buf();

            tracing::debug!(
                config = %config_dir.display(),
                data = %data_dir.display(),
                "Platform paths resolved"
            );

            Self {
                config_dir,
                data_dir,
            }
        } else {
            tracing::warn!("Could not determine platform directories, using current directory");
            let fallback = PathBuf::from(".");
            Self {
                config_dir: fallback.clone(),
                data_dir: fallback,
            }
        }
    }

    /// Location of config.toml.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(constants::CONFIG_FILE_NAME)
    }
}

// =============================================================================
// config.toml loading and validation (Rule 13)
// =============================================================================

/// Raw deserialisable shape of config.toml.
///
/// Unknown keys are silently ignored for forward compatibility -- a newer
/// config file can be used with an older binary without crashing.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawConfig {
    /// `[processing]` section.
    pub processing: ProcessingSection,
    /// `[scheduler]` section.
    pub scheduler: SchedulerSection,
    /// `[logging]` section.
    pub logging: LoggingSection,
}

/// `[processing]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct ProcessingSection {
    /// Maximum time a transform lets its upstream batch changes (ms).
    pub max_wait_ms: Option<u64>,
    /// Maximum rows per notification requested from an upstream.
    pub listener_batch_size: Option<usize>,
    /// Maximum upstream rows consumed per tick.
    pub max_lines_per_tick: Option<usize>,
}

/// `[scheduler]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    /// Number of worker threads (0 = auto).
    pub worker_threads: Option<usize>,
}

/// `[logging]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: Option<String>,
    /// Log file path (empty = stderr only).
    pub file: Option<String>,
}

/// Validated application configuration derived from `config.toml`.
///
/// All values are validated against named constants at load time (Rule 13).
/// Invalid values produce actionable warnings and fall back to defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    // -- Processing --
    /// Maximum listener wait and idle tick delay (ms).
    pub maximum_wait_ms: u64,
    /// Maximum rows per upstream notification.
    pub listener_batch_size: usize,
    /// Maximum upstream rows consumed per tick.
    pub max_lines_per_tick: usize,

    // -- Scheduler --
    /// Worker threads (0 = one per CPU).
    pub worker_threads: usize,

    // -- Logging --
    /// Logging level string (for init before tracing is available).
    pub log_level: Option<String>,
    /// Log file path.
    pub log_file: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            maximum_wait_ms: constants::DEFAULT_MAXIMUM_WAIT_MS,
            listener_batch_size: constants::DEFAULT_LISTENER_BATCH_SIZE,
            max_lines_per_tick: constants::DEFAULT_MAX_LINES_PER_TICK,
            worker_threads: constants::DEFAULT_WORKER_THREADS,
            log_level: None,
            log_file: None,
        }
    }
}

/// Load and validate `config.toml` from the given config directory.
///
/// Returns `AppConfig` with validated values and a list of non-fatal warnings.
/// If the file does not exist, returns defaults with no warnings (first-run).
/// If the file is unreadable or unparseable, returns defaults with a warning
/// (the application still starts but the user is informed).
pub fn load_config(config_dir: &Path) -> (AppConfig, Vec<String>) {
    let config_path = config_dir.join(constants::CONFIG_FILE_NAME);

    if !config_path.exists() {
        tracing::debug!(path = %config_path.display(), "No config.toml found; using defaults");
        return (AppConfig::default(), Vec::new());
    }

    match load_config_file(&config_path) {
        Ok(loaded) => loaded,
        Err(e) => {
            let msg = format!("{e}. Using defaults.");
            tracing::warn!("{}", msg);
            (AppConfig::default(), vec![msg])
        }
    }
}

/// Load and validate an explicitly named config file.
///
/// Unlike `load_config`, a missing or malformed file is an error: the user
/// asked for this file.
pub fn load_config_file(path: &Path) -> Result<(AppConfig, Vec<String>), ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let raw: RawConfig = toml::from_str(&content).map_err(|source| ConfigError::TomlParse {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %path.display(), "Loaded config.toml");
    Ok(validate(raw))
}

/// Checks one optional numeric value against its allowed range.
fn check_range<T>(
    field: &str,
    value: Option<T>,
    range: RangeInclusive<T>,
    target: &mut T,
    warnings: &mut Vec<String>,
) where
    T: PartialOrd + Display + Copy,
{
    let Some(value) = value else {
        return;
    };
    if range.contains(&value) {
        *target = value;
    } else {
        warnings.push(format!(
            "{field} = {value} is out of range ({}-{}). Using default ({}).",
            range.start(),
            range.end(),
            target,
        ));
    }
}

/// Validates each field against named constants, accumulating all problems.
pub fn validate(raw: RawConfig) -> (AppConfig, Vec<String>) {
    let mut config = AppConfig::default();
    let mut warnings: Vec<String> = Vec::new();

    check_range(
        "[processing] max_wait_ms",
        raw.processing.max_wait_ms,
        constants::MIN_MAXIMUM_WAIT_MS..=constants::MAX_MAXIMUM_WAIT_MS,
        &mut config.maximum_wait_ms,
        &mut warnings,
    );
    check_range(
        "[processing] listener_batch_size",
        raw.processing.listener_batch_size,
        constants::MIN_LISTENER_BATCH_SIZE..=constants::MAX_LISTENER_BATCH_SIZE,
        &mut config.listener_batch_size,
        &mut warnings,
    );
    check_range(
        "[processing] max_lines_per_tick",
        raw.processing.max_lines_per_tick,
        constants::MIN_MAX_LINES_PER_TICK..=constants::MAX_MAX_LINES_PER_TICK,
        &mut config.max_lines_per_tick,
        &mut warnings,
    );
    check_range(
        "[scheduler] worker_threads",
        raw.scheduler.worker_threads,
        0..=constants::ABSOLUTE_MAX_WORKER_THREADS,
        &mut config.worker_threads,
        &mut warnings,
    );

    // -- Logging: level --
    if let Some(ref level) = raw.logging.level {
        let valid = ["error", "warn", "info", "debug", "trace"];
        if valid.contains(&level.to_lowercase().as_str()) {
            config.log_level = Some(level.to_lowercase());
        } else {
            warnings.push(format!(
                "[logging] level = \"{level}\" is not recognised. \
                 Valid values: error, warn, info, debug, trace. Using default ({}).",
                constants::DEFAULT_LOG_LEVEL,
            ));
        }
    }

    // -- Logging: file --
    if let Some(ref file) = raw.logging.file {
        if !file.is_empty() {
            config.log_file = Some(file.clone());
        }
    }

    if !warnings.is_empty() {
        tracing::warn!(
            count = warnings.len(),
            "Config validation produced warnings"
        );
    }

    (config, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, content: &str) {
        std::fs::write(dir.join(constants::CONFIG_FILE_NAME), content).unwrap();
    }

    #[test]
    fn test_config_file_lives_in_config_dir() {
        let paths = PlatformPaths::resolve();
        let file = paths.config_file();
        assert_eq!(file.parent(), Some(paths.config_dir.as_path()));
        assert!(file.ends_with(constants::CONFIG_FILE_NAME));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (config, warnings) = load_config(dir.path());
        assert_eq!(config, AppConfig::default());
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_valid_values_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            r#"
[processing]
max_wait_ms = 250
listener_batch_size = 500
max_lines_per_tick = 2000

[scheduler]
worker_threads = 3

[logging]
level = "DEBUG"
file = "/tmp/logweave.log"

[unknown]
ignored = true
"#,
        );
        let (config, warnings) = load_config(dir.path());
        assert!(warnings.is_empty(), "{warnings:?}");
        assert_eq!(config.maximum_wait_ms, 250);
        assert_eq!(config.listener_batch_size, 500);
        assert_eq!(config.max_lines_per_tick, 2000);
        assert_eq!(config.worker_threads, 3);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.log_file.as_deref(), Some("/tmp/logweave.log"));
    }

    #[test]
    fn test_out_of_range_values_warn_and_keep_defaults() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            r#"
[processing]
max_wait_ms = 999999
max_lines_per_tick = 1

[logging]
level = "loud"
"#,
        );
        let (config, warnings) = load_config(dir.path());
        assert_eq!(warnings.len(), 3, "{warnings:?}");
        assert_eq!(config.maximum_wait_ms, constants::DEFAULT_MAXIMUM_WAIT_MS);
        assert_eq!(config.max_lines_per_tick, constants::DEFAULT_MAX_LINES_PER_TICK);
        assert!(config.log_level.is_none());
        assert!(warnings[0].contains("max_wait_ms"));
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "[processing\nmax_wait_ms = ");
        let (config, warnings) = load_config(dir.path());
        assert_eq!(config, AppConfig::default());
        assert_eq!(warnings.len(), 1);

        let path = dir.path().join(constants::CONFIG_FILE_NAME);
        assert!(matches!(
            load_config_file(&path),
            Err(ConfigError::TomlParse { .. })
        ));
        assert!(matches!(
            load_config_file(&dir.path().join("absent.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
