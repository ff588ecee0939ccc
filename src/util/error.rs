// LogWeave - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// No string-based error propagation (DevWorkflow Part A Rule 2).
// All errors preserve the causal chain for diagnostic logging.
//
// Note that most runtime problems inside the processing pipeline are NOT
// errors in this sense: tick callbacks, listener deliveries and predicates
// log and carry on. The types below cover construction, configuration and
// import failures that a caller can act on.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Top-level error type for all LogWeave operations.
/// Errors are categorised by the subsystem that produced them.
#[derive(Debug)]
pub enum LogWeaveError {
    /// Constructing or wiring a log source failed.
    Source(SourceError),

    /// The task scheduler could not be created.
    Scheduler(SchedulerError),

    /// Filter construction failed.
    Filter(FilterError),

    /// Importing a text file failed.
    Import(ImportError),

    /// Configuration loading or validation failed.
    Config(ConfigError),

    /// I/O error with path context.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: io::Error,
    },
}

impl fmt::Display for LogWeaveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source(e) => write!(f, "Source error: {e}"),
            Self::Scheduler(e) => write!(f, "Scheduler error: {e}"),
            Self::Filter(e) => write!(f, "Filter error: {e}"),
            Self::Import(e) => write!(f, "Import error: {e}"),
            Self::Config(e) => write!(f, "Configuration error: {e}"),
            Self::Io {
                path,
                operation,
                source,
            } => write!(
                f,
                "I/O error during {operation} on '{}': {source}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for LogWeaveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Source(e) => Some(e),
            Self::Scheduler(e) => Some(e),
            Self::Filter(e) => Some(e),
            Self::Import(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::Io { source, .. } => Some(source),
        }
    }
}

// ---------------------------------------------------------------------------
// Source errors
// ---------------------------------------------------------------------------

/// Errors raised while constructing log sources.
#[derive(Debug)]
pub enum SourceError {
    /// A merge was given more sources than a merged row can attribute.
    TooManySources { count: usize, max: usize },
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooManySources { count, max } => write!(
                f,
                "Cannot merge {count} sources, at most {max} sources are supported"
            ),
        }
    }
}

impl std::error::Error for SourceError {}

impl From<SourceError> for LogWeaveError {
    fn from(e: SourceError) -> Self {
        Self::Source(e)
    }
}

// ---------------------------------------------------------------------------
// Scheduler errors
// ---------------------------------------------------------------------------

/// Errors related to creating the default task scheduler.
#[derive(Debug)]
pub enum SchedulerError {
    /// The worker thread pool could not be built.
    ThreadPool { source: rayon::ThreadPoolBuildError },

    /// The timer thread could not be spawned.
    TimerThread { source: io::Error },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ThreadPool { source } => write!(f, "Failed to build worker pool: {source}"),
            Self::TimerThread { source } => write!(f, "Failed to spawn timer thread: {source}"),
        }
    }
}

impl std::error::Error for SchedulerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ThreadPool { source } => Some(source),
            Self::TimerThread { source } => Some(source),
        }
    }
}

impl From<SchedulerError> for LogWeaveError {
    fn from(e: SchedulerError) -> Self {
        Self::Scheduler(e)
    }
}

// ---------------------------------------------------------------------------
// Filter errors
// ---------------------------------------------------------------------------

/// Errors related to filter operations.
#[derive(Debug)]
pub enum FilterError {
    /// User-provided regex is invalid.
    InvalidRegex {
        pattern: String,
        source: regex::Error,
    },
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRegex { pattern, source } => {
                write!(f, "Invalid filter regex '{pattern}': {source}")
            }
        }
    }
}

impl std::error::Error for FilterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidRegex { source, .. } => Some(source),
        }
    }
}

impl From<FilterError> for LogWeaveError {
    fn from(e: FilterError) -> Self {
        Self::Filter(e)
    }
}

// ---------------------------------------------------------------------------
// Import errors
// ---------------------------------------------------------------------------

/// Errors related to importing a text file into an in-memory source.
#[derive(Debug)]
pub enum ImportError {
    /// File exceeds the maximum size the importer loads into memory.
    FileTooLarge {
        path: PathBuf,
        size: u64,
        max_size: u64,
    },

    /// I/O error while reading the file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileTooLarge {
                path,
                size,
                max_size,
            } => write!(
                f,
                "'{}' is {size} bytes, exceeds maximum of {max_size} bytes",
                path.display()
            ),
            Self::Io { path, source } => {
                write!(f, "'{}': I/O error: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ImportError> for LogWeaveError {
    fn from(e: ImportError) -> Self {
        Self::Import(e)
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors related to configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    /// TOML parsing failed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// I/O error reading config file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Config parse error '{}': {source}", path.display())
            }
            Self::Io { path, source } => {
                write!(f, "Config I/O error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
        }
    }
}

impl From<ConfigError> for LogWeaveError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Convenience type alias for LogWeave results.
pub type Result<T> = std::result::Result<T, LogWeaveError>;
