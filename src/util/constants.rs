// LogWeave - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.
// Referenced by DevWorkflow Part A Rule 11 (explicit named-constant limits).

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "LogWeave";

/// Application identifier used for config/data directories.
pub const APP_ID: &str = "LogWeave";

/// Current application version (updated by release script).
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Listener batching
// =============================================================================

/// Default maximum time a listener waits before pending changes are delivered.
///
/// Transforms register with their upstream using this wait time and also use
/// it as their idle tick delay.
pub const DEFAULT_MAXIMUM_WAIT_MS: u64 = 100;

/// Minimum user-configurable maximum wait time (ms).
pub const MIN_MAXIMUM_WAIT_MS: u64 = 0;

/// Maximum user-configurable maximum wait time (ms).
pub const MAX_MAXIMUM_WAIT_MS: u64 = 10_000;

/// Maximum number of rows a merged source asks each upstream to batch into a
/// single notification.
pub const MERGE_BATCH_SIZE_PER_SOURCE: usize = 1_000;

/// Maximum number of rows a single-upstream transform (filter, multi-line)
/// asks its upstream to batch into a single notification.
pub const DEFAULT_LISTENER_BATCH_SIZE: usize = 10_000;

/// Minimum user-configurable listener batch size.
pub const MIN_LISTENER_BATCH_SIZE: usize = 1;

/// Maximum user-configurable listener batch size.
pub const MAX_LISTENER_BATCH_SIZE: usize = 1_000_000;

// =============================================================================
// Per-tick processing budgets (Rule 11: growing-collection bounds)
// =============================================================================

/// Maximum number of upstream rows a transform consumes in one tick.
///
/// A large backlog is drained over many ticks instead of stalling a scheduler
/// thread; percentage-processed reflects the partial progress.
pub const DEFAULT_MAX_LINES_PER_TICK: usize = 5_000;

/// Minimum user-configurable per-tick budget.
pub const MIN_MAX_LINES_PER_TICK: usize = 100;

/// Maximum user-configurable per-tick budget.
pub const MAX_MAX_LINES_PER_TICK: usize = 1_000_000;

/// Number of upstream rows the filter reads in one chunk.
pub const FILTER_READ_CHUNK_SIZE: usize = 1_000;

/// Number of rows fetched per step when searching backwards for the first
/// line of a multi-line entry.
pub const ENTRY_START_SEARCH_CHUNK: usize = 64;

// =============================================================================
// Merge limits
// =============================================================================

/// Hard upper bound on the number of sources a single merge accepts.
///
/// Merged rows store their source attribution in a `u8`.
pub const MAX_MERGED_SOURCES: usize = u8::MAX as usize;

// =============================================================================
// Scheduler
// =============================================================================

/// Default number of worker threads of the default task scheduler.
/// 0 means auto-detect (use available CPU cores).
pub const DEFAULT_WORKER_THREADS: usize = 0;

/// Hard upper bound on configured worker threads.
pub const ABSOLUTE_MAX_WORKER_THREADS: usize = 64;

/// Delay used when a periodic callback panicked and had no chance to report
/// its own next delay.
pub const PANICKED_TASK_RETRY_MS: u64 = 1_000;

// =============================================================================
// Import (text file producer)
// =============================================================================

/// Maximum size of a text file the importer loads into memory.
pub const MAX_IMPORT_FILE_SIZE: u64 = 512 * 1024 * 1024; // 512 MB

/// Maximum number of characters kept per imported line. Longer lines are
/// truncated to prevent unbounded memory from malformed files.
pub const MAX_IMPORT_LINE_CHARS: usize = 64 * 1024;

/// Default time the CLI waits for the pipeline to finish processing.
pub const DEFAULT_PIPELINE_TIMEOUT_SECS: u64 = 60;

/// Polling interval used while waiting for a pipeline to complete (ms).
pub const PIPELINE_POLL_INTERVAL_MS: u64 = 10;

// =============================================================================
// Logging
// =============================================================================

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Maximum length of a log line included in debug output.
/// Prevents accidental exposure of sensitive data in long lines.
pub const DEBUG_MAX_LINE_PREVIEW: usize = 200;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";
