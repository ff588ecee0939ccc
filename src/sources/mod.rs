// LogWeave - sources/mod.rs
//
// Concrete log sources: the in-memory producer and the transforms
// (multi-line grouping, filtering, merging) plus the machinery they share.
// Dependencies: core, util.

pub mod base;
pub mod filtered;
pub mod listeners;
pub mod memory;
pub mod merged;
pub mod multiline;

pub use filtered::FilteredLogSource;
pub use memory::InMemoryLogSource;
pub use merged::MergedLogSource;
pub use multiline::MultiLineLogSource;

use crate::core::modification::Modification;
use crate::core::source::{LogSource, LogSourceListener};
use crate::util::constants::{
    DEFAULT_LISTENER_BATCH_SIZE, DEFAULT_MAXIMUM_WAIT_MS, DEFAULT_MAX_LINES_PER_TICK,
};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Tuning shared by all transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceOptions {
    /// Maximum time a transform lets its upstream batch changes; also the
    /// transform's idle tick delay.
    pub maximum_wait: Duration,
    /// Maximum rows per notification requested from the upstream.
    pub batch_size: usize,
    /// Maximum upstream rows consumed per tick.
    pub max_lines_per_tick: usize,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            maximum_wait: Duration::from_millis(DEFAULT_MAXIMUM_WAIT_MS),
            batch_size: DEFAULT_LISTENER_BATCH_SIZE,
            max_lines_per_tick: DEFAULT_MAX_LINES_PER_TICK,
        }
    }
}

// =============================================================================
// Pending modification queue
// =============================================================================

/// Queue of upstream modifications waiting for the next tick.
///
/// Registered as the transform's listener on its upstream; appends are split
/// into chunks of at most `batch_size` rows on arrival.
pub struct PendingModifications {
    queue: Mutex<VecDeque<Modification>>,
    batch_size: usize,
}

impl PendingModifications {
    pub fn new(batch_size: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            batch_size: batch_size.max(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Modification>> {
        self.queue.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn push(&self, modification: Modification) {
        self.lock().extend(modification.split(self.batch_size));
    }

    /// Removes and returns everything queued.
    pub fn take_all(&self) -> Vec<Modification> {
        self.lock().drain(..).collect()
    }

    /// Number of appended rows still queued.
    pub fn pending_lines(&self) -> usize {
        self.lock()
            .iter()
            .filter_map(|m| match m {
                Modification::Appended(section) => Some(section.count),
                _ => None,
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl LogSourceListener for PendingModifications {
    fn on_log_source_modified(&self, _source: &dyn LogSource, modification: Modification) {
        self.push(modification);
    }
}
