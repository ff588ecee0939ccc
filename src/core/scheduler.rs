// LogWeave - core/scheduler.rs
//
// Periodic task scheduling abstraction.
//
// Every source drives its processing from one periodic callback. The
// callback returns the delay before it wants to run again. Two
// implementations exist:
//   - `ManualTaskScheduler` (here): runs callbacks only when test code says
//     so, deterministically and on the calling thread.
//   - `platform::scheduler::DefaultTaskScheduler`: worker pool + timer thread.
//
// A periodic task is never run concurrently with itself. A panicking
// callback is caught and logged; the scheduler keeps running it.

use crate::util::constants::PANICKED_TASK_RETRY_MS;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, TryLockError};
use std::time::Duration;

/// A periodic callback. Returns the delay until its next run.
pub type PeriodicCallback = Box<dyn FnMut() -> Duration + Send>;

/// Identifies a registered periodic task.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    id: u64,
    name: Arc<str>,
}

impl TaskHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskHandle({}, {:?})", self.id, self.name)
    }
}

pub trait TaskScheduler: Send + Sync {
    /// Registers `callback` to be run periodically, starting as soon as
    /// possible.
    fn start_periodic(&self, name: &str, callback: PeriodicCallback) -> TaskHandle;

    /// Unregisters a task. Returns false if it was not (or no longer)
    /// registered. A run already in progress is allowed to finish.
    fn stop_periodic(&self, handle: &TaskHandle) -> bool;
}

// =============================================================================
// PeriodicTask (shared by both schedulers)
// =============================================================================

/// Hands out task ids, unique within the scheduler that owns it.
#[derive(Debug)]
pub struct TaskIds(AtomicU64);

impl Default for TaskIds {
    fn default() -> Self {
        Self(AtomicU64::new(1))
    }
}

impl TaskIds {
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// A registered callback plus its run state.
pub struct PeriodicTask {
    handle: TaskHandle,
    callback: Mutex<PeriodicCallback>,
    stopped: AtomicBool,
}

impl PeriodicTask {
    pub fn new(id: u64, name: &str, callback: PeriodicCallback) -> Arc<Self> {
        Arc::new(Self {
            handle: TaskHandle {
                id,
                name: Arc::from(name),
            },
            callback: Mutex::new(callback),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn handle(&self) -> &TaskHandle {
        &self.handle
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Runs the callback once.
    ///
    /// Returns `None` when the task is stopped or already running on another
    /// thread; otherwise the delay the callback asked for.
    pub fn run(&self) -> Option<Duration> {
        if self.is_stopped() {
            return None;
        }
        let mut callback = match self.callback.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };
        match catch_unwind(AssertUnwindSafe(|| (*callback)())) {
            Ok(delay) => Some(delay),
            Err(_) => {
                tracing::error!(
                    task = %self.handle.name,
                    id = self.handle.id,
                    "Periodic task panicked; it will be retried"
                );
                Some(Duration::from_millis(PANICKED_TASK_RETRY_MS))
            }
        }
    }
}

// =============================================================================
// ManualTaskScheduler
// =============================================================================

/// Deterministic scheduler for tests: tasks run only from `run_once`.
///
/// Requested delays are ignored; every registered task runs on every call.
#[derive(Default)]
pub struct ManualTaskScheduler {
    tasks: Mutex<Vec<Arc<PeriodicTask>>>,
    ids: TaskIds,
}

impl ManualTaskScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn snapshot(&self) -> Vec<Arc<PeriodicTask>> {
        self.tasks
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Runs every registered task once, in registration order.
    ///
    /// Tasks run without the scheduler lock held, so callbacks may register
    /// or stop tasks.
    pub fn run_once(&self) {
        for task in self.snapshot() {
            task.run();
        }
    }

    /// Runs every registered task `n` times.
    pub fn run(&self, n: usize) {
        for _ in 0..n {
            self.run_once();
        }
    }

    pub fn periodic_task_count(&self) -> usize {
        self.tasks.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

impl TaskScheduler for ManualTaskScheduler {
    fn start_periodic(&self, name: &str, callback: PeriodicCallback) -> TaskHandle {
        let task = PeriodicTask::new(self.ids.next(), name, callback);
        let handle = task.handle().clone();
        self.tasks
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(task);
        tracing::trace!(task = name, id = handle.id, "Manual task registered");
        handle
    }

    fn stop_periodic(&self, handle: &TaskHandle) -> bool {
        let mut tasks = self.tasks.lock().unwrap_or_else(|p| p.into_inner());
        match tasks.iter().position(|t| t.handle() == handle) {
            Some(pos) => {
                let task = tasks.remove(pos);
                task.stop();
                true
            }
            None => false,
        }
    }
}
