// LogWeave - platform/scheduler.rs
//
// Production task scheduler.
//
// Architecture:
//   - A timer thread owns a min-heap of (due time, task id). It sleeps on a
//     condition variable until the earliest task is due or the heap changes.
//   - Due tasks are handed to a rayon thread pool. When a run finishes, the
//     task is put back on the heap after the delay its callback returned.
//   - A task is on the heap at most once, so it never runs concurrently with
//     itself.
//   - Dropping the scheduler stops the timer thread; runs in progress finish
//     on the pool.

use crate::core::scheduler::{PeriodicCallback, PeriodicTask, TaskHandle, TaskIds, TaskScheduler};
use crate::util::constants::ABSOLUTE_MAX_WORKER_THREADS;
use crate::util::error::SchedulerError;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::thread::JoinHandle;
use std::time::Instant;

#[derive(Default)]
struct TimerState {
    due: BinaryHeap<Reverse<(Instant, u64)>>,
    tasks: HashMap<u64, Arc<PeriodicTask>>,
}

struct Shared {
    state: Mutex<TimerState>,
    wakeup: Condvar,
    shutdown: AtomicBool,
    pool: rayon::ThreadPool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn schedule(&self, id: u64, at: Instant) {
        let mut state = self.lock();
        if state.tasks.contains_key(&id) {
            state.due.push(Reverse((at, id)));
            drop(state);
            self.wakeup.notify_one();
        }
    }

    /// Blocks until a task is due and returns it, or `None` on shutdown.
    fn next_due(&self) -> Option<Arc<PeriodicTask>> {
        let mut state = self.lock();
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return None;
            }
            let now = Instant::now();
            match state.due.peek().copied() {
                None => {
                    state = self.wakeup.wait(state).unwrap_or_else(|p| p.into_inner());
                }
                Some(Reverse((at, _))) if at > now => {
                    state = self
                        .wakeup
                        .wait_timeout(state, at - now)
                        .unwrap_or_else(|p| p.into_inner())
                        .0;
                }
                Some(Reverse((_, id))) => {
                    state.due.pop();
                    // Stopped tasks leave stale heap entries behind.
                    if let Some(task) = state.tasks.get(&id) {
                        return Some(Arc::clone(task));
                    }
                }
            }
        }
    }
}

fn run_timer(shared: Arc<Shared>) {
    tracing::debug!("Scheduler timer thread started");
    while let Some(task) = shared.next_due() {
        let weak: Weak<Shared> = Arc::downgrade(&shared);
        shared.pool.spawn(move || {
            let Some(delay) = task.run() else {
                return;
            };
            if let Some(shared) = weak.upgrade() {
                shared.schedule(task.handle().id(), Instant::now() + delay);
            }
        });
    }
    tracing::debug!("Scheduler timer thread stopped");
}

/// Runs periodic tasks on a worker pool.
pub struct DefaultTaskScheduler {
    shared: Arc<Shared>,
    timer: Mutex<Option<JoinHandle<()>>>,
    ids: TaskIds,
}

impl DefaultTaskScheduler {
    /// Creates a scheduler with `worker_threads` pool threads (0 = one per
    /// available CPU, capped at `ABSOLUTE_MAX_WORKER_THREADS`).
    pub fn new(worker_threads: usize) -> Result<Arc<Self>, SchedulerError> {
        let threads = match worker_threads {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            n => n,
        }
        .min(ABSOLUTE_MAX_WORKER_THREADS);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("logweave-worker-{i}"))
            .build()
            .map_err(|source| SchedulerError::ThreadPool { source })?;

        let shared = Arc::new(Shared {
            state: Mutex::new(TimerState::default()),
            wakeup: Condvar::new(),
            shutdown: AtomicBool::new(false),
            pool,
        });
        let timer_shared = Arc::clone(&shared);
        let timer = std::thread::Builder::new()
            .name("logweave-timer".to_string())
            .spawn(move || run_timer(timer_shared))
            .map_err(|source| SchedulerError::TimerThread { source })?;

        tracing::info!(threads, "Task scheduler started");
        Ok(Arc::new(Self {
            shared,
            timer: Mutex::new(Some(timer)),
            ids: TaskIds::default(),
        }))
    }

    pub fn periodic_task_count(&self) -> usize {
        self.shared.lock().tasks.len()
    }

    /// Stops the timer thread. Registered tasks no longer run.
    pub fn shutdown(&self) {
        if self.shared.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.wakeup.notify_all();
        let timer = self.timer.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(timer) = timer {
            // The last reference may be released on the timer thread itself.
            if timer.thread().id() != std::thread::current().id() && timer.join().is_err() {
                tracing::error!("Scheduler timer thread panicked");
            }
        }
        tracing::debug!("Task scheduler shut down");
    }
}

impl TaskScheduler for DefaultTaskScheduler {
    fn start_periodic(&self, name: &str, callback: PeriodicCallback) -> TaskHandle {
        let task = PeriodicTask::new(self.ids.next(), name, callback);
        let handle = task.handle().clone();
        self.shared.lock().tasks.insert(handle.id(), task);
        self.shared.schedule(handle.id(), Instant::now());
        tracing::trace!(task = name, id = handle.id(), "Periodic task registered");
        handle
    }

    fn stop_periodic(&self, handle: &TaskHandle) -> bool {
        let removed = self.shared.lock().tasks.remove(&handle.id());
        match removed {
            Some(task) => {
                task.stop();
                tracing::trace!(task = handle.name(), id = handle.id(), "Periodic task stopped");
                true
            }
            None => false,
        }
    }
}

impl Drop for DefaultTaskScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn test_tasks_run_repeatedly_until_stopped() {
        let scheduler = DefaultTaskScheduler::new(2).unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let handle = scheduler.start_periodic(
            "count",
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Duration::from_millis(1)
            }),
        );
        assert!(wait_for(|| runs.load(Ordering::SeqCst) >= 3));

        assert!(scheduler.stop_periodic(&handle));
        assert!(!scheduler.stop_periodic(&handle));
        assert_eq!(scheduler.periodic_task_count(), 0);
        std::thread::sleep(Duration::from_millis(20));
        let after_stop = runs.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(runs.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_task_never_runs_concurrently_with_itself() {
        let scheduler = DefaultTaskScheduler::new(4).unwrap();
        let active = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));
        let runs = Arc::new(AtomicUsize::new(0));
        let (a, o, r) = (active.clone(), overlaps.clone(), runs.clone());
        scheduler.start_periodic(
            "exclusive",
            Box::new(move || {
                if a.fetch_add(1, Ordering::SeqCst) > 0 {
                    o.fetch_add(1, Ordering::SeqCst);
                }
                std::thread::sleep(Duration::from_millis(2));
                a.fetch_sub(1, Ordering::SeqCst);
                r.fetch_add(1, Ordering::SeqCst);
                Duration::ZERO
            }),
        );
        assert!(wait_for(|| runs.load(Ordering::SeqCst) >= 5));
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panicking_task_is_retried() {
        let scheduler = DefaultTaskScheduler::new(1).unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        scheduler.start_periodic(
            "panics",
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                panic!("tick failed");
            }),
        );
        assert!(wait_for(|| runs.load(Ordering::SeqCst) >= 2));
    }

    #[test]
    fn test_task_ids_restart_in_each_scheduler() {
        let first = DefaultTaskScheduler::new(1).unwrap();
        let second = DefaultTaskScheduler::new(1).unwrap();
        let idle = || -> PeriodicCallback { Box::new(|| Duration::from_secs(60)) };
        let a = first.start_periodic("a", idle());
        let b = first.start_periodic("b", idle());
        let c = second.start_periodic("c", idle());
        assert_eq!((a.id(), b.id(), c.id()), (1, 2, 1));

        // Stopping in one scheduler leaves the same id in the other alone.
        assert!(first.stop_periodic(&a));
        assert_eq!(second.periodic_task_count(), 1);
    }
}
