// LogWeave - sources/listeners.rs
//
// Per-source listener registry with per-listener batching.
//
// A source reports its state changes here (`on_read`, `reset`, `remove`,
// `flush`). For every registered listener a `ListenerNotifier` tracks how
// many rows that listener has been told about and decides when pending
// rows are delivered:
//   - once `maximum_wait` has elapsed since the first undelivered change, or
//   - once at least `maximum_batch` rows are pending,
// always in chunks of at most `maximum_batch` rows.
//
// Locking: notifiers live behind one mutex. Deliveries are computed under
// that lock and pushed onto an outbox in the same critical section, so the
// outbox order is the order in which changes were reported. Whoever finds
// the outbox idle becomes its single drainer and invokes listeners with no
// lock held. A call made while another drain is running (including one made
// from inside a listener callback) only enqueues and returns.

use crate::core::modification::Modification;
use crate::core::source::{LogSource, LogSourceListener};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Data-pointer identity of a listener.
fn same_listener(a: &Arc<dyn LogSourceListener>, b: &Arc<dyn LogSourceListener>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

// =============================================================================
// ListenerNotifier
// =============================================================================

/// Batching state of one listener.
pub struct ListenerNotifier {
    listener: Arc<dyn LogSourceListener>,
    maximum_wait: Duration,
    maximum_batch: usize,
    /// Rows the listener has been told about.
    delivered: usize,
    /// Rows the source holds, as far as this notifier knows.
    current: usize,
    /// When the oldest undelivered change happened.
    pending_since: Option<Instant>,
}

impl ListenerNotifier {
    /// Creates the notifier. The returned modifications (a `Reset`) must be
    /// delivered before anything else.
    pub fn new(
        listener: Arc<dyn LogSourceListener>,
        maximum_wait: Duration,
        maximum_batch: usize,
    ) -> (Self, Vec<Modification>) {
        let notifier = Self {
            listener,
            maximum_wait,
            maximum_batch: maximum_batch.max(1),
            delivered: 0,
            current: 0,
            pending_since: None,
        };
        (notifier, vec![Modification::Reset])
    }

    pub fn listener(&self) -> &Arc<dyn LogSourceListener> {
        &self.listener
    }

    /// Rows the listener has been told about.
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    /// The source now holds `count` rows.
    pub fn on_read(&mut self, count: usize, now: Instant) -> Vec<Modification> {
        if count < self.current {
            // Shrinking is only ever reported through `remove`/`reset`.
            tracing::trace!(
                count,
                current = self.current,
                "Ignoring on_read with a smaller row count"
            );
            return Vec::new();
        }
        if count > self.current && self.pending_since.is_none() {
            self.pending_since = Some(now);
        }
        self.current = count;

        let pending = self.current - self.delivered;
        if pending == 0 {
            self.pending_since = None;
            return Vec::new();
        }
        let waited_enough = self
            .pending_since
            .map(|since| now.saturating_duration_since(since) >= self.maximum_wait)
            .unwrap_or(false);
        if waited_enough || pending >= self.maximum_batch {
            self.deliver_pending()
        } else {
            Vec::new()
        }
    }

    /// All content is gone. Only reported when the listener has seen rows
    /// since its last reset.
    pub fn reset(&mut self) -> Vec<Modification> {
        let seen = self.delivered > 0;
        self.delivered = 0;
        self.current = 0;
        self.pending_since = None;
        if seen {
            vec![Modification::Reset]
        } else {
            Vec::new()
        }
    }

    /// Rows from `first` onward are gone. The reported removal is clamped to
    /// what the listener actually saw.
    pub fn remove(&mut self, first: usize) -> Vec<Modification> {
        self.current = self.current.min(first);
        if self.current == self.delivered {
            self.pending_since = None;
        }
        if first >= self.delivered {
            return Vec::new();
        }
        let removed = self.delivered - first;
        self.delivered = first;
        vec![Modification::removed(first, removed)]
    }

    /// Delivers everything pending, ignoring the batching window.
    pub fn flush(&mut self) -> Vec<Modification> {
        if self.current > self.delivered {
            self.deliver_pending()
        } else {
            Vec::new()
        }
    }

    fn deliver_pending(&mut self) -> Vec<Modification> {
        let pending = Modification::appended(self.delivered, self.current - self.delivered);
        self.delivered = self.current;
        self.pending_since = None;
        pending.split(self.maximum_batch)
    }
}

// =============================================================================
// ListenerCollection
// =============================================================================

type Deliveries = Vec<(Arc<dyn LogSourceListener>, Vec<Modification>)>;

#[derive(Default)]
struct Registry {
    notifiers: Vec<ListenerNotifier>,
    /// Last row count reported by the source; new listeners catch up to it.
    count: usize,
}

impl Registry {
    fn contains(&self, listener: &Arc<dyn LogSourceListener>) -> bool {
        self.notifiers
            .iter()
            .any(|n| same_listener(n.listener(), listener))
    }
}

/// The listeners of one source.
///
/// The `record_*` methods only queue the resulting modifications; `deliver`
/// hands them out. The remaining methods do both.
#[derive(Default)]
pub struct ListenerCollection {
    registry: Mutex<Registry>,
    outbox: Mutex<VecDeque<(Arc<dyn LogSourceListener>, Modification)>>,
    draining: AtomicBool,
}

impl ListenerCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_outbox(&self) -> MutexGuard<'_, VecDeque<(Arc<dyn LogSourceListener>, Modification)>> {
        self.outbox.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Computes deliveries under the registry lock and queues them before
    /// releasing it.
    fn record<F>(&self, compute: F)
    where
        F: FnOnce(&mut Registry) -> Deliveries,
    {
        let mut registry = self.lock();
        let deliveries = compute(&mut *registry);
        if deliveries.is_empty() {
            return;
        }
        let mut outbox = self.lock_outbox();
        for (listener, modifications) in deliveries {
            outbox.extend(
                modifications
                    .into_iter()
                    .map(|modification| (Arc::clone(&listener), modification)),
            );
        }
    }

    fn next_delivery(&self) -> Option<(Arc<dyn LogSourceListener>, Modification)> {
        loop {
            let (listener, modification) = self.lock_outbox().pop_front()?;
            // Deliveries queued for a listener that has since been removed
            // are dropped.
            if self.lock().contains(&listener) {
                return Some((listener, modification));
            }
        }
    }

    /// Hands every queued modification to its listener, unless another
    /// call is already doing so.
    pub fn deliver(&self, source: &dyn LogSource) {
        loop {
            if self
                .draining
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return;
            }
            while let Some((listener, modification)) = self.next_delivery() {
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    listener.on_log_source_modified(source, modification)
                }));
                if outcome.is_err() {
                    tracing::error!(
                        source = source.name(),
                        %modification,
                        "Listener panicked while handling a modification"
                    );
                }
            }
            self.draining.store(false, Ordering::Release);
            // Something queued between the last pop and the store above would
            // otherwise wait for the next change.
            if self.lock_outbox().is_empty() {
                return;
            }
        }
    }

    fn for_each<F>(registry: &mut Registry, mut f: F) -> Deliveries
    where
        F: FnMut(&mut ListenerNotifier) -> Vec<Modification>,
    {
        registry
            .notifiers
            .iter_mut()
            .filter_map(|n| {
                let modifications = f(n);
                (!modifications.is_empty()).then(|| (Arc::clone(n.listener()), modifications))
            })
            .collect()
    }

    /// Registers `listener`; it will receive `Reset` followed by the rows
    /// the source already reported (subject to batching).
    pub fn record_listener(
        &self,
        listener: Arc<dyn LogSourceListener>,
        maximum_wait: Duration,
        maximum_batch: usize,
    ) {
        self.record(|registry| {
            if registry.contains(&listener) {
                return Vec::new();
            }
            let (mut notifier, mut initial) =
                ListenerNotifier::new(Arc::clone(&listener), maximum_wait, maximum_batch);
            initial.extend(notifier.on_read(registry.count, Instant::now()));
            registry.notifiers.push(notifier);
            vec![(listener, initial)]
        });
    }

    pub fn add_listener(
        &self,
        source: &dyn LogSource,
        listener: Arc<dyn LogSourceListener>,
        maximum_wait: Duration,
        maximum_batch: usize,
    ) {
        self.record_listener(listener, maximum_wait, maximum_batch);
        self.deliver(source);
    }

    /// Returns false if `listener` was not registered.
    pub fn remove_listener(&self, listener: &Arc<dyn LogSourceListener>) -> bool {
        let mut registry = self.lock();
        let before = registry.notifiers.len();
        registry
            .notifiers
            .retain(|n| !same_listener(n.listener(), listener));
        registry.notifiers.len() != before
    }

    /// The source now holds `count` rows.
    pub fn record_read(&self, count: usize) {
        let now = Instant::now();
        self.record(|registry| {
            registry.count = count;
            Self::for_each(registry, |n| n.on_read(count, now))
        });
    }

    pub fn on_read(&self, source: &dyn LogSource, count: usize) {
        self.record_read(count);
        self.deliver(source);
    }

    pub fn record_reset(&self) {
        self.record(|registry| {
            registry.count = 0;
            Self::for_each(registry, ListenerNotifier::reset)
        });
    }

    pub fn reset(&self, source: &dyn LogSource) {
        self.record_reset();
        self.deliver(source);
    }

    /// Rows from `first` onward are gone.
    pub fn record_remove(&self, first: usize) {
        self.record(|registry| {
            registry.count = registry.count.min(first);
            Self::for_each(registry, |n| n.remove(first))
        });
    }

    pub fn remove(&self, source: &dyn LogSource, first: usize) {
        self.record_remove(first);
        self.deliver(source);
    }

    /// Everything pending is due, ignoring the batching window.
    pub fn record_flush(&self) {
        self.record(|registry| Self::for_each(registry, ListenerNotifier::flush));
    }

    /// Delivers everything pending to every listener.
    pub fn flush(&self, source: &dyn LogSource) {
        self.record_flush();
        self.deliver(source);
    }

    pub fn clear(&self) {
        self.lock().notifiers.clear();
        self.lock_outbox().clear();
    }
}
