//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects reactive state and
//! effects. It owns the dependency map, the effect registry, the pending
//! queue and the microtask queue for the current thread.
//!
//! # How It Works
//!
//! 1. When an effect is created, it registers with the runtime. The registry
//!    holds it weakly; dropping the last handle unregisters it.
//!
//! 2. When an effect reads a reactive property, [`track`] records the edge
//!    in the dependency map and the reverse edge on the effect.
//!
//! 3. When a reactive property is written, [`trigger`]:
//!    a. Finds all dependent effects
//!    b. Adds them to the pending set (duplicates collapse)
//!    c. Schedules one flush if none is scheduled yet
//!
//! 4. [`flush_effects`] drains the pending set, bracketed by the before and
//!    after flush hooks, until nothing is left or the iteration limit hits.
//!
//! # Threading
//!
//! Everything here is thread-local. The runtime is single-threaded and
//! cooperative: effects run to completion, one at a time, and the only
//! suspension point is the microtask between a trigger and its flush.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use indexmap::IndexSet;
use tracing::{error, trace};

use super::context::ReactiveContext;
use super::effect::{Effect, WeakEffect};
use super::scheduler::{MicrotaskQueue, Scheduler, Task};
use super::subscriber::SubscriberId;
use crate::config::RuntimeConfig;
use crate::error::{Error, Result};
use crate::graph::{DepKey, DependencyMap, Key, TargetId};

thread_local! {
    static RUNTIME: Runtime = Runtime::new();
}

type Hook = Rc<dyn Fn()>;

/// The per-thread reactive runtime.
struct Runtime {
    /// Live effects by subscriber ID. Disposal or drop removes the entry.
    registry: RefCell<HashMap<SubscriberId, WeakEffect>>,

    /// Forward edges from properties to effects.
    graph: RefCell<DependencyMap<SubscriberId>>,

    /// Effects waiting for the next flush, in trigger order.
    pending: RefCell<IndexSet<SubscriberId>>,

    flushing: Cell<bool>,
    flush_scheduled: Cell<bool>,

    before_flush: RefCell<Option<Hook>>,
    after_flush: RefCell<Option<Hook>>,

    scheduler: RefCell<Rc<dyn Scheduler>>,
    microtasks: RefCell<VecDeque<Task>>,

    config: Cell<RuntimeConfig>,

    /// Targets dropped while the graph was borrowed; forgotten on next flush.
    orphaned: RefCell<Vec<TargetId>>,

    /// Effects released while the graph was borrowed; unlinked on next flush.
    released: RefCell<Vec<(SubscriberId, HashSet<DepKey>)>>,
}

impl Runtime {
    fn new() -> Self {
        Self {
            registry: RefCell::new(HashMap::new()),
            graph: RefCell::new(DependencyMap::new()),
            pending: RefCell::new(IndexSet::new()),
            flushing: Cell::new(false),
            flush_scheduled: Cell::new(false),
            before_flush: RefCell::new(None),
            after_flush: RefCell::new(None),
            scheduler: RefCell::new(Rc::new(MicrotaskQueue)),
            microtasks: RefCell::new(VecDeque::new()),
            config: Cell::new(RuntimeConfig::default()),
            orphaned: RefCell::new(Vec::new()),
            released: RefCell::new(Vec::new()),
        }
    }

    fn schedule_flush(&self) {
        if self.flush_scheduled.replace(true) {
            return;
        }

        let scheduler = self.scheduler.borrow().clone();
        scheduler.queue_microtask(Box::new(run_scheduled_flush));
    }

    /// Move the pending set out and resolve it to live effects.
    fn take_pending(&self) -> Vec<Effect> {
        let ids = std::mem::take(&mut *self.pending.borrow_mut());
        let registry = self.registry.borrow();
        ids.iter()
            .filter_map(|id| registry.get(id).and_then(WeakEffect::upgrade))
            .collect()
    }

    fn hook(&self, slot: &RefCell<Option<Hook>>) -> Option<Hook> {
        slot.borrow().clone()
    }

    fn sweep_orphans(&self) {
        let Ok(mut graph) = self.graph.try_borrow_mut() else {
            return;
        };
        if let Ok(mut orphaned) = self.orphaned.try_borrow_mut() {
            for target in orphaned.drain(..) {
                graph.forget_target(target);
            }
        }
        if let Ok(mut released) = self.released.try_borrow_mut() {
            for (id, dependencies) in released.drain(..) {
                for dep in &dependencies {
                    graph.remove(dep, id);
                }
            }
        }
    }
}

/// Register an effect so triggers can reach it while a handle is alive.
pub(crate) fn register(id: SubscriberId, effect: WeakEffect) {
    let _ = RUNTIME.try_with(|rt| {
        rt.registry.borrow_mut().insert(id, effect);
    });
}

/// Remove a disposed or dropped effect and all of its edges.
///
/// Runs from `Drop`, so every borrow is fallible. Edges that cannot be
/// removed now are unlinked after the next flush; a dead entry left in the
/// registry or pending set fails to upgrade and is skipped.
pub(crate) fn release(id: SubscriberId, dependencies: HashSet<DepKey>) {
    let _ = RUNTIME.try_with(|rt| {
        match rt.graph.try_borrow_mut() {
            Ok(mut graph) => {
                for dep in &dependencies {
                    graph.remove(dep, id);
                }
            }
            Err(_) => {
                if let Ok(mut released) = rt.released.try_borrow_mut() {
                    released.push((id, dependencies));
                }
            }
        }
        if let Ok(mut pending) = rt.pending.try_borrow_mut() {
            pending.shift_remove(&id);
        }
        if let Ok(mut registry) = rt.registry.try_borrow_mut() {
            registry.remove(&id);
        }
    });
}

/// Check whether an effect is still reachable by triggers.
#[cfg(test)]
pub(crate) fn is_registered(id: SubscriberId) -> bool {
    with_runtime(|rt| rt.registry.borrow().contains_key(&id)).unwrap_or(false)
}

/// Forget every edge on a deallocated target.
pub(crate) fn forget_target(target: TargetId) {
    let _ = RUNTIME.try_with(|rt| match rt.graph.try_borrow_mut() {
        Ok(mut graph) => graph.forget_target(target),
        Err(_) => {
            if let Ok(mut orphaned) = rt.orphaned.try_borrow_mut() {
                orphaned.push(target);
            }
        }
    });
}

/// Record that the active effect read `(target, key)`.
///
/// Does nothing outside an effect body.
pub fn track(target: TargetId, key: &Key) {
    let Some(subscriber) = ReactiveContext::current_subscriber() else {
        return;
    };

    let effect = RUNTIME
        .try_with(|rt| rt.registry.borrow().get(&subscriber).and_then(WeakEffect::upgrade))
        .ok()
        .flatten();
    let Some(effect) = effect else {
        return;
    };

    let dep = DepKey::new(target, key.clone());
    if effect.add_dependency(dep.clone()) {
        let _ = RUNTIME.try_with(|rt| rt.graph.borrow_mut().add(&dep, subscriber));
    }
}

/// Queue every effect that read `(target, key)` and schedule a flush.
///
/// Does nothing if no effect depends on the property.
pub fn trigger(target: TargetId, key: &Key) {
    let _ = RUNTIME.try_with(|rt| {
        let dependents = match rt.graph.try_borrow() {
            Ok(graph) => graph.dependents(target, key),
            Err(_) => return,
        };
        if dependents.is_empty() {
            return;
        }

        trace!(target_id = target.raw(), key = %key, count = dependents.len(), "trigger");
        rt.pending.borrow_mut().extend(dependents);
        rt.schedule_flush();
    });
}

fn run_scheduled_flush() {
    let _ = RUNTIME.try_with(|rt| rt.flush_scheduled.set(false));
    // Runaway flushes are logged where they are detected.
    let _ = flush_effects();
}

struct FlushGuard;

impl FlushGuard {
    fn enter() -> Option<Self> {
        RUNTIME
            .try_with(|rt| (!rt.flushing.replace(true)).then_some(FlushGuard))
            .ok()
            .flatten()
    }
}

impl Drop for FlushGuard {
    fn drop(&mut self) {
        let _ = RUNTIME.try_with(|rt| rt.flushing.set(false));
    }
}

/// Run every pending effect.
///
/// Calling this while a flush is already in progress does nothing. Effects
/// queued while a pass is running are picked up by the next pass of the same
/// flush; effects queued by the after-flush hook are picked up by the next
/// round. If the number of passes exceeds
/// [`RuntimeConfig::max_flush_iterations`], the remaining queue is discarded
/// and [`Error::FlushLimitExceeded`] is returned.
pub fn flush_effects() -> Result<()> {
    let Some(_guard) = FlushGuard::enter() else {
        return Ok(());
    };

    let limit = config().max_flush_iterations;
    let mut iterations = 0;

    loop {
        if let Some(before) = with_runtime(|rt| rt.hook(&rt.before_flush)).flatten() {
            before();
        }

        loop {
            let batch = with_runtime(Runtime::take_pending).unwrap_or_default();
            if batch.is_empty() {
                break;
            }

            iterations += 1;
            if iterations > limit {
                let discarded = batch.len()
                    + with_runtime(|rt| {
                        let mut pending = rt.pending.borrow_mut();
                        let len = pending.len();
                        pending.clear();
                        len
                    })
                    .unwrap_or(0);
                error!(limit, discarded, "effect flush exceeded iteration limit, discarding queue");
                return Err(Error::FlushLimitExceeded { limit, discarded });
            }

            for effect in batch {
                if effect.is_disposed() || effect.is_running() {
                    continue;
                }
                effect.execute();
            }
        }

        if let Some(after) = with_runtime(|rt| rt.hook(&rt.after_flush)).flatten() {
            after();
        }

        if pending_effects() == 0 {
            break;
        }
    }

    let _ = with_runtime(Runtime::sweep_orphans);
    Ok(())
}

/// Run queued microtasks until the queue is empty.
///
/// Only tasks queued through [`MicrotaskQueue`] land here. Returns the number
/// of tasks that ran.
pub fn run_microtasks() -> usize {
    let mut ran = 0;
    loop {
        let task = with_runtime(|rt| rt.microtasks.borrow_mut().pop_front()).flatten();
        let Some(task) = task else {
            return ran;
        };
        task();
        ran += 1;
    }
}

pub(crate) fn push_microtask(task: Task) {
    let _ = RUNTIME.try_with(|rt| rt.microtasks.borrow_mut().push_back(task));
}

/// Queue a task through the installed scheduler.
pub fn queue_microtask<F>(task: F)
where
    F: FnOnce() + 'static,
{
    let scheduler = with_runtime(|rt| rt.scheduler.borrow().clone());
    if let Some(scheduler) = scheduler {
        scheduler.queue_microtask(Box::new(task));
    }
}

/// Install the scheduler used for flushes and deferred hooks.
///
/// Install [`LocalTaskScheduler`](super::LocalTaskScheduler) only from
/// inside a tokio `LocalSet`; outside one its tasks wait on the runtime
/// queue for [`run_microtasks`].
pub fn set_scheduler(scheduler: Rc<dyn Scheduler>) {
    let _ = with_runtime(|rt| *rt.scheduler.borrow_mut() = scheduler);
}

/// Install a hook that runs at the start of every flush round.
pub fn set_before_flush<F>(hook: F)
where
    F: Fn() + 'static,
{
    let _ = with_runtime(|rt| *rt.before_flush.borrow_mut() = Some(Rc::new(hook)));
}

/// Install a hook that runs after every flush round drains.
///
/// Effects the hook triggers run in the next round of the same flush.
pub fn set_after_flush<F>(hook: F)
where
    F: Fn() + 'static,
{
    let _ = with_runtime(|rt| *rt.after_flush.borrow_mut() = Some(Rc::new(hook)));
}

/// Install both flush hooks at once.
pub fn set_flush_hooks<B, A>(before: B, after: A)
where
    B: Fn() + 'static,
    A: Fn() + 'static,
{
    set_before_flush(before);
    set_after_flush(after);
}

/// Remove both flush hooks.
pub fn clear_flush_hooks() {
    let _ = with_runtime(|rt| {
        rt.before_flush.borrow_mut().take();
        rt.after_flush.borrow_mut().take();
    });
}

/// Run `f` without attributing its reads to the active effect.
pub fn untrack<T>(f: impl FnOnce() -> T) -> T {
    let _ctx = ReactiveContext::untracked();
    f()
}

/// Check if reads are currently being tracked.
pub fn is_tracking() -> bool {
    ReactiveContext::is_active()
}

/// Check if a flush is in progress.
pub fn is_flushing() -> bool {
    with_runtime(|rt| rt.flushing.get()).unwrap_or(false)
}

/// Number of effects waiting for the next flush.
pub fn pending_effects() -> usize {
    with_runtime(|rt| rt.pending.borrow().len()).unwrap_or(0)
}

/// Install a configuration for this thread's runtime.
pub fn configure(config: RuntimeConfig) {
    let _ = with_runtime(|rt| rt.config.set(config));
}

/// Read this thread's runtime configuration.
pub fn config() -> RuntimeConfig {
    with_runtime(|rt| rt.config.get()).unwrap_or_default()
}

fn with_runtime<T>(f: impl FnOnce(&Runtime) -> T) -> Option<T> {
    RUNTIME.try_with(f).ok()
}
