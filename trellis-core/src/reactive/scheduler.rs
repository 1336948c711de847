//! Microtask Scheduling
//!
//! Triggers never run effects synchronously. The first trigger after an idle
//! period queues one flush as a microtask through the installed
//! [`Scheduler`]; later triggers before that microtask runs just add to the
//! pending set.
//!
//! Two schedulers ship with the crate:
//!
//! - [`MicrotaskQueue`] (the default) keeps tasks on the runtime's own queue.
//!   The host pumps it with [`run_microtasks`](super::run_microtasks) after a
//!   batch of work, which is the right shape for hosts without an event loop
//!   and for tests.
//!
//! - [`LocalTaskScheduler`] hands each task to `tokio::task::spawn_local`, so
//!   flushes happen on their own once the current task yields. It belongs
//!   inside a `tokio::task::LocalSet`. Outside one, tasks fall back to the
//!   runtime queue with a warning and wait for
//!   [`run_microtasks`](super::run_microtasks).

use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use tracing::warn;

use super::runtime;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + 'static>;

/// Something that can run a task after the current synchronous work ends.
pub trait Scheduler {
    /// Queue `task` to run at the next microtask checkpoint.
    fn queue_microtask(&self, task: Task);
}

/// The default scheduler: tasks wait on the runtime queue until pumped.
#[derive(Debug, Default, Clone, Copy)]
pub struct MicrotaskQueue;

impl Scheduler for MicrotaskQueue {
    fn queue_microtask(&self, task: Task) {
        runtime::push_microtask(task);
    }
}

/// Scheduler backed by tokio's local task set.
///
/// Install it while running inside a `LocalSet`. A task queued anywhere else
/// lands on the runtime queue instead of panicking the trigger that queued it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalTaskScheduler;

impl Scheduler for LocalTaskScheduler {
    fn queue_microtask(&self, task: Task) {
        let slot = Rc::new(Cell::new(Some(task)));
        let spawned = slot.clone();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            tokio::task::spawn_local(async move {
                if let Some(task) = spawned.take() {
                    task();
                }
            })
        }));

        if result.is_err() {
            if let Some(task) = slot.take() {
                warn!("no tokio LocalSet is running, queueing task on the runtime queue");
                runtime::push_microtask(task);
            }
        }
    }
}

impl fmt::Debug for dyn Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn Scheduler")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{queue_microtask, run_microtasks, set_scheduler};

    #[test]
    fn local_scheduler_outside_a_local_set_falls_back() {
        set_scheduler(Rc::new(LocalTaskScheduler));

        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        queue_microtask(move || flag.set(true));
        assert!(!ran.get());

        assert_eq!(run_microtasks(), 1);
        assert!(ran.get());

        set_scheduler(Rc::new(MicrotaskQueue));
    }
}
