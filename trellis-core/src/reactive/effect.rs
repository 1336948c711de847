//! Effect Implementation
//!
//! An Effect is a side-effecting computation that re-runs whenever reactive
//! state it read has changed.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately, inside a
//!    reactive context, to establish its dependencies.
//!
//! 2. When any dependency is triggered, the effect is added to the pending
//!    set and a flush is scheduled. It does not run synchronously.
//!
//! 3. The next flush runs it once, however many times it was triggered.
//!
//! # Failure Isolation
//!
//! A panicking effect body is caught, logged, and otherwise ignored. The
//! context guard unwinds the active-effect stack, the effect stays
//! registered, and it will run again on its next trigger. One broken effect
//! must not stop every other binding from updating.
//!
//! # Dependencies
//!
//! Dependencies accumulate across runs and are only released by
//! [`Effect::dispose`] or by dropping the last handle. An effect that stops
//! reading a property keeps the stale edge, which costs at most a spurious
//! re-run.
//!
//! # Lifetime
//!
//! The runtime only keeps a weak reference. An effect lives as long as some
//! [`Effect`] handle does; dropping the last one disposes it and frees its
//! closure along with everything the closure captured.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use tracing::{error, trace};

use super::context::ReactiveContext;
use super::runtime;
use super::subscriber::SubscriberId;
use crate::graph::DepKey;

/// A side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust,ignore
/// let state = reactive(Value::object([("count", 0.into())]));
///
/// let effect = Effect::new({
///     let state = state.clone();
///     move || println!("count is {}", state.get("count"))
/// });
///
/// state.set("count", 5);
/// flush_effects()?; // prints "count is 5"
/// effect.dispose();
/// ```
///
/// Keep the handle for as long as the effect should stay subscribed.
#[derive(Clone)]
pub struct Effect {
    inner: Rc<EffectInner>,
}

struct EffectInner {
    /// The subscriber ID used for dependency tracking.
    id: SubscriberId,

    /// The effect function.
    run: RefCell<Box<dyn FnMut()>>,

    /// Reverse edges: every property this effect has been registered on.
    dependencies: RefCell<HashSet<DepKey>>,

    disposed: Cell<bool>,
    running: Cell<bool>,
    run_count: Cell<usize>,
}

impl Effect {
    /// Create a new effect and run it once.
    pub fn new<F>(run: F) -> Self
    where
        F: FnMut() + 'static,
    {
        let effect = Self::new_lazy(run);
        effect.execute();
        effect
    }

    /// Create a new effect without running it.
    ///
    /// The effect has no dependencies until [`Effect::execute`] is called.
    pub fn new_lazy<F>(run: F) -> Self
    where
        F: FnMut() + 'static,
    {
        let effect = Self {
            inner: Rc::new(EffectInner {
                id: SubscriberId::new(),
                run: RefCell::new(Box::new(run)),
                dependencies: RefCell::new(HashSet::new()),
                disposed: Cell::new(false),
                running: Cell::new(false),
                run_count: Cell::new(0),
            }),
        };

        runtime::register(effect.id(), effect.downgrade());
        effect
    }

    pub(crate) fn downgrade(&self) -> WeakEffect {
        WeakEffect(Rc::downgrade(&self.inner))
    }

    /// Get the subscriber ID for this effect.
    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Execute the effect function within its reactive context.
    ///
    /// Does nothing if the effect is disposed or is already executing.
    pub fn execute(&self) {
        if self.is_disposed() {
            return;
        }

        let Ok(mut run) = self.inner.run.try_borrow_mut() else {
            trace!(effect = %self.inner.id, "skipping re-entrant effect run");
            return;
        };

        let _running = RunningGuard::enter(&self.inner.running);
        let _ctx = ReactiveContext::enter(self.inner.id);

        let result = panic::catch_unwind(AssertUnwindSafe(|| (*run)()));

        self.inner.run_count.set(self.inner.run_count.get() + 1);

        if let Err(payload) = result {
            error!(
                effect = %self.inner.id,
                message = panic_message(payload.as_ref()),
                "effect panicked"
            );
        }
    }

    /// Record a dependency in this effect's reverse edge set.
    ///
    /// Returns `true` if the dependency is new.
    pub(crate) fn add_dependency(&self, dep: DepKey) -> bool {
        if self.is_disposed() {
            return false;
        }
        self.inner.dependencies.borrow_mut().insert(dep)
    }

    /// Dispose of the effect.
    ///
    /// Removes it from every dependency it registered on, drops it from the
    /// pending queue and stops the current run (if any) from tracking further
    /// reads. Calling this more than once has no further effect.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }

        let dependencies = std::mem::take(&mut *self.inner.dependencies.borrow_mut());
        ReactiveContext::detach(self.inner.id);
        runtime::release(self.inner.id, dependencies);
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Check if the effect body is executing right now.
    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.borrow().len()
    }
}

/// A registry entry that does not keep the effect alive.
#[derive(Clone)]
pub(crate) struct WeakEffect(Weak<EffectInner>);

impl WeakEffect {
    pub(crate) fn upgrade(&self) -> Option<Effect> {
        self.0.upgrade().map(|inner| Effect { inner })
    }
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        if self.disposed.replace(true) {
            return;
        }
        trace!(effect = %self.id, "effect dropped without dispose");
        runtime::release(self.id, std::mem::take(self.dependencies.get_mut()));
    }
}

/// Create an effect and run it once. See [`Effect::new`].
pub fn create_effect<F>(run: F) -> Effect
where
    F: FnMut() + 'static,
{
    Effect::new(run)
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

struct RunningGuard<'a>(&'a Cell<bool>);

impl<'a> RunningGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Key, TargetId};
    use crate::reactive::{flush_effects, track, trigger};

    #[test]
    fn effect_runs_on_creation() {
        let run_count = Rc::new(Cell::new(0));
        let counter = run_count.clone();

        let _effect = Effect::new(move || {
            counter.set(counter.get() + 1);
        });

        assert_eq!(run_count.get(), 1);
    }

    #[test]
    fn effect_lazy_does_not_run_on_creation() {
        let run_count = Rc::new(Cell::new(0));
        let counter = run_count.clone();

        let effect = Effect::new_lazy(move || {
            counter.set(counter.get() + 1);
        });

        assert_eq!(run_count.get(), 0);
        assert_eq!(effect.run_count(), 0);

        effect.execute();
        assert_eq!(run_count.get(), 1);
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn effect_does_not_run_after_disposal() {
        let run_count = Rc::new(Cell::new(0));
        let counter = run_count.clone();

        let effect = Effect::new(move || {
            counter.set(counter.get() + 1);
        });

        effect.dispose();
        assert!(effect.is_disposed());

        effect.execute();
        assert_eq!(run_count.get(), 1);
    }

    #[test]
    fn dispose_releases_dependencies() {
        let target = TargetId::new();
        let effect = Effect::new(move || {
            track(target, &Key::new("a"));
            track(target, &Key::new("b"));
        });

        assert_eq!(effect.dependency_count(), 2);

        effect.dispose();
        effect.dispose();

        assert_eq!(effect.dependency_count(), 0);
        trigger(target, &Key::new("a"));
        assert_eq!(crate::reactive::pending_effects(), 0);
    }

    #[test]
    fn panicking_effect_is_contained() {
        let effect = Effect::new(|| panic!("broken binding"));

        assert_eq!(effect.run_count(), 1);
        assert!(!effect.is_disposed());
        assert_eq!(ReactiveContext::depth(), 0);
    }

    #[test]
    fn nested_effects_track_independently() {
        let outer_target = TargetId::new();
        let inner_target = TargetId::new();
        let inner_slot: Rc<RefCell<Option<Effect>>> = Rc::new(RefCell::new(None));

        let slot = inner_slot.clone();
        let outer = Effect::new(move || {
            track(outer_target, &Key::new("before"));
            let inner = Effect::new(move || track(inner_target, &Key::new("x")));
            *slot.borrow_mut() = Some(inner);
            track(outer_target, &Key::new("after"));
        });

        let inner = inner_slot.borrow().clone().unwrap();
        assert_eq!(outer.dependency_count(), 2);
        assert_eq!(inner.dependency_count(), 1);
    }

    #[test]
    fn disposing_running_effect_stops_tracking() {
        let target = TargetId::new();
        let handle: Rc<RefCell<Option<Effect>>> = Rc::new(RefCell::new(None));

        let slot = handle.clone();
        let effect = Effect::new_lazy(move || {
            track(target, &Key::new("before"));
            if let Some(me) = slot.borrow().as_ref() {
                me.dispose();
            }
            track(target, &Key::new("after"));
        });
        *handle.borrow_mut() = Some(effect.clone());

        effect.execute();

        assert!(effect.is_disposed());
        assert_eq!(effect.dependency_count(), 0);
        trigger(target, &Key::new("after"));
        flush_effects().unwrap();
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn dropped_effect_releases_its_captures() {
        let target = TargetId::new();
        let marker = Rc::new(());
        let captured = marker.clone();
        let effect = Effect::new(move || {
            let _ = &captured;
            track(target, &Key::new("x"));
        });
        let id = effect.id();
        assert_eq!(Rc::strong_count(&marker), 2);

        drop(effect);
        assert_eq!(Rc::strong_count(&marker), 1);
        assert!(!runtime::is_registered(id));

        trigger(target, &Key::new("x"));
        assert_eq!(crate::reactive::pending_effects(), 0);
        flush_effects().unwrap();
    }

    #[test]
    fn dropped_pending_effect_is_skipped() {
        let target = TargetId::new();
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let effect = Effect::new(move || {
            track(target, &Key::new("x"));
            counter.set(counter.get() + 1);
        });

        trigger(target, &Key::new("x"));
        drop(effect);
        flush_effects().unwrap();

        assert_eq!(runs.get(), 1);
        assert_eq!(crate::reactive::pending_effects(), 0);
    }

    #[test]
    fn panic_message_extracts_strings() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
    }
}
