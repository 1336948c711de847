//! Reactive Primitives
//!
//! This module implements the reactive system: dependency tracking over
//! plain state values, effects, and batched flushing.
//!
//! # Concepts
//!
//! ## Reactive Values
//!
//! State is made of [`Value`]s. Objects, arrays, sets and maps live in heap
//! cells with a stable [`TargetId`](crate::graph::TargetId). Reading one
//! through a reactive handle (see [`reactive`]) registers the active effect
//! as a dependent of the property read; writing through it notifies those
//! dependents.
//!
//! ## Effects
//!
//! An [`Effect`] is a side-effecting computation that re-runs whenever state
//! it read has changed. Effects are how state is synchronized with the DOM.
//!
//! ## Flushing
//!
//! Writes never run effects synchronously. They queue the affected effects
//! and schedule one flush on the installed [`Scheduler`]; the flush runs each
//! queued effect once, however often it was triggered.
//!
//! # Implementation Notes
//!
//! The runtime is thread-local. A thread-local stack records which effect is
//! running, and reads consult it to discover dependencies without the reader
//! having to list them.

mod collections;
mod context;
mod effect;
mod proxy;
mod runtime;
mod scheduler;
mod subscriber;
mod value;
mod walk;

pub use collections::{reactive_map, reactive_set, MapRef, SetRef};
pub use context::ReactiveContext;
pub use effect::{create_effect, Effect};
pub use proxy::{is_reactive, is_untracked, reactive, to_raw, untracked, ObjectRef};
pub use runtime::{
    clear_flush_hooks, config, configure, flush_effects, is_flushing, is_tracking,
    pending_effects, queue_microtask, run_microtasks, set_after_flush, set_before_flush,
    set_flush_hooks, set_scheduler, track, trigger, untrack,
};
pub use scheduler::{LocalTaskScheduler, MicrotaskQueue, Scheduler, Task};
pub use subscriber::SubscriberId;
pub use value::{HostKind, HostRef, Value};
pub use walk::{track_all_dependencies, track_all_dependencies_with};

pub(crate) use effect::panic_message;
pub(crate) use value::format_number;
