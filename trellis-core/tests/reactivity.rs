//! Integration Tests for the Reactive System
//!
//! These tests drive tracked state and effects through the public API, with
//! the default microtask queue standing in for the host's event loop.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use trellis_core::config::RuntimeConfig;
use trellis_core::error::Error;
use trellis_core::reactive::{
    configure, create_effect, flush_effects, pending_effects, reactive, reactive_map,
    reactive_set, run_microtasks, track_all_dependencies, untrack, untracked, Effect, Value,
};

/// An effect that runs `read` and counts its runs.
fn counting(read: impl Fn() + 'static) -> (Effect, Rc<Cell<usize>>) {
    let runs = Rc::new(Cell::new(0));
    let counter = runs.clone();
    let effect = create_effect(move || {
        read();
        counter.set(counter.get() + 1);
    });
    (effect, runs)
}

fn counter_state() -> Value {
    reactive(Value::object([("count", Value::from(0))]))
}

/// A write re-runs the reader on the next flush, not before.
#[test]
fn write_reruns_reader_after_flush() {
    let state = counter_state();
    let log = Rc::new(RefCell::new(Vec::new()));

    let seen = log.clone();
    let reader = state.clone();
    let _effect = create_effect(move || seen.borrow_mut().push(reader.get("count")));

    state.as_object().unwrap().set("count", 1);
    assert_eq!(log.borrow().len(), 1);

    run_microtasks();
    assert_eq!(*log.borrow(), vec![Value::from(0), Value::from(1)]);
}

/// Assigning the same primitive again is not a change.
#[test]
fn same_value_write_does_not_rerun() {
    let state = counter_state();
    let reader = state.clone();
    let (_effect, runs) = counting(move || {
        reader.get("count");
    });

    state.as_object().unwrap().set("count", 0);
    assert_eq!(pending_effects(), 0);

    run_microtasks();
    assert_eq!(runs.get(), 1);
}

/// Pushing runs readers of an index and readers of `length` once each.
#[test]
fn push_triggers_index_and_length_readers_once() {
    let list = reactive(Value::array([1, 2, 3]));

    let by_index = list.clone();
    let (_first, index_runs) = counting(move || {
        by_index.at(1);
    });
    let by_length = list.clone();
    let seen = Rc::new(Cell::new(0));
    let seen_len = seen.clone();
    let (_second, length_runs) = counting(move || {
        seen_len.set(by_length.as_object().map_or(0, |array| array.len()));
    });

    list.as_object().unwrap().push(4);
    run_microtasks();

    assert_eq!(seen.get(), 4);
    assert_eq!(index_runs.get(), 2);
    assert_eq!(length_runs.get(), 2);

    list.as_object().unwrap().extend([5, 6, 7]);
    run_microtasks();

    assert_eq!(seen.get(), 7);
    assert_eq!(length_runs.get(), 3);
}

/// Dropping every handle to an effect frees what its closure captured.
#[test]
fn dropped_effect_frees_its_captures() {
    let marker = Rc::new(());
    let state = counter_state();

    let captured = marker.clone();
    let reader = state.clone();
    let effect = create_effect(move || {
        let _ = &captured;
        reader.get("count");
    });
    assert_eq!(Rc::strong_count(&marker), 2);

    drop(effect);
    drop(state);
    run_microtasks();
    assert_eq!(Rc::strong_count(&marker), 1);
}

/// Writes after the last handle is gone queue nothing.
#[test]
fn dropped_effect_stops_reacting() {
    let state = counter_state();
    let reader = state.clone();
    let (effect, runs) = counting(move || {
        reader.get("count");
    });

    drop(effect);
    state.as_object().unwrap().set("count", 3);
    assert_eq!(pending_effects(), 0);

    run_microtasks();
    assert_eq!(runs.get(), 1);
}

/// Disposing twice is the same as disposing once.
#[test]
fn dispose_is_idempotent() {
    let state = counter_state();
    let reader = state.clone();
    let (effect, runs) = counting(move || {
        reader.get("count");
    });
    assert_eq!(effect.dependency_count(), 1);

    effect.dispose();
    effect.dispose();
    assert!(effect.is_disposed());
    assert_eq!(effect.dependency_count(), 0);

    state.as_object().unwrap().set("count", 5);
    run_microtasks();
    assert_eq!(runs.get(), 1);
}

/// Replacing an untracked value keeps the key untracked.
#[test]
fn untracked_sticks_to_its_key() {
    let state = reactive(Value::object([(
        "list",
        untracked(Value::array(Vec::<Value>::new())),
    )]));
    let object = state.as_object().unwrap().clone();

    let old = object.get("list");
    assert!(old.is_untracked());
    let mut items = old.as_object().unwrap().values();
    items.push(Value::from("x"));
    object.set("list", Value::array(items));

    let current = object.get("list");
    assert!(current.is_untracked());
    assert!(!current.is_reactive());

    // Writes inside an untracked value never reach readers.
    let reader = state.clone();
    let (_effect, runs) = counting(move || {
        reader.get("list").at(0);
    });
    current.as_object().unwrap().push("y");
    run_microtasks();
    assert_eq!(runs.get(), 1);
}

/// Many writes before a flush collapse into one run.
#[test]
fn writes_before_a_flush_are_batched() {
    let state = counter_state();
    let reader = state.clone();
    let (_effect, runs) = counting(move || {
        reader.get("count");
    });

    for n in 1..=10 {
        state.as_object().unwrap().set("count", n);
    }
    assert_eq!(pending_effects(), 1);

    run_microtasks();
    assert_eq!(runs.get(), 2);
    assert_eq!(state.get("count"), Value::from(10));
}

/// A flush requested from inside a running flush does nothing.
#[test]
fn nested_flush_is_a_no_op() {
    let state = counter_state();
    let nested = Rc::new(RefCell::new(Vec::new()));

    let reader = state.clone();
    let results = nested.clone();
    let _flusher = create_effect(move || {
        reader.get("count");
        results.borrow_mut().push(flush_effects().is_ok());
    });
    let reader = state.clone();
    let (_watcher, runs) = counting(move || {
        reader.get("count");
    });

    state.as_object().unwrap().set("count", 1);
    run_microtasks();

    assert_eq!(*nested.borrow(), vec![true, true]);
    assert_eq!(runs.get(), 2);
}

/// A panicking first run is contained, and tracks nothing.
#[test]
fn panicking_effect_is_contained() {
    let state = counter_state();
    // The body would read `count`, but it panics first.
    let effect = create_effect(|| panic!("failed before reading"));

    assert_eq!(effect.run_count(), 1);
    assert_eq!(effect.dependency_count(), 0);

    state.as_object().unwrap().set("count", 1);
    run_microtasks();
    assert_eq!(effect.run_count(), 1);
}

/// An effect that keeps feeding itself is cut off at the configured limit.
#[test]
fn runaway_effect_hits_the_flush_limit() {
    configure(RuntimeConfig {
        max_flush_iterations: 5,
        ..RuntimeConfig::default()
    });

    let state = counter_state();
    let writer = state.clone();
    let effect = create_effect(move || {
        let next = writer.get("count").as_f64().unwrap_or(0.0) + 1.0;
        writer.as_object().unwrap().set("count", next);
    });

    let result = flush_effects();
    assert!(matches!(
        result,
        Err(Error::FlushLimitExceeded { limit: 5, .. })
    ));
    assert_eq!(pending_effects(), 0);
    assert_eq!(effect.run_count(), 6);

    configure(RuntimeConfig::default());
}

/// Reads inside `untrack` are not recorded.
#[test]
fn untrack_hides_reads() {
    let state = counter_state();
    let reader = state.clone();
    let (effect, runs) = counting(move || {
        untrack(|| reader.get("count"));
    });
    assert_eq!(effect.dependency_count(), 0);

    state.as_object().unwrap().set("count", 2);
    run_microtasks();
    assert_eq!(runs.get(), 1);
}

/// Deep tracking reaches nested objects, arrays and collections.
#[test]
fn deep_tracking_reaches_nested_state() {
    let state = reactive(Value::object([
        (
            "user",
            Value::object([("name", Value::from("ada")), ("tags", Value::array(["a"]))]),
        ),
        ("seen", Value::set([1])),
    ]));
    let reader = state.clone();
    let (_effect, runs) = counting(move || track_all_dependencies(&reader));

    state.get("user").get("tags").as_object().unwrap().push("b");
    run_microtasks();
    assert_eq!(runs.get(), 2);

    state.get("seen").as_set().unwrap().add(2);
    run_microtasks();
    assert_eq!(runs.get(), 3);

    state.get("user").as_object().unwrap().set("name", "grace");
    run_microtasks();
    assert_eq!(runs.get(), 4);
}

/// Sets and maps trigger on membership changes only.
#[test]
fn collections_track_membership() {
    let set = reactive_set([1, 2]);
    let map = reactive_map([("a", 1)]);

    let set_reader = set.clone();
    let (_set_effect, set_runs) = counting(move || {
        set_reader.has(&Value::from(1));
    });
    let map_reader = map.clone();
    let (_map_effect, map_runs) = counting(move || {
        map_reader.get(&Value::from("a"));
    });

    assert!(!set.add(2));
    map.set("a", 1);
    run_microtasks();
    assert_eq!(set_runs.get(), 1);
    assert_eq!(map_runs.get(), 1);

    assert!(set.add(3));
    map.set("b", 2);
    run_microtasks();
    assert_eq!(set_runs.get(), 2);
    assert_eq!(map_runs.get(), 2);

    assert_eq!(set.add_all([4, 5, 6]), 3);
    run_microtasks();
    assert_eq!(set_runs.get(), 3);
}
