//! Reactive Proxy Factory
//!
//! [`ObjectRef`] is the handle through which objects and arrays are read and
//! written. A handle is either raw or reactive; both point at the same cell,
//! and only reactive handles call into [`track`](super::track) and
//! [`trigger`](super::trigger). Calling [`reactive`] on a raw handle gives
//! back a reactive handle to the same cell, so there is never more than one
//! "proxy" per target and identity checks keep working.
//!
//! # Tracking Rules
//!
//! - Property reads track `(target, key)`.
//! - Array index reads track `(target, "length")`. Reading any slot and
//!   reading the length are the same dependency.
//! - Enumerating an object's keys tracks an internal iterate key, which is
//!   triggered when a key is added or removed.
//! - A write triggers when the new value is an object, or when it is a
//!   primitive strictly unequal to the old one.
//! - Array mutators run on the backing vector and trigger `length` once per
//!   call. `sort_by` and `reverse` work on a detached copy that replaces the
//!   contents in one step.
//!
//! Values read through a reactive handle come back reactive themselves, so
//! wrapping is lazy and follows whatever the reader touches.
//!
//! # Untracked Keys
//!
//! When an object is first wrapped, every key holding an untracked value is
//! remembered. So is every key that an untracked value is later assigned to.
//! Assigning a new object to a remembered key marks that object untracked as
//! well, and reads of a remembered key hand back the raw value.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::warn;

use super::runtime;
use super::value::Value;
use crate::graph::{Key, TargetId};

/// Backing storage for an object or an array.
pub(crate) struct ObjectCell {
    id: TargetId,
    array: bool,
    body: RefCell<Body>,
    untracked: Cell<bool>,
    wrapped: Cell<bool>,
    untracked_keys: RefCell<HashSet<Key>>,
}

enum Body {
    Object(IndexMap<Key, Value>),
    Array(Vec<Value>),
}

impl Drop for ObjectCell {
    fn drop(&mut self) {
        runtime::forget_target(self.id);
    }
}

/// Handle to a plain object or array.
#[derive(Clone)]
pub struct ObjectRef {
    cell: Rc<ObjectCell>,
    reactive: bool,
}

impl ObjectRef {
    pub(crate) fn new_object(entries: IndexMap<Key, Value>) -> Self {
        Self::from_body(Body::Object(entries))
    }

    pub(crate) fn new_array(items: Vec<Value>) -> Self {
        Self::from_body(Body::Array(items))
    }

    fn from_body(body: Body) -> Self {
        Self {
            cell: Rc::new(ObjectCell {
                id: TargetId::new(),
                array: matches!(body, Body::Array(_)),
                body: RefCell::new(body),
                untracked: Cell::new(false),
                wrapped: Cell::new(false),
                untracked_keys: RefCell::new(HashSet::new()),
            }),
            reactive: false,
        }
    }

    pub fn id(&self) -> TargetId {
        self.cell.id
    }

    pub fn is_array(&self) -> bool {
        self.cell.array
    }

    pub fn is_reactive(&self) -> bool {
        self.reactive
    }

    pub fn is_untracked(&self) -> bool {
        self.cell.untracked.get()
    }

    pub(crate) fn mark_untracked(&self) {
        self.cell.untracked.set(true);
    }

    /// Whether both handles point at the same target.
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }

    /// A raw handle to the same target. Writes through it are not tracked.
    pub fn to_raw(&self) -> ObjectRef {
        Self {
            cell: self.cell.clone(),
            reactive: false,
        }
    }

    pub(crate) fn wrap(&self) -> ObjectRef {
        if self.reactive || self.is_untracked() {
            return self.clone();
        }
        if !self.cell.wrapped.replace(true) {
            self.record_untracked_keys();
        }
        Self {
            cell: self.cell.clone(),
            reactive: true,
        }
    }

    fn record_untracked_keys(&self) {
        let body = self.cell.body.borrow();
        if let Body::Object(entries) = &*body {
            self.cell.untracked_keys.borrow_mut().extend(
                entries
                    .iter()
                    .filter(|(_, value)| value.is_untracked())
                    .map(|(key, _)| key.clone()),
            );
        }
    }

    fn track(&self, key: &Key) {
        if self.reactive {
            runtime::track(self.cell.id, key);
        }
    }

    fn trigger(&self, key: &Key) {
        if self.reactive {
            runtime::trigger(self.cell.id, key);
        }
    }

    /// Apply per-key untracked stickiness to a value about to be stored.
    fn stick_untracked(&self, key: &Key, value: &Value) {
        let mut keys = self.cell.untracked_keys.borrow_mut();
        if value.is_untracked() {
            keys.insert(key.clone());
        } else if keys.contains(key) {
            value.mark_untracked();
        }
    }

    fn wrap_read(&self, key: Option<&Key>, raw: Value) -> Value {
        if !self.reactive {
            return raw;
        }
        if let Some(key) = key {
            if self.cell.untracked_keys.borrow().contains(key) {
                raw.mark_untracked();
                return raw;
            }
        }
        reactive(raw)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Read a property.
    ///
    /// On arrays, `"length"` and canonical indices are understood; any other
    /// key reads as `Null`.
    pub fn get(&self, key: impl Into<Key>) -> Value {
        let key = key.into();
        if self.cell.array {
            if key.as_str() == Key::LENGTH {
                return Value::from(self.len());
            }
            if let Some(index) = key.as_index() {
                return self.at(index);
            }
            self.track(&key);
            return Value::Null;
        }

        self.track(&key);
        let raw = match &*self.cell.body.borrow() {
            Body::Object(entries) => entries.get(&key).cloned(),
            Body::Array(_) => None,
        };
        self.wrap_read(Some(&key), raw.unwrap_or_default())
    }

    /// Read a property, or `None` if the cell is being written right now.
    pub(crate) fn try_get(&self, key: &Key) -> Option<Value> {
        self.track(key);
        let raw = match &*self.cell.body.try_borrow().ok()? {
            Body::Object(entries) => entries.get(key).cloned(),
            Body::Array(_) => None,
        };
        Some(self.wrap_read(Some(key), raw.unwrap_or_default()))
    }

    /// Read an array slot. Tracks `length`.
    ///
    /// On a plain object this reads the property named by the index.
    pub fn at(&self, index: usize) -> Value {
        if !self.cell.array {
            return self.get(index);
        }
        self.track(&Key::length());
        let raw = match &*self.cell.body.borrow() {
            Body::Array(items) => items.get(index).cloned(),
            Body::Object(_) => None,
        };
        self.wrap_read(None, raw.unwrap_or_default())
    }

    pub(crate) fn try_at(&self, index: usize) -> Option<Value> {
        self.track(&Key::length());
        let raw = match &*self.cell.body.try_borrow().ok()? {
            Body::Array(items) => items.get(index).cloned(),
            Body::Object(_) => None,
        };
        Some(self.wrap_read(None, raw.unwrap_or_default()))
    }

    /// Check for a property. Tracks the key (`length` for array indices).
    pub fn has(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        match &*self.cell.body.borrow() {
            Body::Object(entries) => {
                self.track(&key);
                entries.contains_key(&key)
            }
            Body::Array(items) => {
                self.track(&Key::length());
                key.as_index().is_some_and(|index| index < items.len())
                    || key.as_str() == Key::LENGTH
            }
        }
    }

    /// Array length, or the number of keys of an object.
    pub fn len(&self) -> usize {
        if self.cell.array {
            self.track(&Key::length());
        } else {
            self.track(&Key::iterate());
        }
        match &*self.cell.body.borrow() {
            Body::Object(entries) => entries.len(),
            Body::Array(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Own keys in insertion (or index) order.
    pub fn keys(&self) -> Vec<Key> {
        let len = self.len();
        match &*self.cell.body.borrow() {
            Body::Object(entries) => entries.keys().cloned().collect(),
            Body::Array(_) => (0..len).map(Key::from).collect(),
        }
    }

    /// All values, read the same way [`ObjectRef::get`] reads them.
    pub fn values(&self) -> Vec<Value> {
        self.entries().into_iter().map(|(_, value)| value).collect()
    }

    /// All key/value pairs, read the same way [`ObjectRef::get`] reads them.
    pub fn entries(&self) -> Vec<(Key, Value)> {
        if self.cell.array {
            let len = self.len();
            return (0..len)
                .map(|index| (Key::from(index), self.at(index)))
                .collect();
        }
        self.keys()
            .into_iter()
            .map(|key| {
                let value = self.get(key.clone());
                (key, value)
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Write a property.
    ///
    /// Values are stored raw. On arrays, `"length"` truncates or extends and
    /// indices write slots; other keys are ignored. A length that is not a
    /// whole number in `0..=2^32-1` leaves the array unchanged.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) {
        let key = key.into();
        if self.cell.array {
            if key.as_str() == Key::LENGTH {
                let value = value.into();
                match value.as_f64().filter(|len| is_array_length(*len)) {
                    Some(len) => self.set_len(len as usize),
                    None => warn!(value = %value, "ignoring invalid array length"),
                }
            } else if let Some(index) = key.as_index() {
                self.set_at(index, value);
            } else {
                warn!(key = %key, "ignoring non-index property write on an array");
            }
            return;
        }

        let value = value.into().to_raw();
        if self.reactive {
            self.stick_untracked(&key, &value);
        }

        let old = match &mut *self.cell.body.borrow_mut() {
            Body::Object(entries) => entries.insert(key.clone(), value.clone()),
            Body::Array(_) => None,
        };

        let added = old.is_none();
        let changed = match &old {
            Some(old) => value.is_object() || !old.strictly_equals(&value),
            None => true,
        };
        drop(old);

        if changed {
            self.trigger(&key);
        }
        if added {
            self.trigger(&Key::iterate());
        }
    }

    /// Write an array slot, extending with `Null` if needed.
    pub fn set_at(&self, index: usize, value: impl Into<Value>) {
        if !self.cell.array {
            self.set(index, value);
            return;
        }

        let value = value.into().to_raw();
        let (changed, old) = match &mut *self.cell.body.borrow_mut() {
            Body::Array(items) if index < items.len() => {
                let changed = value.is_object() || !items[index].strictly_equals(&value);
                (changed, Some(std::mem::replace(&mut items[index], value)))
            }
            Body::Array(items) => {
                items.resize(index + 1, Value::Null);
                items[index] = value;
                (true, None)
            }
            Body::Object(_) => (false, None),
        };
        drop(old);

        if changed {
            self.trigger(&Key::length());
        }
    }

    fn set_len(&self, len: usize) {
        let removed = match &mut *self.cell.body.borrow_mut() {
            Body::Array(items) if len < items.len() => Some(items.split_off(len)),
            Body::Array(items) if len > items.len() => {
                items.resize(len, Value::Null);
                Some(Vec::new())
            }
            _ => None,
        };
        if removed.is_some() {
            drop(removed);
            self.trigger(&Key::length());
        }
    }

    /// Delete a property. Returns whether it existed.
    ///
    /// Deleting an array index leaves a `Null` hole.
    pub fn delete(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        let removed = match &mut *self.cell.body.borrow_mut() {
            Body::Object(entries) => entries.shift_remove(&key),
            Body::Array(items) => key
                .as_index()
                .and_then(|index| items.get_mut(index))
                .map(std::mem::take),
        };
        let Some(removed) = removed else {
            return false;
        };
        drop(removed);

        if self.cell.array {
            self.trigger(&Key::length());
        } else {
            self.trigger(&key);
            self.trigger(&Key::iterate());
        }
        true
    }

    // ------------------------------------------------------------------
    // Array mutators
    // ------------------------------------------------------------------

    /// Run `f` on the backing vector, then trigger `length` once.
    fn mutate<T: Default>(&self, method: &'static str, f: impl FnOnce(&mut Vec<Value>) -> T) -> T {
        let result = match &mut *self.cell.body.borrow_mut() {
            Body::Array(items) => f(items),
            Body::Object(_) => {
                warn!(method, "array method called on a plain object");
                return T::default();
            }
        };
        self.trigger(&Key::length());
        result
    }

    /// Append one item. Returns the new length.
    pub fn push(&self, value: impl Into<Value>) -> usize {
        let value = value.into().to_raw();
        self.mutate("push", |items| {
            items.push(value);
            items.len()
        })
    }

    /// Append several items with a single trigger. Returns the new length.
    pub fn extend<I>(&self, values: I) -> usize
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let values = values.into_iter().map(|v| v.into().to_raw()).collect::<Vec<_>>();
        self.mutate("extend", |items| {
            items.extend(values);
            items.len()
        })
    }

    pub fn pop(&self) -> Option<Value> {
        self.mutate("pop", Vec::pop)
    }

    pub fn shift(&self) -> Option<Value> {
        self.mutate("shift", |items| {
            (!items.is_empty()).then(|| items.remove(0))
        })
    }

    /// Prepend items in order. Returns the new length.
    pub fn unshift<I>(&self, values: I) -> usize
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let values = values.into_iter().map(|v| v.into().to_raw()).collect::<Vec<_>>();
        self.mutate("unshift", |items| {
            items.splice(0..0, values);
            items.len()
        })
    }

    /// Remove `delete_count` items at `start` and insert `values` there.
    /// Returns the removed items.
    pub fn splice<I>(&self, start: usize, delete_count: usize, values: I) -> Vec<Value>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let values = values.into_iter().map(|v| v.into().to_raw()).collect::<Vec<_>>();
        self.mutate("splice", |items| {
            let start = start.min(items.len());
            let end = start.saturating_add(delete_count).min(items.len());
            items.splice(start..end, values).collect()
        })
    }

    /// Sort in place with a single `length` trigger.
    ///
    /// The comparator sees raw values and runs against a detached copy, so it
    /// may read this array without observing a half-sorted state.
    pub fn sort_by<F>(&self, mut compare: F)
    where
        F: FnMut(&Value, &Value) -> Ordering,
    {
        let mut sorted = self.raw_items();
        sorted.sort_by(|a, b| compare(a, b));
        self.mutate("sort", |items| *items = sorted);
    }

    pub fn reverse(&self) {
        let mut reversed = self.raw_items();
        reversed.reverse();
        self.mutate("reverse", |items| *items = reversed);
    }

    fn raw_items(&self) -> Vec<Value> {
        match &*self.cell.body.borrow() {
            Body::Array(items) => items.clone(),
            Body::Object(_) => Vec::new(),
        }
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.cell.array { "Array" } else { "Object" };
        f.debug_struct(kind)
            .field("id", &self.cell.id.raw())
            .field("reactive", &self.reactive)
            .finish()
    }
}

/// Wrap a value for tracking.
///
/// Primitives, host instances, already-reactive handles and untracked values
/// come back unchanged. Sets and maps get their collection wrapper.
pub fn reactive(value: impl Into<Value>) -> Value {
    match value.into() {
        Value::Object(object) => Value::Object(object.wrap()),
        Value::Set(set) => Value::Set(set.wrap()),
        Value::Map(map) => Value::Map(map.wrap()),
        other => other,
    }
}

/// Permanently exclude a value from reactive wrapping. Returns it unchanged.
pub fn untracked(value: impl Into<Value>) -> Value {
    let value = value.into();
    value.mark_untracked();
    value
}

pub fn is_reactive(value: &Value) -> bool {
    value.is_reactive()
}

pub fn is_untracked(value: &Value) -> bool {
    value.is_untracked()
}

pub fn to_raw(value: &Value) -> Value {
    value.to_raw()
}

/// Largest length an array may be set to.
const MAX_ARRAY_LENGTH: f64 = 4_294_967_295.0;

fn is_array_length(len: f64) -> bool {
    len.fract() == 0.0 && (0.0..=MAX_ARRAY_LENGTH).contains(&len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{flush_effects, Effect};

    fn watch(read: impl Fn() + 'static) -> (Effect, Rc<Cell<usize>>) {
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let effect = Effect::new(move || {
            read();
            counter.set(counter.get() + 1);
        });
        (effect, runs)
    }

    #[test]
    fn wrapping_is_identity_stable() {
        let raw = Value::object([("a", Value::from(1))]);
        let first = reactive(raw.clone());
        let second = reactive(first.clone());

        assert!(first.is_reactive());
        assert_eq!(first, second);
        assert_eq!(first, raw);
        assert!(!to_raw(&first).is_reactive());
    }

    #[test]
    fn primitives_and_hosts_are_not_wrapped() {
        assert!(!reactive(5).is_reactive());
        let promise = Value::host(crate::reactive::HostKind::Promise, "fetch");
        assert!(!reactive(promise).is_reactive());
    }

    #[test]
    fn same_primitive_does_not_trigger() {
        let state = reactive(Value::object([("count", Value::from(1))]));
        let reader = state.clone();
        let (_effect, runs) = watch(move || {
            reader.get("count");
        });

        state.as_object().unwrap().set("count", 1);
        flush_effects().unwrap();
        assert_eq!(runs.get(), 1);

        state.as_object().unwrap().set("count", 2);
        flush_effects().unwrap();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn object_assignment_always_triggers() {
        let child = Value::object::<&str, _>([]);
        let state = reactive(Value::object([("child", child.clone())]));
        let reader = state.clone();
        let (_effect, runs) = watch(move || {
            reader.get("child");
        });

        state.as_object().unwrap().set("child", child);
        flush_effects().unwrap();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn nested_reads_are_reactive() {
        let state = reactive(Value::from_json(serde_json::json!({ "user": { "name": "ada" } })));
        let user = state.get("user");
        assert!(user.is_reactive());

        let reader = state.clone();
        let (_effect, runs) = watch(move || {
            reader.get("user").get("name");
        });

        user.as_object().unwrap().set("name", "grace");
        flush_effects().unwrap();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn raw_writes_bypass_tracking() {
        let state = reactive(Value::object([("count", Value::from(0))]));
        let reader = state.clone();
        let (_effect, runs) = watch(move || {
            reader.get("count");
        });

        state.to_raw().as_object().unwrap().set("count", 9);
        flush_effects().unwrap();
        assert_eq!(runs.get(), 1);
        assert_eq!(state.get("count"), Value::from(9));
    }

    #[test]
    fn adding_and_deleting_keys_triggers_iteration() {
        let state = reactive(Value::object([("a", Value::from(1))]));
        let reader = state.clone();
        let (_effect, runs) = watch(move || {
            reader.as_object().unwrap().keys();
        });

        let object = state.as_object().unwrap();
        object.set("a", 2);
        flush_effects().unwrap();
        assert_eq!(runs.get(), 1);

        object.set("b", 1);
        flush_effects().unwrap();
        assert_eq!(runs.get(), 2);

        assert!(object.delete("a"));
        assert!(!object.delete("missing"));
        flush_effects().unwrap();
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn index_reads_track_length() {
        let list = reactive(Value::array([1, 2, 3]));
        let reader = list.clone();
        let (effect, runs) = watch(move || {
            reader.at(0);
        });
        assert_eq!(effect.dependency_count(), 1);

        list.as_object().unwrap().set_at(2, 30);
        flush_effects().unwrap();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn mutators_trigger_length_once() {
        let list = reactive(Value::array([3, 1, 2]));
        let reader = list.clone();
        let (_effect, runs) = watch(move || {
            reader.as_object().unwrap().len();
        });
        let array = list.as_object().unwrap();

        assert_eq!(array.push(4), 4);
        flush_effects().unwrap();
        assert_eq!(runs.get(), 2);

        array.sort_by(|a, b| {
            a.as_f64()
                .unwrap_or_default()
                .total_cmp(&b.as_f64().unwrap_or_default())
        });
        flush_effects().unwrap();
        assert_eq!(runs.get(), 3);
        assert_eq!(Value::Object(array.clone()).to_json(), serde_json::json!([1, 2, 3, 4]));

        array.reverse();
        assert_eq!(array.splice(1, 2, [Value::from(9)]), vec![Value::from(3), Value::from(2)]);
        assert_eq!(array.shift(), Some(Value::from(4)));
        assert_eq!(array.unshift([0]), 3);
        assert_eq!(array.pop(), Some(Value::from(1)));
        flush_effects().unwrap();
        assert_eq!(runs.get(), 4);
        assert_eq!(Value::Object(array.clone()).to_json(), serde_json::json!([0, 9]));
    }

    #[test]
    fn length_write_truncates() {
        let list = reactive(Value::array([1, 2, 3]));
        list.as_object().unwrap().set("length", 1);
        assert_eq!(list.get("length"), Value::from(1));
        assert_eq!(list.at(1), Value::Null);
    }

    #[test]
    fn invalid_length_write_is_ignored() {
        let list = reactive(Value::array([1, 2, 3]));
        let reader = list.clone();
        let (_effect, runs) = watch(move || {
            reader.get("length");
        });

        let array = list.as_object().unwrap();
        for len in [
            Value::from(1e12),
            Value::from(2.5),
            Value::from(-1),
            Value::from(f64::NAN),
            Value::from(f64::INFINITY),
            Value::from("two"),
            Value::Null,
        ] {
            array.set("length", len);
        }

        assert_eq!(array.len(), 3);
        assert_eq!(crate::reactive::pending_effects(), 0);
        flush_effects().unwrap();
        assert_eq!(runs.get(), 1);

        array.set("length", 5.0);
        assert_eq!(array.len(), 5);
        assert_eq!(list.at(4), Value::Null);
    }

    #[test]
    fn untracked_values_are_not_wrapped() {
        let big = untracked(Value::array([1, 2]));
        assert!(is_untracked(&big));
        assert!(!reactive(big.clone()).is_reactive());

        let state = reactive(Value::object([("big", big)]));
        assert!(!state.get("big").is_reactive());
    }

    #[test]
    fn untracked_key_is_sticky() {
        let state = reactive(Value::object([("list", untracked(Value::array(Vec::<Value>::new())))]));
        let object = state.as_object().unwrap();

        let mut items = object.get("list").as_object().unwrap().values();
        items.push(Value::from(1));
        object.set("list", Value::array(items));

        let list = object.get("list");
        assert!(list.is_untracked());
        assert!(!list.is_reactive());
    }

    #[test]
    fn assigning_untracked_value_records_key() {
        let state = reactive(Value::object::<&str, _>([]));
        let object = state.as_object().unwrap();

        object.set("rows", untracked(Value::array([1])));
        object.set("rows", Value::array([1, 2]));

        assert!(object.get("rows").is_untracked());
    }
}
