//! Reactive Collections
//!
//! Sets and maps are tracked through a single `size` key on their target.
//! Any read depends on the whole collection and any change triggers it, so
//! tracking costs O(1) no matter how large the collection grows. Nobody can
//! depend on "did member X change", only on "did the collection change".
//!
//! Bulk operations apply all of their changes and trigger once, and only if
//! something actually changed.
//!
//! Members are stored raw and handed back raw. Reading a collection never
//! wraps its contents.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

use super::runtime;
use super::value::Value;
use crate::graph::{Key, TargetId};

struct CollectionCell<T> {
    id: TargetId,
    items: RefCell<T>,
    untracked: Cell<bool>,
}

impl<T> CollectionCell<T> {
    fn new(items: T) -> Rc<Self> {
        Rc::new(Self {
            id: TargetId::new(),
            items: RefCell::new(items),
            untracked: Cell::new(false),
        })
    }
}

impl<T> Drop for CollectionCell<T> {
    fn drop(&mut self) {
        runtime::forget_target(self.id);
    }
}

macro_rules! collection_handle {
    ($name:ident, $items:ty) => {
        impl $name {
            pub fn id(&self) -> TargetId {
                self.cell.id
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

            pub fn ptr_eq(&self, other: &$name) -> bool {
                Rc::ptr_eq(&self.cell, &other.cell)
            }

            pub fn to_raw(&self) -> $name {
                Self {
                    cell: self.cell.clone(),
                    reactive: false,
                }
            }

            pub(crate) fn wrap(&self) -> $name {
                if self.reactive || self.is_untracked() {
                    return self.clone();
                }
                Self {
                    cell: self.cell.clone(),
                    reactive: true,
                }
            }

            fn track(&self) {
                if self.reactive {
                    runtime::track(self.cell.id, &Key::size());
                }
            }

            fn trigger(&self) {
                if self.reactive {
                    runtime::trigger(self.cell.id, &Key::size());
                }
            }

            /// Number of members. Tracks the collection.
            pub fn size(&self) -> usize {
                self.track();
                self.cell.items.borrow().len()
            }

            pub fn is_empty(&self) -> bool {
                self.size() == 0
            }

            /// Remove every member. Triggers only if it was not empty.
            pub fn clear(&self) {
                let removed = std::mem::take(&mut *self.cell.items.borrow_mut());
                if !removed.is_empty() {
                    drop(removed);
                    self.trigger();
                }
            }

            pub(crate) fn from_parts(items: $items, reactive: bool) -> Self {
                Self {
                    cell: CollectionCell::new(items),
                    reactive,
                }
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("id", &self.cell.id.raw())
                    .field("reactive", &self.reactive)
                    .finish()
            }
        }
    };
}

/// A set of [`Value`]s with size-based tracking.
#[derive(Clone)]
pub struct SetRef {
    cell: Rc<CollectionCell<IndexSet<Value>>>,
    reactive: bool,
}

collection_handle!(SetRef, IndexSet<Value>);

impl SetRef {
    pub(crate) fn from_items(items: IndexSet<Value>, reactive: bool) -> Self {
        Self::from_parts(items, reactive)
    }

    /// Add a member. Returns whether it was new.
    pub fn add(&self, value: impl Into<Value>) -> bool {
        let added = self.cell.items.borrow_mut().insert(value.into().to_raw());
        if added {
            self.trigger();
        }
        added
    }

    /// Remove a member. Returns whether it was present.
    pub fn delete(&self, value: &Value) -> bool {
        let removed = self.cell.items.borrow_mut().shift_take(value);
        let found = removed.is_some();
        drop(removed);
        if found {
            self.trigger();
        }
        found
    }

    pub fn has(&self, value: &Value) -> bool {
        self.track();
        self.cell.items.borrow().contains(value)
    }

    /// Snapshot of the members in insertion order.
    pub fn values(&self) -> Vec<Value> {
        self.track();
        self.cell.items.borrow().iter().cloned().collect()
    }

    /// Add many members with at most one trigger. Returns how many were new.
    pub fn add_all<I>(&self, values: I) -> usize
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let added = {
            let mut items = self.cell.items.borrow_mut();
            values
                .into_iter()
                .map(|value| items.insert(value.into().to_raw()))
                .filter(|&added| added)
                .count()
        };
        if added > 0 {
            self.trigger();
        }
        added
    }

    /// Remove many members with at most one trigger. Returns how many were
    /// present.
    pub fn delete_all<'a, I>(&self, values: I) -> usize
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let removed = {
            let mut items = self.cell.items.borrow_mut();
            values
                .into_iter()
                .filter_map(|value| items.shift_take(value))
                .collect::<Vec<_>>()
        };
        let count = removed.len();
        drop(removed);
        if count > 0 {
            self.trigger();
        }
        count
    }
}

/// A map from [`Value`] to [`Value`] with size-based tracking.
#[derive(Clone)]
pub struct MapRef {
    cell: Rc<CollectionCell<IndexMap<Value, Value>>>,
    reactive: bool,
}

collection_handle!(MapRef, IndexMap<Value, Value>);

impl MapRef {
    pub(crate) fn from_entries(entries: IndexMap<Value, Value>, reactive: bool) -> Self {
        Self::from_parts(entries, reactive)
    }

    /// Insert or replace an entry.
    ///
    /// Replacing a primitive with a strictly equal one is not a change.
    pub fn set(&self, key: impl Into<Value>, value: impl Into<Value>) {
        let changed = self.insert(key.into().to_raw(), value.into().to_raw());
        if changed {
            self.trigger();
        }
    }

    fn insert(&self, key: Value, value: Value) -> bool {
        let old = self.cell.items.borrow_mut().insert(key, value.clone());
        match old {
            Some(old) => value.is_object() || !old.strictly_equals(&value),
            None => true,
        }
    }

    pub fn get(&self, key: &Value) -> Option<Value> {
        self.track();
        self.cell.items.borrow().get(key).cloned()
    }

    pub fn has(&self, key: &Value) -> bool {
        self.track();
        self.cell.items.borrow().contains_key(key)
    }

    /// Remove an entry. Returns whether it was present.
    pub fn delete(&self, key: &Value) -> bool {
        let removed = self.cell.items.borrow_mut().shift_remove_entry(key);
        let found = removed.is_some();
        drop(removed);
        if found {
            self.trigger();
        }
        found
    }

    pub fn keys(&self) -> Vec<Value> {
        self.track();
        self.cell.items.borrow().keys().cloned().collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.track();
        self.cell.items.borrow().values().cloned().collect()
    }

    pub fn entries(&self) -> Vec<(Value, Value)> {
        self.track();
        self.cell
            .items
            .borrow()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Insert many entries with at most one trigger. Returns how many were
    /// changes.
    pub fn set_all<I, K, V>(&self, entries: I) -> usize
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Value>,
        V: Into<Value>,
    {
        let changed = entries
            .into_iter()
            .map(|(key, value)| self.insert(key.into().to_raw(), value.into().to_raw()))
            .filter(|&changed| changed)
            .count();
        if changed > 0 {
            self.trigger();
        }
        changed
    }

    /// Remove many entries with at most one trigger. Returns how many were
    /// present.
    pub fn delete_all<'a, I>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let removed = {
            let mut items = self.cell.items.borrow_mut();
            keys.into_iter()
                .filter_map(|key| items.shift_remove_entry(key))
                .collect::<Vec<_>>()
        };
        let count = removed.len();
        drop(removed);
        if count > 0 {
            self.trigger();
        }
        count
    }
}

/// Create a reactive set.
pub fn reactive_set<I>(values: I) -> SetRef
where
    I: IntoIterator,
    I::Item: Into<Value>,
{
    let items = values.into_iter().map(|v| v.into().to_raw()).collect();
    SetRef::from_items(items, true)
}

/// Create a reactive map.
pub fn reactive_map<I, K, V>(entries: I) -> MapRef
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<Value>,
    V: Into<Value>,
{
    let entries = entries
        .into_iter()
        .map(|(key, value)| (key.into().to_raw(), value.into().to_raw()))
        .collect();
    MapRef::from_entries(entries, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{flush_effects, reactive, Effect};

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
    fn every_read_tracks_size() {
        let set = reactive_set([1, 2]);
        let reader = set.clone();
        let (effect, runs) = watch(move || {
            reader.has(&Value::from(1));
            reader.values();
            reader.size();
        });
        assert_eq!(effect.dependency_count(), 1);

        set.add(3);
        flush_effects().unwrap();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn no_op_mutations_do_not_trigger() {
        let set = reactive_set([1]);
        let reader = set.clone();
        let (_effect, runs) = watch(move || {
            reader.size();
        });

        assert!(!set.add(1));
        assert!(!set.delete(&Value::from(9)));
        flush_effects().unwrap();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn bulk_operations_trigger_once() {
        let map = reactive_map::<[(Value, Value); 0], _, _>([]);
        let reader = map.clone();
        let (_effect, runs) = watch(move || {
            reader.size();
        });

        assert_eq!(map.set_all([("a", 1), ("b", 2), ("c", 3)]), 3);
        flush_effects().unwrap();
        assert_eq!(runs.get(), 2);

        let keys = [Value::from("a"), Value::from("z")];
        assert_eq!(map.delete_all(&keys), 1);
        flush_effects().unwrap();
        assert_eq!(runs.get(), 3);
        assert_eq!(map.get(&Value::from("b")), Some(Value::from(2)));
    }

    #[test]
    fn map_same_primitive_is_not_a_change() {
        let map = reactive_map([("k", 1)]);
        let reader = map.clone();
        let (_effect, runs) = watch(move || {
            reader.get(&Value::from("k"));
        });

        map.set("k", 1);
        flush_effects().unwrap();
        assert_eq!(runs.get(), 1);

        map.clear();
        flush_effects().unwrap();
        assert_eq!(runs.get(), 2);
        assert!(map.is_empty());
    }

    #[test]
    fn raw_collections_in_state_are_wrapped_on_access() {
        let state = reactive(Value::object([("tags", Value::set(["a"]))]));
        let tags = state.get("tags");
        assert!(tags.is_reactive());
        assert_eq!(tags, state.get("tags"));

        let reader = state.clone();
        let (_effect, runs) = watch(move || {
            if let Some(tags) = reader.get("tags").as_set() {
                tags.size();
            }
        });

        tags.as_set().unwrap().add("b");
        flush_effects().unwrap();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn members_compare_by_identity() {
        let item = Value::object([("id", Value::from(1))]);
        let set = reactive_set([item.clone()]);
        assert!(set.has(&reactive(item.clone())));
        assert!(!set.has(&Value::object([("id", Value::from(1))])));
    }
}
