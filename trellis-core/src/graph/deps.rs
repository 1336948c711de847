//! Dependency Map
//!
//! Maps `(target, key)` pairs to the subscribers that read them.
//!
//! # Layout
//!
//! Edges are stored in two levels, target first, so that forgetting a dropped
//! target is a single removal instead of a scan over every key in the map.
//! Subscriber sets keep insertion order; triggering walks them in the order
//! the reads happened.
//!
//! The map only stores edges in one direction. Subscribers keep their own
//! reverse set of [`DepKey`]s, which is what makes removal proportional to a
//! subscriber's live dependencies instead of to the whole map.

use std::collections::HashMap;
use std::hash::Hash;

use indexmap::IndexSet;
use smallvec::SmallVec;

use super::target::{DepKey, Key, TargetId};

/// Process-wide (per thread) dependency storage.
#[derive(Debug)]
pub struct DependencyMap<S> {
    /// All edges, indexed by target and then by key.
    edges: HashMap<TargetId, HashMap<Key, IndexSet<S>>>,
}

impl<S> DependencyMap<S>
where
    S: Copy + Eq + Hash,
{
    /// Create a new empty map.
    pub fn new() -> Self {
        Self {
            edges: HashMap::new(),
        }
    }

    /// Add an edge: `subscriber` read `dep`.
    ///
    /// Returns `true` if the edge is new.
    pub fn add(&mut self, dep: &DepKey, subscriber: S) -> bool {
        self.edges
            .entry(dep.target)
            .or_default()
            .entry(dep.key.clone())
            .or_default()
            .insert(subscriber)
    }

    /// Remove one edge, dropping empty buckets on the way out.
    pub fn remove(&mut self, dep: &DepKey, subscriber: S) {
        let Some(keys) = self.edges.get_mut(&dep.target) else {
            return;
        };
        if let Some(subscribers) = keys.get_mut(&dep.key) {
            subscribers.shift_remove(&subscriber);
            if subscribers.is_empty() {
                keys.remove(&dep.key);
            }
        }
        if keys.is_empty() {
            self.edges.remove(&dep.target);
        }
    }

    /// Get the subscribers of one property, in registration order.
    pub fn dependents(&self, target: TargetId, key: &Key) -> SmallVec<[S; 4]> {
        self.edges
            .get(&target)
            .and_then(|keys| keys.get(key))
            .map(|subscribers| subscribers.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Drop every edge that points at `target`.
    ///
    /// Called when the target's cell is deallocated. Subscribers may still hold
    /// reverse edges for it; those are harmless because the target id is never
    /// reused.
    pub fn forget_target(&mut self, target: TargetId) {
        self.edges.remove(&target);
    }

    /// Check whether any subscriber depends on the given property.
    pub fn has_dependents(&self, target: TargetId, key: &Key) -> bool {
        self.edges
            .get(&target)
            .and_then(|keys| keys.get(key))
            .is_some_and(|subscribers| !subscribers.is_empty())
    }

    /// Get the number of targets with at least one edge.
    pub fn target_count(&self) -> usize {
        self.edges.len()
    }

    /// Get the total number of edges in the map.
    pub fn edge_count(&self) -> usize {
        self.edges
            .values()
            .flat_map(|keys| keys.values())
            .map(IndexSet::len)
            .sum()
    }
}

impl<S> Default for DependencyMap<S>
where
    S: Copy + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dep(target: TargetId, key: &str) -> DepKey {
        DepKey::new(target, Key::new(key))
    }

    #[test]
    fn add_and_remove_edges() {
        let mut map = DependencyMap::new();
        let target = TargetId::new();

        assert!(map.add(&dep(target, "count"), 1u64));
        assert!(!map.add(&dep(target, "count"), 1u64));
        assert!(map.add(&dep(target, "count"), 2u64));

        assert_eq!(map.dependents(target, &Key::new("count")).as_slice(), &[1, 2]);
        assert_eq!(map.edge_count(), 2);

        map.remove(&dep(target, "count"), 1);
        assert_eq!(map.dependents(target, &Key::new("count")).as_slice(), &[2]);

        map.remove(&dep(target, "count"), 2);
        assert!(!map.has_dependents(target, &Key::new("count")));
        assert_eq!(map.target_count(), 0);
    }

    #[test]
    fn dependents_of_unknown_property_is_empty() {
        let map: DependencyMap<u64> = DependencyMap::new();
        assert!(map.dependents(TargetId::new(), &Key::new("x")).is_empty());
    }

    #[test]
    fn keys_are_independent() {
        let mut map = DependencyMap::new();
        let target = TargetId::new();

        map.add(&dep(target, "a"), 1u64);
        map.add(&dep(target, "b"), 2u64);

        assert_eq!(map.dependents(target, &Key::new("a")).as_slice(), &[1]);
        assert_eq!(map.dependents(target, &Key::new("b")).as_slice(), &[2]);
    }

    #[test]
    fn forget_target_drops_all_keys() {
        let mut map = DependencyMap::new();
        let target = TargetId::new();
        let other = TargetId::new();

        map.add(&dep(target, "a"), 1u64);
        map.add(&dep(target, "b"), 1u64);
        map.add(&dep(other, "a"), 1u64);

        map.forget_target(target);

        assert_eq!(map.target_count(), 1);
        assert!(map.has_dependents(other, &Key::new("a")));
    }
}
