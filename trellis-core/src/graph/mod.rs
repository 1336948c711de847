//! Dependency Graph
//!
//! This module stores the relationships between reactive state and the
//! effects that read it.
//!
//! # Overview
//!
//! The graph is bipartite: one side holds targets (objects, arrays, sets and
//! maps living in reactive state), the other holds subscribers (effects).
//! An edge from `(target, key)` to a subscriber means "this subscriber read
//! that property during one of its runs".
//!
//! # Design Decisions
//!
//! 1. Targets are identified by stable integer handles rather than by
//!    address, so the map never keeps a target alive and needs no weak keys.
//!    When a target's cell is deallocated, its edges are forgotten.
//!
//! 2. Only the forward direction lives here. Each subscriber owns the reverse
//!    set, so disposal costs O(live deps) instead of O(all edges).
//!
//! 3. Edges are added on every run but only removed on disposal. A long-lived
//!    subscriber that stops reading a property keeps the stale edge until it
//!    is disposed; the worst case is an extra re-run.

mod deps;
mod target;

pub use deps::DependencyMap;
pub use target::{DepKey, Key, TargetId};
