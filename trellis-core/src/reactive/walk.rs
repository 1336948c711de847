//! Deep Tracking
//!
//! [`track_all_dependencies`] touches every reachable reactive property so
//! the active effect re-runs on any change anywhere in the tree. Component
//! render effects use it on their state and stores.
//!
//! Arrays longer than [`RuntimeConfig::deep_track_array_limit`] are tracked
//! through `length` only and their items are not visited. Sets and maps are
//! tracked through their size key and never walked.
//!
//! [`RuntimeConfig::deep_track_array_limit`]: crate::config::RuntimeConfig::deep_track_array_limit

use std::collections::HashSet;

use tracing::trace;

use super::runtime;
use super::value::Value;
use crate::graph::TargetId;

/// Track every reactive property reachable from `value`.
///
/// Untracked subtrees and raw handles are not entered. Cycles are safe.
pub fn track_all_dependencies(value: &Value) {
    let mut visited = HashSet::new();
    track_all_dependencies_with(value, &mut visited);
}

/// Like [`track_all_dependencies`], sharing a visited set across calls so a
/// target reachable from several roots is walked once.
pub fn track_all_dependencies_with(value: &Value, visited: &mut HashSet<TargetId>) {
    let limit = runtime::config().deep_track_array_limit;
    walk(value, visited, limit);
}

fn walk(value: &Value, visited: &mut HashSet<TargetId>, limit: usize) {
    if !value.is_reactive() {
        return;
    }

    match value {
        Value::Object(object) => {
            if !visited.insert(object.id()) {
                return;
            }

            if object.is_array() {
                let len = object.len();
                if len > limit {
                    return;
                }
                for index in 0..len {
                    match object.try_at(index) {
                        Some(item) => walk(&item, visited, limit),
                        None => trace!(target_id = object.id().raw(), index, "skipping busy array slot"),
                    }
                }
            } else {
                for key in object.keys() {
                    match object.try_get(&key) {
                        Some(child) => walk(&child, visited, limit),
                        None => trace!(target_id = object.id().raw(), key = %key, "skipping busy property"),
                    }
                }
            }
        }
        Value::Set(set) => {
            if visited.insert(set.id()) {
                set.size();
            }
        }
        Value::Map(map) => {
            if visited.insert(map.id()) {
                map.size();
            }
        }
        _ => {}
    }
}
