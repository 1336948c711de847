//! Graph Targets and Keys
//!
//! This module defines the identifiers that live in the dependency map:
//! the target a property belongs to and the property key itself.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a tracked target (object, array, set or map cell).
///
/// Targets are never compared by address. Every heap cell that can be read
/// reactively draws one of these when it is allocated and keeps it for life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    /// Generate a new unique target ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for TargetId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for TargetId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// A property key on a target.
///
/// Keys are cheap to clone; the well-known synthetic keys are interned
/// constructors rather than magic strings spread through the crate.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(Rc<str>);

impl Key {
    /// The key every array index read and array mutation maps onto.
    pub const LENGTH: &'static str = "length";

    /// The key collections funnel all tracking through.
    pub const SIZE: &'static str = "size";

    /// The synthetic key tracked by key enumeration.
    pub const ITERATE: &'static str = "\u{0}iterate";

    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Rc::from(name.as_ref()))
    }

    pub fn length() -> Self {
        Self::new(Self::LENGTH)
    }

    pub fn size() -> Self {
        Self::new(Self::SIZE)
    }

    pub fn iterate() -> Self {
        Self::new(Self::ITERATE)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse the key as an array index, the way `"3"` addresses slot 3.
    pub fn as_index(&self) -> Option<usize> {
        let s = self.as_str();
        if s.is_empty() || (s.len() > 1 && s.starts_with('0')) {
            return None;
        }
        s.parse().ok()
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Self(Rc::from(name))
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Self::new(index.to_string())
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::borrow::Borrow<str> for Key {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

/// A single dependency: one property of one target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DepKey {
    pub target: TargetId,
    pub key: Key,
}

impl DepKey {
    pub fn new(target: TargetId, key: Key) -> Self {
        Self { target, key }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_ids_are_unique() {
        let id1 = TargetId::new();
        let id2 = TargetId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn key_parses_canonical_indices_only() {
        assert_eq!(Key::new("0").as_index(), Some(0));
        assert_eq!(Key::new("42").as_index(), Some(42));
        assert_eq!(Key::new("042").as_index(), None);
        assert_eq!(Key::new("-1").as_index(), None);
        assert_eq!(Key::new("length").as_index(), None);
        assert_eq!(Key::new("").as_index(), None);
    }

    #[test]
    fn synthetic_keys_do_not_collide_with_user_keys() {
        assert_ne!(Key::iterate(), Key::new("iterate"));
        assert_eq!(Key::from(3usize), Key::new("3"));
    }
}
