//! Dynamic State Values
//!
//! [`Value`] is what component state is made of: primitives plus references
//! to heap cells (objects, arrays, sets, maps) that can be read reactively.
//!
//! # Identity
//!
//! References compare by cell identity, never structurally, and numbers
//! compare with NaN equal to itself. This is the equality sets and maps use
//! for their members, so a `Value` can key a reactive collection directly.
//!
//! Assignment uses [`Value::strictly_equals`] instead, under which NaN is
//! never equal to anything. Assigning NaN over NaN therefore always counts
//! as a change.

use std::cell::Cell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

use super::collections::{MapRef, SetRef};
use super::proxy::ObjectRef;
use crate::graph::{Key, TargetId};

/// A dynamically typed state value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    /// A plain object or an array.
    Object(ObjectRef),
    Set(SetRef),
    Map(MapRef),
    /// A host instance the runtime never wraps.
    Host(HostRef),
}

impl Value {
    /// Create a raw (not yet reactive) object.
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<Key>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let entries = entries
            .into_iter()
            .map(|(key, value)| (key.into(), value.to_raw()))
            .collect::<IndexMap<_, _>>();
        Self::Object(ObjectRef::new_object(entries))
    }

    /// Create a raw (not yet reactive) array.
    pub fn array<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let items = items.into_iter().map(|item| item.into().to_raw()).collect();
        Self::Object(ObjectRef::new_array(items))
    }

    /// Create a raw set.
    pub fn set<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let items = items
            .into_iter()
            .map(|item| item.into().to_raw())
            .collect::<IndexSet<_>>();
        Self::Set(SetRef::from_items(items, false))
    }

    /// Create a raw map.
    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Value>,
        V: Into<Value>,
    {
        let entries = entries
            .into_iter()
            .map(|(key, value)| (key.into().to_raw(), value.into().to_raw()))
            .collect::<IndexMap<_, _>>();
        Self::Map(MapRef::from_entries(entries, false))
    }

    /// Create a host value of the given kind.
    pub fn host(kind: HostKind, label: impl AsRef<str>) -> Self {
        Self::Host(HostRef::new(kind, label))
    }

    pub fn str(text: impl AsRef<str>) -> Self {
        Self::Str(Rc::from(text.as_ref()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether this is a reference rather than a primitive.
    pub fn is_object(&self) -> bool {
        matches!(
            self,
            Self::Object(_) | Self::Set(_) | Self::Map(_) | Self::Host(_)
        )
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&SetRef> {
        match self {
            Self::Set(set) => Some(set),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MapRef> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// JavaScript-style truthiness.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Read a property through this value, or `Null` if it is not an object.
    pub fn get(&self, key: impl Into<Key>) -> Value {
        match self {
            Self::Object(object) => object.get(key),
            _ => Self::Null,
        }
    }

    /// Read an array slot through this value, or `Null`.
    pub fn at(&self, index: usize) -> Value {
        match self {
            Self::Object(object) => object.at(index),
            _ => Self::Null,
        }
    }

    /// Whether the reference carries the reactive marker.
    pub fn is_reactive(&self) -> bool {
        match self {
            Self::Object(object) => object.is_reactive(),
            Self::Set(set) => set.is_reactive(),
            Self::Map(map) => map.is_reactive(),
            _ => false,
        }
    }

    /// Whether the referenced cell is marked untracked.
    pub fn is_untracked(&self) -> bool {
        match self {
            Self::Object(object) => object.is_untracked(),
            Self::Set(set) => set.is_untracked(),
            Self::Map(map) => map.is_untracked(),
            _ => false,
        }
    }

    /// Mark the referenced cell untracked. Primitives are left alone.
    pub(crate) fn mark_untracked(&self) {
        match self {
            Self::Object(object) => object.mark_untracked(),
            Self::Set(set) => set.mark_untracked(),
            Self::Map(map) => map.mark_untracked(),
            _ => {}
        }
    }

    /// The same value with the reactive marker removed.
    pub fn to_raw(&self) -> Value {
        match self {
            Self::Object(object) => Self::Object(object.to_raw()),
            Self::Set(set) => Self::Set(set.to_raw()),
            Self::Map(map) => Self::Map(map.to_raw()),
            other => other.clone(),
        }
    }

    /// The target handle of a referenced cell.
    pub fn target_id(&self) -> Option<TargetId> {
        match self {
            Self::Object(object) => Some(object.id()),
            Self::Set(set) => Some(set.id()),
            Self::Map(map) => Some(map.id()),
            _ => None,
        }
    }

    /// `===` semantics: like `==` but NaN is never equal.
    pub fn strictly_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a == b,
            _ => self == other,
        }
    }

    /// Convert from JSON into raw state.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Self::Str(Rc::from(s)),
            serde_json::Value::Array(items) => Self::array(items.into_iter().map(Self::from_json)),
            serde_json::Value::Object(entries) => {
                Self::object(entries.into_iter().map(|(k, v)| (k, Self::from_json(v))))
            }
        }
    }

    /// Snapshot into JSON without tracking.
    ///
    /// Sets become arrays; maps become objects keyed by the string form of
    /// their keys. Host values and cycles become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut seen = Vec::new();
        self.to_json_inner(&mut seen)
    }

    fn to_json_inner(&self, seen: &mut Vec<TargetId>) -> serde_json::Value {
        use serde_json::Value as Json;

        if let Some(id) = self.target_id() {
            if seen.contains(&id) {
                return Json::Null;
            }
            seen.push(id);
        }

        let json = match self {
            Self::Null | Self::Host(_) => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => Json::from(*n as i64),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Self::Str(s) => Json::String(s.to_string()),
            Self::Object(object) => {
                let raw = object.to_raw();
                if raw.is_array() {
                    Json::Array(
                        raw.values()
                            .iter()
                            .map(|item| item.to_json_inner(seen))
                            .collect(),
                    )
                } else {
                    Json::Object(
                        raw.entries()
                            .into_iter()
                            .map(|(key, value)| (key.to_string(), value.to_json_inner(seen)))
                            .collect(),
                    )
                }
            }
            Self::Set(set) => Json::Array(
                set.to_raw()
                    .values()
                    .iter()
                    .map(|item| item.to_json_inner(seen))
                    .collect(),
            ),
            Self::Map(map) => Json::Object(
                map.to_raw()
                    .entries()
                    .into_iter()
                    .map(|(key, value)| (key.to_string(), value.to_json_inner(seen)))
                    .collect(),
            ),
        };

        if self.target_id().is_some() {
            seen.pop();
        }
        json
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Set(a), Self::Set(b)) => a.ptr_eq(b),
            (Self::Map(a), Self::Map(b)) => a.ptr_eq(b),
            (Self::Host(a), Self::Host(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(b) => b.hash(state),
            Self::Number(n) => {
                if n.is_nan() {
                    u64::MAX.hash(state);
                } else if *n == 0.0 {
                    0u64.hash(state);
                } else {
                    n.to_bits().hash(state);
                }
            }
            Self::Str(s) => s.hash(state),
            Self::Object(object) => object.id().hash(state),
            Self::Set(set) => set.id().hash(state),
            Self::Map(map) => map.id().hash(state),
            Self::Host(host) => host.id().hash(state),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => f.write_str(&format_number(*n)),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Object(object) => object.fmt(f),
            Self::Set(set) => set.fmt(f),
            Self::Map(map) => map.fmt(f),
            Self::Host(host) => host.fmt(f),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => f.write_str(&format_number(*n)),
            Self::Str(s) => f.write_str(s),
            Self::Object(object) if object.is_array() => {
                let items = object.to_raw().values();
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    if !item.is_null() {
                        write!(f, "{item}")?;
                    }
                }
                Ok(())
            }
            Self::Object(_) => f.write_str("[object Object]"),
            Self::Set(_) => f.write_str("[object Set]"),
            Self::Map(_) => f.write_str("[object Map]"),
            Self::Host(host) => write!(f, "[object {}]", host.kind().name()),
        }
    }
}

/// Format a number the way it reads in rendered text.
pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        format!("{n}")
    }
}

macro_rules! value_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Self::Number(n as f64)
                }
            }
        )*
    };
}

value_from_number!(i32, i64, u32, u64, usize, f32, f64);

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(Rc::from(s))
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Self::Str(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

impl From<ObjectRef> for Value {
    fn from(object: ObjectRef) -> Self {
        Self::Object(object)
    }
}

impl From<SetRef> for Value {
    fn from(set: SetRef) -> Self {
        Self::Set(set)
    }
}

impl From<MapRef> for Value {
    fn from(map: MapRef) -> Self {
        Self::Map(map)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Self::from_json(json)
    }
}

/// Kinds of host instance the proxy factory refuses to wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostKind {
    Promise,
    Error,
    Node,
    WeakSet,
    WeakMap,
}

impl HostKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Promise => "Promise",
            Self::Error => "Error",
            Self::Node => "Node",
            Self::WeakSet => "WeakSet",
            Self::WeakMap => "WeakMap",
        }
    }
}

/// An opaque host instance with reference identity.
#[derive(Clone)]
pub struct HostRef(Rc<HostInner>);

struct HostInner {
    id: TargetId,
    kind: HostKind,
    label: Rc<str>,
    settled: Cell<bool>,
}

impl HostRef {
    pub fn new(kind: HostKind, label: impl AsRef<str>) -> Self {
        Self(Rc::new(HostInner {
            id: TargetId::new(),
            kind,
            label: Rc::from(label.as_ref()),
            settled: Cell::new(false),
        }))
    }

    pub fn id(&self) -> TargetId {
        self.0.id
    }

    pub fn kind(&self) -> HostKind {
        self.0.kind
    }

    pub fn label(&self) -> &str {
        &self.0.label
    }

    /// For promises: whether the host reported completion.
    pub fn is_settled(&self) -> bool {
        self.0.settled.get()
    }

    pub fn settle(&self) {
        self.0.settled.set(true);
    }

    pub fn ptr_eq(&self, other: &HostRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for HostRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.0.kind.name(), self.0.label)
    }
}
