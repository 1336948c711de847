//! Operation Tree
//!
//! The serialized form of a compiled template, as emitted by the template
//! compiler. Dynamic parts refer to entries of the values array by index.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One node of a compiled template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum TemplateIr {
    /// A subtree with no dynamic parts.
    Static { node: StaticIr },

    /// A text node with either literal content or a value slot.
    Text {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        slot: Option<usize>,
    },

    Element {
        tag: String,
        #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
        attrs: IndexMap<String, String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        dynamic: Vec<AttrSlot>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        events: Vec<EventSlot>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        children: Vec<TemplateIr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<KeyIr>,
    },

    Fragment {
        #[serde(default)]
        children: Vec<TemplateIr>,
        #[serde(default)]
        wrapped: bool,
    },

    /// A child position filled from the values array.
    Slot { slot: usize },
}

/// Static markup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StaticIr {
    Text(String),
    Element {
        tag: String,
        #[serde(default)]
        attrs: IndexMap<String, String>,
        #[serde(default)]
        children: Vec<StaticIr>,
    },
}

/// An attribute whose value comes from a slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttrSlot {
    pub name: String,
    pub slot: usize,
}

/// An event listener whose handler comes from a slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSlot {
    pub event: String,
    pub slot: usize,
}

/// An element key: literal, or read from a slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyIr {
    Slot { slot: usize },
    Literal(String),
}

impl TemplateIr {
    /// Parse an operation tree from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// The highest slot index referenced, if any.
    pub fn max_slot(&self) -> Option<usize> {
        match self {
            Self::Static { .. } => None,
            Self::Text { slot, .. } => *slot,
            Self::Slot { slot } => Some(*slot),
            Self::Fragment { children, .. } => children.iter().filter_map(Self::max_slot).max(),
            Self::Element {
                dynamic,
                events,
                children,
                key,
                ..
            } => {
                let key = match key {
                    Some(KeyIr::Slot { slot }) => Some(*slot),
                    _ => None,
                };
                dynamic
                    .iter()
                    .map(|attr| attr.slot)
                    .chain(events.iter().map(|event| event.slot))
                    .chain(key)
                    .chain(children.iter().filter_map(Self::max_slot))
                    .max()
            }
        }
    }
}
