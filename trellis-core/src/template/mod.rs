//! Compiled Templates
//!
//! A [`Template`] is a compiled operation tree: markup with numbered holes.
//! Rendering pairs it with a values array ([`Html`]) and [`Html::resolve`]
//! fills the holes to produce a [`VNode`] tree.
//!
//! Compilation folds every subtree without dynamic parts into a shared
//! [`StaticTree`]. Resolving the same template twice yields the same `Rc`
//! for those subtrees, so the diff skips them by identity.

mod ir;

use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::error::TemplateError;
use crate::reactive::{format_number, Value};
use crate::vdom::{is_custom_tag, AttrValue, Element, Handler, StaticTree, VNode};

pub use ir::{AttrSlot, EventSlot, KeyIr, StaticIr, TemplateIr};

/// A compiled template. Cheap to clone; clones share the compiled tree.
#[derive(Clone)]
pub struct Template {
    root: Rc<Op>,
}

enum Op {
    Static(Rc<StaticTree>),
    Text(Rc<str>),
    TextSlot(usize),
    Element(ElementOp),
    Fragment { children: Vec<Op>, wrapped: bool },
    Slot(usize),
}

struct ElementOp {
    tag: Rc<str>,
    attrs: Vec<(Rc<str>, Rc<str>)>,
    dynamic: Vec<(Rc<str>, usize)>,
    events: Vec<(Rc<str>, usize)>,
    key: Option<KeyOp>,
    children: Vec<Op>,
}

enum KeyOp {
    Literal(Rc<str>),
    Slot(usize),
}

impl Template {
    /// Compile an operation tree.
    pub fn compile(ir: &TemplateIr) -> Result<Self, TemplateError> {
        Ok(Self {
            root: Rc::new(compile_op(ir)?),
        })
    }

    /// Decode and compile an operation tree from JSON.
    pub fn from_json(json: &str) -> Result<Self, TemplateError> {
        let ir = TemplateIr::from_json(json)?;
        Self::compile(&ir)
    }

    /// Whether two handles share one compiled tree.
    pub fn ptr_eq(&self, other: &Template) -> bool {
        Rc::ptr_eq(&self.root, &other.root)
    }

    /// Pair this template with its values.
    pub fn with<I>(&self, values: I) -> Html
    where
        I: IntoIterator,
        I::Item: Into<Slot>,
    {
        Html {
            template: self.clone(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("root", &Rc::as_ptr(&self.root))
            .finish()
    }
}

fn compile_op(ir: &TemplateIr) -> Result<Op, TemplateError> {
    let op = match ir {
        TemplateIr::Static { node } => Op::Static(Rc::new(compile_static(node))),
        TemplateIr::Text { value, slot } => match (value, slot) {
            (None, Some(slot)) => Op::TextSlot(*slot),
            (Some(value), None) => Op::Text(Rc::from(value.as_str())),
            _ => {
                return Err(TemplateError::Decode(Rc::from(
                    "text operation needs exactly one of `value` and `slot`",
                )))
            }
        },
        TemplateIr::Slot { slot } => Op::Slot(*slot),
        TemplateIr::Fragment { children, wrapped } => Op::Fragment {
            children: children.iter().map(compile_op).collect::<Result<_, _>>()?,
            wrapped: *wrapped,
        },
        TemplateIr::Element {
            tag,
            attrs,
            dynamic,
            events,
            children,
            key,
        } => {
            let children = children.iter().map(compile_op).collect::<Result<Vec<_>, _>>()?;
            let element = ElementOp {
                tag: Rc::from(tag.as_str()),
                attrs: attrs
                    .iter()
                    .map(|(name, value)| (Rc::from(name.as_str()), Rc::from(value.as_str())))
                    .collect(),
                dynamic: dynamic
                    .iter()
                    .map(|attr| (Rc::from(attr.name.as_str()), attr.slot))
                    .collect(),
                events: events
                    .iter()
                    .map(|event| (Rc::from(event.event.as_str()), event.slot))
                    .collect(),
                key: key.as_ref().map(|key| match key {
                    KeyIr::Literal(key) => KeyOp::Literal(Rc::from(key.as_str())),
                    KeyIr::Slot { slot } => KeyOp::Slot(*slot),
                }),
                children,
            };
            promote(element)
        }
    };
    Ok(op)
}

/// Fold an element into a static tree when nothing under it is dynamic.
fn promote(element: ElementOp) -> Op {
    let fixed = element.dynamic.is_empty()
        && element.events.is_empty()
        && element.key.is_none()
        && !is_custom_tag(&element.tag)
        && element.children.iter().all(|child| matches!(child, Op::Static(_) | Op::Text(_)));
    if !fixed {
        return Op::Element(element);
    }

    let children = element
        .children
        .into_iter()
        .map(|child| match child {
            Op::Static(tree) => Rc::unwrap_or_clone(tree),
            Op::Text(text) => StaticTree::Text(text),
            _ => StaticTree::Text(Rc::from("")),
        })
        .collect();
    Op::Static(Rc::new(StaticTree::Element {
        tag: element.tag,
        attrs: element.attrs,
        children,
    }))
}

fn compile_static(node: &StaticIr) -> StaticTree {
    match node {
        StaticIr::Text(text) => StaticTree::Text(Rc::from(text.as_str())),
        StaticIr::Element {
            tag,
            attrs,
            children,
        } => StaticTree::Element {
            tag: Rc::from(tag.as_str()),
            attrs: attrs
                .iter()
                .map(|(name, value)| (Rc::from(name.as_str()), Rc::from(value.as_str())))
                .collect(),
            children: children.iter().map(compile_static).collect(),
        },
    }
}

/// A value filling one template hole.
#[derive(Clone)]
pub enum Slot {
    Value(Value),
    Node(VNode),
    /// A list of children, diffed as one keyed group.
    List(Vec<VNode>),
    Handler(Handler),
}

impl Slot {
    /// A handler slot from a closure.
    pub fn handler<F>(handler: F) -> Self
    where
        F: Fn(&crate::vdom::Event) + 'static,
    {
        Self::Handler(Rc::new(handler))
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Value(_) => "a value",
            Self::Node(_) => "a node",
            Self::List(_) => "a list",
            Self::Handler(_) => "an event handler",
        }
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Node(node) => f.debug_tuple("Node").field(node).finish(),
            Self::List(nodes) => f.debug_tuple("List").field(nodes).finish(),
            Self::Handler(_) => f.write_str("Handler"),
        }
    }
}

impl<T: Into<Value>> From<T> for Slot {
    fn from(value: T) -> Self {
        Self::Value(value.into())
    }
}

impl From<VNode> for Slot {
    fn from(node: VNode) -> Self {
        Self::Node(node)
    }
}

impl From<Vec<VNode>> for Slot {
    fn from(nodes: Vec<VNode>) -> Self {
        Self::List(nodes)
    }
}

impl From<Handler> for Slot {
    fn from(handler: Handler) -> Self {
        Self::Handler(handler)
    }
}

/// A template together with the values for one render.
#[derive(Debug, Clone)]
pub struct Html {
    pub template: Template,
    pub values: Vec<Slot>,
}

impl Html {
    pub fn new(template: Template, values: Vec<Slot>) -> Self {
        Self { template, values }
    }

    /// Fill the template's holes.
    pub fn resolve(&self) -> Result<VNode, TemplateError> {
        Resolver {
            values: &self.values,
        }
        .op(&self.template.root)
    }
}

struct Resolver<'a> {
    values: &'a [Slot],
}

impl Resolver<'_> {
    fn slot(&self, index: usize) -> Result<&Slot, TemplateError> {
        self.values.get(index).ok_or(TemplateError::MissingSlot {
            index,
            len: self.values.len(),
        })
    }

    fn value(&self, index: usize) -> Result<&Value, TemplateError> {
        match self.slot(index)? {
            Slot::Value(value) => Ok(value),
            _ => Err(TemplateError::SlotKind {
                index,
                expected: "a value",
            }),
        }
    }

    fn op(&self, op: &Op) -> Result<VNode, TemplateError> {
        let node = match op {
            Op::Static(tree) => VNode::Static(tree.clone()),
            Op::Text(text) => VNode::Text(text.clone()),
            Op::TextSlot(index) => VNode::text(self.value(*index)?.to_string()),
            Op::Slot(index) => self.child(*index)?,
            Op::Fragment { children, wrapped } => {
                let children = self.children(children)?;
                if *wrapped {
                    VNode::group(children)
                } else {
                    VNode::fragment(children)
                }
            }
            Op::Element(element) => VNode::from(self.element(element)?),
        };
        Ok(node)
    }

    fn children(&self, ops: &[Op]) -> Result<Vec<VNode>, TemplateError> {
        ops.iter().map(|op| self.op(op)).collect()
    }

    fn child(&self, index: usize) -> Result<VNode, TemplateError> {
        match self.slot(index)? {
            Slot::Node(node) => Ok(node.clone()),
            Slot::List(nodes) => Ok(VNode::group(nodes.iter().cloned())),
            Slot::Value(value) => Ok(value_node(value)),
            Slot::Handler(_) => Err(TemplateError::SlotKind {
                index,
                expected: "a child node, list or value",
            }),
        }
    }

    fn element(&self, op: &ElementOp) -> Result<Element, TemplateError> {
        let mut element = Element::new(&op.tag);
        for (name, value) in &op.attrs {
            element = element.attr(name, AttrValue::Text(value.clone()));
        }

        for (name, index) in &op.dynamic {
            let value = self.value(*index)?;
            if let Some(value) = attr_value(value) {
                element = element.attr(name, value);
            }
        }

        for (event, index) in &op.events {
            match self.slot(*index)? {
                Slot::Handler(handler) => element = element.handler(event, handler.clone()),
                Slot::Value(Value::Null) => {}
                other => {
                    debug!(index, kind = other.kind(), "event slot does not hold a handler");
                    return Err(TemplateError::SlotKind {
                        index: *index,
                        expected: "an event handler",
                    });
                }
            }
        }

        match &op.key {
            Some(KeyOp::Literal(key)) => element = element.key(key),
            Some(KeyOp::Slot(index)) => {
                let key = self.value(*index)?;
                if !key.is_null() {
                    element = element.key(key.to_string());
                }
            }
            None => {}
        }

        Ok(element.children(self.children(&op.children)?))
    }
}

/// Child content for a plain value: nothing for null and booleans, text for
/// primitives, one text per item for arrays.
fn value_node(value: &Value) -> VNode {
    match value {
        Value::Null | Value::Bool(_) => VNode::Empty,
        Value::Number(n) => VNode::text(format_number(*n)),
        Value::Str(text) => VNode::Text(text.clone()),
        Value::Object(object) if object.is_array() => {
            VNode::group(object.values().iter().map(value_node))
        }
        other => VNode::text(other.to_string()),
    }
}

fn attr_value(value: &Value) -> Option<AttrValue> {
    match value {
        Value::Null => None,
        Value::Bool(flag) => Some(AttrValue::Bool(*flag)),
        Value::Number(n) => Some(AttrValue::Text(Rc::from(format_number(*n)))),
        Value::Str(text) => Some(AttrValue::Text(text.clone())),
        other => Some(AttrValue::Data(other.clone())),
    }
}
