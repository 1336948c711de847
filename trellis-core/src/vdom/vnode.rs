//! Virtual Nodes
//!
//! A [`VNode`] is a cheap description of what a piece of the DOM should look
//! like. Render functions produce them; [`diff`](super::diff) turns them into
//! DOM mutations.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use indexmap::IndexMap;

use super::dom::Event;
use crate::error::RenderError;
use crate::reactive::{panic_message, Value};

/// An event listener.
pub type Handler = Rc<dyn Fn(&Event)>;

/// Produces a thunk's content.
pub type RenderFn = Rc<dyn Fn() -> Result<VNode, RenderError>>;

/// Error-boundary hook. Returning `Some` handles the error and replaces the
/// boundary's content with the returned fallback.
pub type CatchFn = Rc<dyn Fn(&RenderError) -> Option<VNode>>;

/// A node description.
#[derive(Clone, Default)]
pub enum VNode {
    /// A hole. Renders nothing but keeps its position among siblings.
    #[default]
    Empty,
    /// A subtree fixed at template compile time.
    Static(Rc<StaticTree>),
    Text(Rc<str>),
    Element(Rc<Element>),
    Fragment(Fragment),
    /// A lazily rendered subtree.
    Thunk(Rc<Thunk>),
}

impl VNode {
    pub fn text(text: impl AsRef<str>) -> Self {
        Self::Text(Rc::from(text.as_ref()))
    }

    /// An unwrapped fragment, spliced into its parent's child list.
    pub fn fragment<I>(children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<VNode>,
    {
        Self::Fragment(Fragment {
            children: children.into_iter().map(Into::into).collect(),
            wrapped: false,
            key: None,
        })
    }

    /// A wrapped fragment, diffed as one sibling.
    pub fn group<I>(children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<VNode>,
    {
        Self::Fragment(Fragment {
            children: children.into_iter().map(Into::into).collect(),
            wrapped: true,
            key: None,
        })
    }

    /// A wrapped fragment with a key.
    pub fn keyed_group<I>(key: impl AsRef<str>, children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<VNode>,
    {
        match Self::group(children) {
            Self::Fragment(mut fragment) => {
                fragment.key = Some(Rc::from(key.as_ref()));
                Self::Fragment(fragment)
            }
            other => other,
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Element(element) => element.key.as_deref(),
            Self::Fragment(fragment) => fragment.key.as_deref(),
            Self::Thunk(thunk) => thunk.key.as_deref(),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Whether this node owns no DOM of its own and diffs its children in
    /// its parent's child list.
    pub(crate) fn is_group(&self) -> bool {
        matches!(self, Self::Fragment(_) | Self::Thunk(_))
    }

    pub(crate) fn node_type(&self) -> NodeType<'_> {
        match self {
            Self::Empty => NodeType::Empty,
            Self::Static(tree) => NodeType::Static(Rc::as_ptr(tree) as usize),
            Self::Text(_) => NodeType::Text,
            Self::Element(element) => NodeType::Element(&element.tag),
            Self::Fragment(_) => NodeType::Fragment,
            Self::Thunk(thunk) => NodeType::Thunk(&thunk.name),
        }
    }

    /// Flatten into a sibling list: unwrapped fragments are spliced in,
    /// everything else is kept as one entry.
    pub(crate) fn into_children(self) -> Vec<VNode> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    pub(crate) fn flatten_into(self, out: &mut Vec<VNode>) {
        match self {
            Self::Fragment(fragment) if !fragment.wrapped => {
                for child in fragment.children {
                    child.flatten_into(out);
                }
            }
            other => out.push(other),
        }
    }
}

/// Identity used to decide whether an old node can be reused for a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeType<'a> {
    Empty,
    Static(usize),
    Text,
    Element(&'a str),
    Fragment,
    Thunk(&'a str),
}

impl From<Element> for VNode {
    fn from(element: Element) -> Self {
        Self::Element(Rc::new(element))
    }
}

impl From<Thunk> for VNode {
    fn from(thunk: Thunk) -> Self {
        Self::Thunk(Rc::new(thunk))
    }
}

impl From<StaticTree> for VNode {
    fn from(tree: StaticTree) -> Self {
        Self::Static(Rc::new(tree))
    }
}

impl From<&str> for VNode {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<String> for VNode {
    fn from(text: String) -> Self {
        Self::Text(Rc::from(text))
    }
}

impl fmt::Debug for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Static(tree) => f.debug_tuple("Static").field(tree).finish(),
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Element(element) => element.fmt(f),
            Self::Fragment(fragment) => f
                .debug_struct("Fragment")
                .field("key", &fragment.key)
                .field("wrapped", &fragment.wrapped)
                .field("children", &fragment.children)
                .finish(),
            Self::Thunk(thunk) => f
                .debug_struct("Thunk")
                .field("name", &thunk.name)
                .field("key", &thunk.key)
                .finish(),
        }
    }
}

/// An attribute or property value on an element.
#[derive(Debug, Clone)]
pub enum AttrValue {
    /// Set as a string attribute.
    Text(Rc<str>),
    /// `true` sets an empty attribute, `false` removes it.
    Bool(bool),
    /// Set as a DOM property.
    Data(Value),
}

impl PartialEq for AttrValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Data(a), Self::Data(b)) => a == b,
            _ => false,
        }
    }
}

impl AttrValue {
    /// The value as a property would hold it.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Text(text) => Value::Str(text.clone()),
            Self::Bool(b) => Value::Bool(*b),
            Self::Data(value) => value.clone(),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(text: &str) -> Self {
        Self::Text(Rc::from(text))
    }
}

impl From<String> for AttrValue {
    fn from(text: String) -> Self {
        Self::Text(Rc::from(text))
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Value> for AttrValue {
    fn from(value: Value) -> Self {
        Self::Data(value)
    }
}

/// An element description.
#[derive(Clone)]
pub struct Element {
    pub tag: Rc<str>,
    pub key: Option<Rc<str>>,
    pub attrs: IndexMap<Rc<str>, AttrValue>,
    pub listeners: IndexMap<Rc<str>, Handler>,
    pub children: Vec<VNode>,
}

impl Element {
    pub fn new(tag: impl AsRef<str>) -> Self {
        Self {
            tag: Rc::from(tag.as_ref()),
            key: None,
            attrs: IndexMap::new(),
            listeners: IndexMap::new(),
            children: Vec::new(),
        }
    }

    pub fn key(mut self, key: impl AsRef<str>) -> Self {
        self.key = Some(Rc::from(key.as_ref()));
        self
    }

    pub fn attr(mut self, name: impl AsRef<str>, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(Rc::from(name.as_ref()), value.into());
        self
    }

    pub fn on<F>(self, event: impl AsRef<str>, handler: F) -> Self
    where
        F: Fn(&Event) + 'static,
    {
        self.handler(event, Rc::new(handler))
    }

    pub fn handler(mut self, event: impl AsRef<str>, handler: Handler) -> Self {
        self.listeners.insert(Rc::from(event.as_ref()), handler);
        self
    }

    pub fn child(mut self, child: impl Into<VNode>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children<I>(mut self, children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<VNode>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }

    /// Custom elements carry a dash in their tag name.
    pub fn is_custom(&self) -> bool {
        is_custom_tag(&self.tag)
    }
}

pub(crate) fn is_custom_tag(tag: &str) -> bool {
    tag.contains('-')
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("tag", &self.tag)
            .field("key", &self.key)
            .field("attrs", &self.attrs)
            .field("listeners", &self.listeners.keys().collect::<Vec<_>>())
            .field("children", &self.children)
            .finish()
    }
}

/// A list of children.
#[derive(Debug, Clone, Default)]
pub struct Fragment {
    pub children: Vec<VNode>,
    pub wrapped: bool,
    pub key: Option<Rc<str>>,
}

/// A subtree fixed at template compile time. Never diffed.
#[derive(Debug, Clone, PartialEq)]
pub enum StaticTree {
    Text(Rc<str>),
    Element {
        tag: Rc<str>,
        attrs: Vec<(Rc<str>, Rc<str>)>,
        children: Vec<StaticTree>,
    },
}

/// A lazily rendered subtree.
///
/// The render function runs during the diff. It may fail or suspend; both
/// are handled by the reconciler instead of aborting the pass.
pub struct Thunk {
    pub name: Rc<str>,
    pub key: Option<Rc<str>>,
    /// When set and equal to the previous render's memo, rendering is
    /// skipped unless the previous render was marked dirty.
    pub memo: Option<Value>,
    render: RenderFn,
    catch: Option<CatchFn>,
}

impl Thunk {
    pub fn new<F>(name: impl AsRef<str>, render: F) -> Self
    where
        F: Fn() -> Result<VNode, RenderError> + 'static,
    {
        Self {
            name: Rc::from(name.as_ref()),
            key: None,
            memo: None,
            render: Rc::new(render),
            catch: None,
        }
    }

    pub fn key(mut self, key: impl AsRef<str>) -> Self {
        self.key = Some(Rc::from(key.as_ref()));
        self
    }

    pub fn memo(mut self, memo: impl Into<Value>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    /// Make this thunk an error boundary for its descendants.
    pub fn catch<F>(mut self, handler: F) -> Self
    where
        F: Fn(&RenderError) -> Option<VNode> + 'static,
    {
        self.catch = Some(Rc::new(handler));
        self
    }

    pub(crate) fn catch_fn(&self) -> Option<CatchFn> {
        self.catch.clone()
    }

    /// Run the render function. A panic is reported as a failed render.
    pub fn render(&self) -> Result<VNode, RenderError> {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.render)())) {
            Ok(result) => result,
            Err(payload) => Err(RenderError::failed(panic_message(payload.as_ref()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwrapped_fragments_flatten() {
        let node = VNode::fragment([
            VNode::text("a"),
            VNode::fragment([VNode::text("b"), VNode::text("c")]),
            VNode::group([VNode::text("d")]),
        ]);

        let children = node.into_children();
        assert_eq!(children.len(), 4);
        assert!(matches!(children[3], VNode::Fragment(ref f) if f.wrapped));
    }

    #[test]
    fn node_types() {
        let li = VNode::from(Element::new("li").key("a"));
        assert_eq!(li.node_type(), NodeType::Element("li"));
        assert_eq!(li.key(), Some("a"));

        let tree = Rc::new(StaticTree::Text(Rc::from("x")));
        let a = VNode::Static(tree.clone());
        let b = VNode::Static(tree);
        assert_eq!(a.node_type(), b.node_type());
        assert_ne!(a.node_type(), VNode::from(StaticTree::Text(Rc::from("x"))).node_type());
    }

    #[test]
    fn panicking_render_is_a_failure() {
        let thunk = Thunk::new("broken", || panic!("no data"));
        let err = thunk.render().unwrap_err();
        assert!(!err.is_suspension());
        assert_eq!(err.to_string(), "no data");
    }

    #[test]
    fn custom_tags() {
        assert!(Element::new("x-card").is_custom());
        assert!(!Element::new("div").is_custom());
    }
}
