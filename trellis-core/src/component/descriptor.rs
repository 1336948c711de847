//! Component Descriptors
//!
//! A [`ComponentDef`] is plain data: what state a component starts with, how
//! it renders, which props it accepts, and its lifecycle hooks. One generic
//! host type ([`Component`]) interprets any descriptor.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::host::Component;
use crate::error::RenderError;
use crate::reactive::Value;
use crate::template::Html;
use crate::vdom::{Element, VNode};

/// What a render function produces.
#[derive(Debug, Clone)]
pub enum View {
    Html(Html),
    Node(VNode),
}

impl View {
    /// Resolve into a vnode tree.
    pub fn resolve(&self) -> Result<VNode, RenderError> {
        match self {
            Self::Html(html) => Ok(html.resolve()?),
            Self::Node(node) => Ok(node.clone()),
        }
    }
}

impl From<Html> for View {
    fn from(html: Html) -> Self {
        Self::Html(html)
    }
}

impl From<VNode> for View {
    fn from(node: VNode) -> Self {
        Self::Node(node)
    }
}

impl From<Element> for View {
    fn from(element: Element) -> Self {
        Self::Node(element.into())
    }
}

impl From<&str> for View {
    fn from(text: &str) -> Self {
        Self::Node(VNode::text(text))
    }
}

pub type StateFactory = Rc<dyn Fn() -> Value>;
pub type Renderer = Rc<dyn Fn(&Component) -> Result<View, RenderError>>;
pub type Method = Rc<dyn Fn(&Component, &[Value]) -> Value>;
pub type Hook = Rc<dyn Fn(&Component)>;
pub type ErrorHook = Rc<dyn Fn(&Component, &RenderError) -> Option<View>>;

/// A component definition.
#[derive(Clone)]
pub struct ComponentDef {
    pub(crate) tag: Rc<str>,
    pub(crate) state: Option<StateFactory>,
    pub(crate) render: Renderer,
    pub(crate) props: IndexMap<Rc<str>, Value>,
    pub(crate) methods: IndexMap<Rc<str>, Method>,
    pub(crate) stores: Vec<Value>,
    pub(crate) on_mounted: Option<Hook>,
    pub(crate) on_unmounted: Option<Hook>,
    pub(crate) on_error: Option<ErrorHook>,
}

impl ComponentDef {
    pub fn new<F, V>(tag: impl AsRef<str>, render: F) -> Self
    where
        F: Fn(&Component) -> Result<V, RenderError> + 'static,
        V: Into<View>,
    {
        Self {
            tag: Rc::from(tag.as_ref()),
            state: None,
            render: Rc::new(move |component| render(component).map(Into::into)),
            props: IndexMap::new(),
            methods: IndexMap::new(),
            stores: Vec::new(),
            on_mounted: None,
            on_unmounted: None,
            on_error: None,
        }
    }

    /// Initial state for each instance. Wrapped reactive on creation.
    pub fn state<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Value + 'static,
    {
        self.state = Some(Rc::new(factory));
        self
    }

    /// Declare a prop, synced from the host's attribute or property of the
    /// same name.
    pub fn prop(mut self, name: impl AsRef<str>, default: impl Into<Value>) -> Self {
        self.props.insert(Rc::from(name.as_ref()), default.into());
        self
    }

    pub fn method<F>(mut self, name: impl AsRef<str>, method: F) -> Self
    where
        F: Fn(&Component, &[Value]) -> Value + 'static,
    {
        self.methods.insert(Rc::from(name.as_ref()), Rc::new(method));
        self
    }

    /// Shared reactive state every instance re-renders on.
    pub fn store(mut self, store: Value) -> Self {
        self.stores.push(store);
        self
    }

    /// Runs in a microtask after the first render.
    pub fn on_mounted<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Component) + 'static,
    {
        self.on_mounted = Some(Rc::new(hook));
        self
    }

    /// Runs during unmount, after every cleanup callback.
    pub fn on_unmounted<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Component) + 'static,
    {
        self.on_unmounted = Some(Rc::new(hook));
        self
    }

    /// Make this component an error boundary for its descendants. Returning
    /// `Some` replaces this component's content with the fallback.
    pub fn on_error<F, V>(mut self, hook: F) -> Self
    where
        F: Fn(&Component, &RenderError) -> Option<V> + 'static,
        V: Into<View>,
    {
        self.on_error = Some(Rc::new(move |component, err| hook(component, err).map(Into::into)));
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn props(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.props.iter().map(|(name, value)| (&**name, value))
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn is_boundary(&self) -> bool {
        self.on_error.is_some()
    }
}

impl fmt::Debug for ComponentDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDef")
            .field("tag", &self.tag)
            .field("props", &self.props)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("stores", &self.stores.len())
            .field("boundary", &self.is_boundary())
            .finish()
    }
}

/// Custom element names: lowercase ASCII start, at least one dash, and no
/// uppercase letters or whitespace.
pub fn is_valid_tag_name(tag: &str) -> bool {
    tag.starts_with(|c: char| c.is_ascii_lowercase())
        && tag.contains('-')
        && !tag.chars().any(|c| c.is_ascii_uppercase() || c.is_whitespace())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_names() {
        assert!(is_valid_tag_name("x-card"));
        assert!(is_valid_tag_name("todo-list-item"));
        assert!(!is_valid_tag_name("card"));
        assert!(!is_valid_tag_name("X-card"));
        assert!(!is_valid_tag_name("-card"));
        assert!(!is_valid_tag_name("my card-x"));
    }

    #[test]
    fn builder_records_parts() {
        let def = ComponentDef::new("x-badge", |_| Ok("badge"))
            .prop("label", "new")
            .method("ping", |_, _| Value::from("pong"))
            .on_error(|_, _| Some("broken"));

        assert_eq!(def.tag(), "x-badge");
        assert_eq!(def.props().collect::<Vec<_>>(), vec![("label", &Value::from("new"))]);
        assert!(def.has_method("ping"));
        assert!(def.is_boundary());
    }
}
