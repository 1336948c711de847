//! Component Instances
//!
//! A [`Component`] is one mounted instance of a [`ComponentDef`], bound to a
//! custom element in the document. It owns the instance's reactive state and
//! props, its place in the component tree, and the cleanup callbacks that
//! run when it is unmounted.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use tracing::error;

use super::coordinator::{App, AppInner};
use super::descriptor::ComponentDef;
use crate::error::{Error, Result};
use crate::reactive::{panic_message, reactive, Effect, ObjectRef, Value};
use crate::vdom::{DiffState, NodeId, VNode};

/// Slot that holds children without a `slot` attribute.
pub const DEFAULT_SLOT: &str = "default";

/// A mounted component. Cheap to clone; clones refer to the same instance.
#[derive(Clone)]
pub struct Component(pub(crate) Rc<ComponentInner>);

pub(crate) struct ComponentInner {
    pub(crate) def: Rc<ComponentDef>,
    pub(crate) host: NodeId,
    pub(crate) state: Value,
    pub(crate) props: ObjectRef,
    pub(crate) slots: RefCell<IndexMap<Rc<str>, Vec<VNode>>>,
    pub(crate) stores: RefCell<Vec<Value>>,

    pub(crate) parent: RefCell<Weak<ComponentInner>>,
    /// Created on first child registration.
    pub(crate) children: RefCell<Option<Vec<Component>>>,
    pub(crate) root: Cell<bool>,

    pub(crate) mounted: Cell<bool>,
    pub(crate) destroyed: Cell<bool>,
    pub(crate) cleanups: RefCell<Vec<Box<dyn FnOnce()>>>,
    pub(crate) render_effect: RefCell<Option<Effect>>,
    pub(crate) diff_state: RefCell<Option<DiffState>>,

    pub(crate) app: Weak<AppInner>,
}

impl Component {
    pub(crate) fn new(def: Rc<ComponentDef>, host: NodeId, app: Weak<AppInner>) -> Self {
        let state = match &def.state {
            Some(factory) => reactive(factory()),
            None => reactive(Value::object::<&str, _>([])),
        };

        let props = Value::object(def.props.iter().map(|(name, value)| (&**name, value.clone())));
        let props = match reactive(props) {
            Value::Object(props) => props,
            _ => ObjectRef::new_object(IndexMap::new()).wrap(),
        };

        let stores = def.stores.iter().map(|store| reactive(store.clone())).collect();

        Self(Rc::new(ComponentInner {
            def,
            host,
            state,
            props,
            slots: RefCell::new(IndexMap::new()),
            stores: RefCell::new(stores),
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(None),
            root: Cell::new(false),
            mounted: Cell::new(false),
            destroyed: Cell::new(false),
            cleanups: RefCell::new(Vec::new()),
            render_effect: RefCell::new(None),
            diff_state: RefCell::new(None),
            app,
        }))
    }

    pub fn host(&self) -> NodeId {
        self.0.host
    }

    /// The app this component is mounted in, while it is alive.
    pub fn app(&self) -> Option<App> {
        self.0.app.upgrade().map(App)
    }

    pub fn tag(&self) -> &str {
        &self.0.def.tag
    }

    pub fn definition(&self) -> &ComponentDef {
        &self.0.def
    }

    /// The instance's reactive state.
    pub fn state(&self) -> Value {
        self.0.state.clone()
    }

    /// The instance's reactive props object.
    pub fn props(&self) -> Value {
        Value::Object(self.0.props.clone())
    }

    pub fn prop(&self, name: &str) -> Value {
        self.0.props.get(name)
    }

    /// Children the parent placed in the named slot.
    pub fn slot(&self, name: &str) -> Vec<VNode> {
        self.0.slots.borrow().get(name).cloned().unwrap_or_default()
    }

    /// Children the parent placed without a slot name.
    pub fn default_slot(&self) -> Vec<VNode> {
        self.slot(DEFAULT_SLOT)
    }

    pub fn slot_names(&self) -> Vec<Rc<str>> {
        self.0.slots.borrow().keys().cloned().collect()
    }

    pub fn is_mounted(&self) -> bool {
        self.0.mounted.get()
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.get()
    }

    /// Whether this component has no component ancestor.
    pub fn is_root(&self) -> bool {
        self.0.root.get()
    }

    pub fn parent(&self) -> Option<Component> {
        self.0.parent.borrow().upgrade().map(Component)
    }

    pub fn children(&self) -> Vec<Component> {
        self.0.children.borrow().clone().unwrap_or_default()
    }

    /// The nearest ancestor (or self) without a parent.
    pub fn render_root(&self) -> Component {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    pub fn ptr_eq(&self, other: &Component) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Invoke a method declared on the definition.
    pub fn call(&self, method: &str, args: &[Value]) -> Result<Value> {
        let Some(method) = self.0.def.methods.get(method).cloned() else {
            return Err(Error::UnknownMethod {
                component: self.tag().to_string(),
                method: method.to_string(),
            });
        };
        Ok(method(self, args))
    }

    /// Register a callback for unmount. Runs immediately if the component is
    /// already destroyed.
    pub fn on_cleanup<F>(&self, cleanup: F)
    where
        F: FnOnce() + 'static,
    {
        if self.is_destroyed() {
            cleanup();
            return;
        }
        self.0.cleanups.borrow_mut().push(Box::new(cleanup));
    }

    /// Re-render whenever `store` changes, like the instance's own state.
    pub fn subscribe(&self, store: Value) {
        self.0.stores.borrow_mut().push(reactive(store));
        let effect = self.0.render_effect.borrow().clone();
        if let Some(effect) = effect {
            effect.execute();
        }
    }

    pub(crate) fn stores(&self) -> Vec<Value> {
        self.0.stores.borrow().clone()
    }

    pub(crate) fn downgrade(&self) -> Weak<ComponentInner> {
        Rc::downgrade(&self.0)
    }

    pub(crate) fn add_child(&self, child: &Component) {
        self.0
            .children
            .borrow_mut()
            .get_or_insert_with(Vec::new)
            .push(child.clone());
        *child.0.parent.borrow_mut() = self.downgrade();
    }

    pub(crate) fn remove_child(&self, child: &Component) {
        if let Some(children) = self.0.children.borrow_mut().as_mut() {
            children.retain(|existing| !existing.ptr_eq(child));
        }
    }

    /// Sort slotted children by their `slot` attribute.
    pub(crate) fn assign_slots(&self, children: Vec<VNode>) {
        let mut slots: IndexMap<Rc<str>, Vec<VNode>> = IndexMap::new();
        for child in children {
            let name = match &child {
                VNode::Element(element) => element
                    .attrs
                    .get("slot")
                    .and_then(|value| value.to_value().as_str().map(Rc::from)),
                _ => None,
            };
            let name = name.unwrap_or_else(|| Rc::from(DEFAULT_SLOT));
            slots.entry(name).or_default().push(child);
        }
        *self.0.slots.borrow_mut() = slots;
    }

    /// Run every cleanup callback, in registration order.
    pub(crate) fn run_cleanups(&self) {
        let cleanups = std::mem::take(&mut *self.0.cleanups.borrow_mut());
        for cleanup in cleanups {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(cleanup)) {
                error!(
                    component = self.tag(),
                    message = panic_message(payload.as_ref()),
                    "cleanup callback panicked"
                );
            }
        }
    }

    pub(crate) fn run_hook(&self, name: &'static str, hook: &dyn Fn(&Component)) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| hook(self))) {
            error!(
                component = self.tag(),
                hook = name,
                message = panic_message(payload.as_ref()),
                "lifecycle hook panicked"
            );
        }
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("tag", &self.tag())
            .field("host", &self.host())
            .field("mounted", &self.is_mounted())
            .field("root", &self.is_root())
            .finish()
    }
}
