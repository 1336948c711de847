//! Render Coordination
//!
//! [`App`] owns the document and every mounted component, and decides when
//! and in what order components render.
//!
//! # Coordinated Renders
//!
//! Each component has a render effect that deep-tracks its state, props and
//! subscribed stores. When it fires, it does not render just that component:
//! it renders the whole tree under the nearest render root, parent before
//! children, because a child's props usually come from its parent's fresh
//! output. Only one such pass runs at a time. A request made while a pass is
//! running is dropped, since the running pass reads state live and will
//! pick the change up.
//!
//! # Failure Containment
//!
//! A component whose render fails keeps its previous DOM. The error goes to
//! the nearest ancestor with an `on_error` hook; a hook that returns a
//! fallback replaces that ancestor's content. Unhandled errors are logged
//! and reported from [`App::schedule_coordinated_render`] once the pass has
//! finished rendering every other component.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use tracing::{debug, error, trace, warn};

use super::descriptor::{is_valid_tag_name, ComponentDef, View};
use super::host::Component;
use crate::error::{Error, RenderError, Result};
use crate::reactive::{
    create_effect, panic_message, queue_microtask, track_all_dependencies, untrack, Effect, Value,
};
use crate::vdom::{self, DiffReport, Document, NodeId, VNode};

/// Returned by [`App::mount_effect`]. Disposing stops the component from
/// re-rendering on state changes.
#[derive(Debug, Clone)]
pub struct Disposer {
    effect: Effect,
}

impl Disposer {
    pub fn dispose(&self) {
        self.effect.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.effect.is_disposed()
    }
}

/// Marks a coordinated pass in progress; clears the mark on drop.
struct RenderPass<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> RenderPass<'a> {
    fn begin(flag: &'a Cell<bool>) -> Option<Self> {
        if flag.replace(true) {
            return None;
        }
        Some(Self { flag })
    }
}

impl Drop for RenderPass<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

pub(crate) struct AppInner {
    doc: RefCell<Document>,
    registry: RefCell<IndexMap<Rc<str>, Rc<ComponentDef>>>,
    hosts: RefCell<HashMap<NodeId, Component>>,
    rendering: Cell<bool>,
}

/// A document plus the components mounted in it.
#[derive(Clone)]
pub struct App(pub(crate) Rc<AppInner>);

impl App {
    pub fn new() -> Self {
        Self::with_document(Document::new())
    }

    pub fn with_document(doc: Document) -> Self {
        Self(Rc::new(AppInner {
            doc: RefCell::new(doc),
            registry: RefCell::new(IndexMap::new()),
            hosts: RefCell::new(HashMap::new()),
            rendering: Cell::new(false),
        }))
    }

    fn from_weak(app: &Weak<AppInner>) -> Option<Self> {
        app.upgrade().map(Self)
    }

    /// Borrow the document.
    ///
    /// # Panics
    ///
    /// If called from inside a render while the document is being diffed.
    pub fn document(&self) -> Ref<'_, Document> {
        self.0.doc.borrow()
    }

    /// Borrow the document mutably. Same caveat as [`App::document`].
    pub fn document_mut(&self) -> RefMut<'_, Document> {
        self.0.doc.borrow_mut()
    }

    pub fn body(&self) -> NodeId {
        self.document().body()
    }

    /// Whether a coordinated pass is running.
    pub fn is_rendering(&self) -> bool {
        self.0.rendering.get()
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    /// Register a component definition under its tag.
    pub fn define(&self, def: ComponentDef) -> Result<()> {
        if !is_valid_tag_name(def.tag()) {
            return Err(Error::InvalidTagName(def.tag().to_string()));
        }

        let mut registry = self.0.registry.borrow_mut();
        if registry.contains_key(def.tag()) {
            return Err(Error::AlreadyDefined(def.tag().to_string()));
        }
        debug!(tag = def.tag(), "component defined");
        registry.insert(def.tag.clone(), Rc::new(def));
        Ok(())
    }

    pub fn is_defined(&self, tag: &str) -> bool {
        self.0.registry.borrow().contains_key(tag)
    }

    fn definition(&self, tag: &str) -> Option<Rc<ComponentDef>> {
        self.0.registry.borrow().get(tag).cloned()
    }

    // ------------------------------------------------------------------
    // Hosts
    // ------------------------------------------------------------------

    /// Create a detached host element for a registered component.
    pub fn create(&self, tag: &str) -> Result<NodeId> {
        if !self.is_defined(tag) {
            return Err(Error::UnknownComponent(tag.to_string()));
        }
        Ok(self.document_mut().create_element(tag))
    }

    /// Create a host under `parent` and connect it.
    pub fn mount(&self, tag: &str, parent: NodeId) -> Result<Component> {
        let host = self.create(tag)?;
        self.document_mut().append_child(parent, host);
        self.connect(host)
    }

    /// The component mounted on `host`, if any.
    pub fn component(&self, host: NodeId) -> Option<Component> {
        self.0.hosts.borrow().get(&host).cloned()
    }

    pub fn components(&self) -> usize {
        self.0.hosts.borrow().len()
    }

    /// Attach a component to its host: the counterpart of a custom
    /// element's connected callback. Connecting a mounted host returns its
    /// component.
    pub fn connect(&self, host: NodeId) -> Result<Component> {
        if let Some(existing) = self.component(host) {
            return Ok(existing);
        }

        let tag = {
            let doc = self.document();
            if !doc.contains_node(host) {
                return Err(Error::MissingNode(host));
            }
            doc.tag(host).map(str::to_string)
        };
        let tag = tag.ok_or(Error::NotMounted(host))?;
        let def = self
            .definition(&tag)
            .ok_or_else(|| Error::UnknownComponent(tag.clone()))?;

        let component = Component::new(def, host, Rc::downgrade(&self.0));
        self.0.hosts.borrow_mut().insert(host, component.clone());
        self.sync_props(&component);
        self.mount_effect(&component);
        Ok(component)
    }

    /// Detach the component on `host`: the counterpart of a disconnected
    /// callback.
    pub fn disconnect(&self, host: NodeId) -> Result<()> {
        self.unmount(host)
    }

    /// Set an attribute on a host from outside the render path and re-render
    /// if it feeds a prop.
    pub fn set_attribute(&self, host: NodeId, name: &str, value: &str) {
        self.document_mut().set_attribute(host, name, value);
        self.prop_changed(host, name);
    }

    /// Set a property on a host from outside the render path and re-render
    /// if it feeds a prop.
    pub fn set_property(&self, host: NodeId, name: &str, value: impl Into<Value>) {
        self.document_mut().set_property(host, name, value.into());
        self.prop_changed(host, name);
    }

    fn prop_changed(&self, host: NodeId, name: &str) {
        let Some(component) = self.component(host) else {
            return;
        };
        if !component.0.def.props.contains_key(name) {
            return;
        }
        self.sync_props(&component);
        if let Err(err) = self.schedule_coordinated_render(&component) {
            debug!(error = %err, "render after prop change failed");
        }
    }

    /// Copy declared props from the host's properties and attributes.
    /// Properties win over attributes; absent props take their defaults.
    fn sync_props(&self, component: &Component) {
        let values: Vec<(Rc<str>, Value)> = {
            let doc = self.document();
            let host = component.host();
            component
                .0
                .def
                .props
                .iter()
                .map(|(name, default)| {
                    let value = doc
                        .property(host, name)
                        .cloned()
                        .or_else(|| doc.attribute(host, name).map(Value::str))
                        .unwrap_or_else(|| default.clone());
                    (name.clone(), value)
                })
                .collect()
        };

        let props = &component.0.props;
        for (name, value) in values {
            let current = untrack(|| props.get(&*name));
            if !current.strictly_equals(&value) {
                trace!(component = component.tag(), prop = &*name, "prop changed");
                props.set(&*name, value);
            }
        }
    }

    /// Dispatch an event at `target`, bubbling. Handlers run with the
    /// document released. Returns how many ran.
    pub fn dispatch(&self, target: NodeId, event: &str, detail: impl Into<Value>) -> usize {
        let handlers = self.document().listeners_for(target, event);
        let event = vdom::Event {
            kind: Rc::from(event),
            target,
            detail: detail.into(),
        };
        for handler in &handlers {
            handler(&event);
        }
        handlers.len()
    }

    // ------------------------------------------------------------------
    // Host contract
    // ------------------------------------------------------------------

    /// Link a component into the tree and start its render effect.
    ///
    /// The parent is the nearest ancestor host in the document that carries
    /// a component; without one the component is a render root. The
    /// component's `on_mounted` hook runs in a microtask after the first
    /// render, unless it was unmounted first.
    pub fn mount_effect(&self, component: &Component) -> Disposer {
        if let Some(effect) = component.0.render_effect.borrow().clone() {
            return Disposer { effect };
        }

        let parent = {
            let doc = self.document();
            let hosts = self.0.hosts.borrow();
            doc.find_ancestor(component.host(), |node| hosts.contains_key(&node))
                .and_then(|node| hosts.get(&node).cloned())
        };
        match parent {
            Some(parent) => parent.add_child(component),
            None => component.0.root.set(true),
        }
        component.0.mounted.set(true);
        debug!(
            component = component.tag(),
            host = %component.host(),
            root = component.is_root(),
            "component mounted"
        );

        let weak = component.downgrade();
        let app = Rc::downgrade(&self.0);
        let effect = create_effect(move || {
            let Some(component) = weak.upgrade().map(Component) else {
                return;
            };
            track_all_dependencies(&component.state());
            track_all_dependencies(&component.props());
            for store in component.stores() {
                track_all_dependencies(&store);
            }

            if !component.is_mounted() {
                return;
            }
            if let Some(app) = App::from_weak(&app) {
                if let Err(err) = app.schedule_coordinated_render(&component) {
                    debug!(error = %err, "coordinated render reported an error");
                }
            }
        });

        *component.0.render_effect.borrow_mut() = Some(effect.clone());
        let disposer = effect.clone();
        component.on_cleanup(move || disposer.dispose());

        if let Some(hook) = component.0.def.on_mounted.clone() {
            let weak = component.downgrade();
            queue_microtask(move || {
                let Some(component) = weak.upgrade().map(Component) else {
                    return;
                };
                if component.is_destroyed() || !component.is_mounted() {
                    trace!(component = component.tag(), "skipping mounted hook");
                    return;
                }
                component.run_hook("on_mounted", &*hook);
            });
        }

        Disposer { effect }
    }

    /// Render the tree under `component`'s render root, parent before
    /// children. Does nothing if a pass is already running.
    ///
    /// Returns the first render error no boundary handled.
    pub fn schedule_coordinated_render(&self, component: &Component) -> Result<()> {
        let Some(_pass) = RenderPass::begin(&self.0.rendering) else {
            debug!(component = component.tag(), "dropping re-entrant coordinated render");
            return Ok(());
        };

        let root = component.render_root();
        trace!(root = root.tag(), "coordinated render");

        let mut errors = Vec::new();
        untrack(|| self.render_tree(&root, &mut errors));
        match errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn render_tree(&self, component: &Component, errors: &mut Vec<Error>) {
        if !component.is_mounted() {
            return;
        }
        self.render_component(component, errors);
        for child in component.children() {
            self.render_tree(&child, errors);
        }
    }

    fn render_component(&self, component: &Component, errors: &mut Vec<Error>) {
        let render = component.0.def.render.clone();
        let vnode = panic::catch_unwind(AssertUnwindSafe(|| render(component)))
            .unwrap_or_else(|payload| Err(RenderError::failed(panic_message(payload.as_ref()))))
            .and_then(|view| view.resolve());

        let vnode = match vnode {
            Ok(vnode) => vnode,
            Err(err) if err.is_suspension() => {
                debug!(component = component.tag(), reason = %err, "render suspended, keeping content");
                return;
            }
            Err(err) => {
                // A boundary handles its children's failures, not its own.
                self.fail(component.parent(), component, err, errors);
                return;
            }
        };

        if let Err(err) = self.commit(component, vnode) {
            self.fail(Some(component.clone()), component, err, errors);
        }
    }

    /// Diff `vnode` into the component's host and settle the custom
    /// elements the diff reported.
    fn commit(&self, component: &Component, vnode: VNode) -> std::result::Result<(), RenderError> {
        let previous = component.0.diff_state.borrow_mut().take();
        let outcome = {
            let mut doc = self.document_mut();
            vdom::diff(&mut doc, component.host(), vnode, previous)
        };
        *component.0.diff_state.borrow_mut() = Some(outcome.state);

        for suspension in &outcome.suspended {
            debug!(component = component.tag(), reason = suspension.reason(), "subtree suspended");
        }
        self.settle(outcome.report);
        outcome.result
    }

    fn settle(&self, report: DiffReport) {
        for host in report.disconnected {
            if let Err(err) = self.unmount(host) {
                trace!(host = %host, error = %err, "disconnected element had no component");
            }
        }

        for host in report.connected {
            let tag = self.document().tag(host).map(str::to_string);
            match tag {
                Some(tag) if self.is_defined(&tag) => {
                    if let Err(err) = self.connect(host) {
                        warn!(host = %host, error = %err, "failed to connect component");
                    }
                }
                _ => trace!(host = %host, "custom element without a definition"),
            }
        }

        for (host, children) in report.host_children {
            if let Some(component) = self.component(host) {
                component.assign_slots(children);
                self.sync_props(&component);
            }
        }
    }

    /// Offer a render error to the boundaries from `start` upward.
    fn fail(&self, start: Option<Component>, failed: &Component, err: RenderError, errors: &mut Vec<Error>) {
        let mut current = start;
        while let Some(boundary) = current {
            if let Some(hook) = boundary.0.def.on_error.clone() {
                let fallback = panic::catch_unwind(AssertUnwindSafe(|| hook(&boundary, &err)))
                    .unwrap_or_else(|payload| {
                        error!(
                            component = boundary.tag(),
                            message = panic_message(payload.as_ref()),
                            "error hook panicked"
                        );
                        None
                    });
                if let Some(fallback) = fallback {
                    debug!(
                        boundary = boundary.tag(),
                        component = failed.tag(),
                        error = %err,
                        "render error handled by boundary"
                    );
                    self.render_fallback(&boundary, fallback, errors);
                    return;
                }
            }
            current = boundary.parent();
        }

        error!(component = failed.tag(), error = %err, "unhandled render error");
        errors.push(Error::Render {
            component: failed.tag().to_string(),
            source: err,
        });
    }

    fn render_fallback(&self, boundary: &Component, fallback: View, errors: &mut Vec<Error>) {
        let committed = fallback.resolve().and_then(|vnode| self.commit(boundary, vnode));
        if let Err(err) = committed {
            // The fallback failed too: treat it as the boundary's own failure.
            self.fail(boundary.parent(), boundary, err, errors);
        }
    }

    /// Tear down the component on `host`.
    ///
    /// The component is flagged destroyed before anything else runs, then
    /// leaves its parent, runs its cleanups (which dispose the render
    /// effect), runs `on_unmounted`, and finally unmounts its rendered
    /// content, which tears down nested components the same way.
    pub fn unmount(&self, host: NodeId) -> Result<()> {
        let component = self
            .0
            .hosts
            .borrow_mut()
            .remove(&host)
            .ok_or(Error::NotMounted(host))?;

        component.0.destroyed.set(true);
        component.0.mounted.set(false);

        if let Some(parent) = component.parent() {
            parent.remove_child(&component);
        }

        component.run_cleanups();
        component.0.render_effect.borrow_mut().take();

        if let Some(hook) = component.0.def.on_unmounted.clone() {
            component.run_hook("on_unmounted", &*hook);
        }

        let state = component.0.diff_state.borrow_mut().take();
        if let Some(state) = state {
            let report = {
                let mut doc = self.document_mut();
                vdom::unmount(&mut doc, state)
            };
            for nested in report.disconnected {
                if self.component(nested).is_some() {
                    if let Err(err) = self.unmount(nested) {
                        trace!(host = %nested, error = %err, "nested component already gone");
                    }
                }
            }
        }

        debug!(component = component.tag(), host = %host, "component unmounted");
        Ok(())
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("definitions", &self.0.registry.borrow().len())
            .field("components", &self.0.hosts.borrow().len())
            .field("rendering", &self.0.rendering.get())
            .finish()
    }
}
