//! Tree Diff
//!
//! [`diff`] reconciles a host node's previous [`DiffState`] against a new
//! vnode tree and writes the difference to the [`Document`].
//!
//! # Per-Node Rules
//!
//! - Static subtrees are reused untouched when they are the same compiled
//!   tree, and rebuilt otherwise.
//! - Text is rewritten only if the new string differs by pointer and value.
//! - Elements reuse their old DOM node. Removed attributes go first, then
//!   changed ones, then children, then the `value` and `checked` properties,
//!   which depend on settled children (think `<select>`).
//! - Custom elements (a dash in the tag) are not descended into. Their
//!   vnode children are reported to the caller instead, so the component
//!   that owns the element can render them.
//! - Fragments and thunks own no DOM; their children are reconciled in the
//!   parent's child list.
//!
//! # Excess Children
//!
//! With no previous state, any DOM already under the host is treated as
//! "excess": new nodes claim matching excess nodes instead of creating
//! their own, and whatever is left unclaimed is removed at the end.
//! [`hydrate`] does the same in hydration mode.
//!
//! # Failures
//!
//! A thunk whose render fails or suspends never aborts the pass:
//!
//! - Suspending during an excess pass keeps the DOM at the cursor and flags
//!   the thunk [`MODE_SUSPENDED`](Flags::MODE_SUSPENDED). The next pass
//!   resumes from that DOM.
//! - Failing during an excess pass purges the remaining excess and flags
//!   the thunk [`DIRTY`](Flags::DIRTY).
//! - Outside excess passes the thunk keeps its previous content. A failure
//!   also flags it dirty.
//!
//! Failures are then offered to the enclosing thunks' catch hooks, innermost
//! first. A hook that returns fallback content handles the error and its
//! thunk re-diffs against the fallback. The first unhandled failure is
//! returned in [`DiffOutcome::result`]; suspensions are listed separately.

use std::rc::Rc;

use tracing::debug;

use super::dom::{Document, NodeId};
use super::state::{first_dom_of, last_dom_of, DiffState, Flags, Mounted, MountedNode};
use super::vnode::{AttrValue, CatchFn, Element, Fragment, StaticTree, Thunk, VNode};
use crate::error::{RenderError, Suspension};

/// Custom elements seen during a pass.
#[derive(Debug, Default)]
pub struct DiffReport {
    /// Custom elements created or claimed.
    pub connected: Vec<NodeId>,
    /// Custom elements unmounted.
    pub disconnected: Vec<NodeId>,
    /// Vnode children handed to each custom element this pass.
    pub host_children: Vec<(NodeId, Vec<VNode>)>,
}

/// The result of one [`diff`] call.
#[derive(Debug)]
pub struct DiffOutcome {
    /// State to hand to the next call for the same host.
    pub state: DiffState,
    pub report: DiffReport,
    /// The first render failure no boundary handled.
    pub result: Result<(), RenderError>,
    /// Suspensions raised during the pass.
    pub suspended: Vec<Suspension>,
}

/// Reconcile `host`'s content against `vnode`.
///
/// Pass the state returned by the previous call, or `None` for the first
/// render.
pub fn diff(doc: &mut Document, host: NodeId, vnode: VNode, previous: Option<DiffState>) -> DiffOutcome {
    let excess = match previous {
        None if doc.first_child(host).is_some() => Some(excess_of(doc, host)),
        _ => None,
    };
    run(doc, host, vnode, previous, excess, false)
}

/// First render over existing DOM, in hydration mode.
pub fn hydrate(doc: &mut Document, host: NodeId, vnode: VNode) -> DiffOutcome {
    let excess = Some(excess_of(doc, host));
    run(doc, host, vnode, None, excess, true)
}

/// Tear down everything `state` rendered under its host.
pub fn unmount(doc: &mut Document, state: DiffState) -> DiffReport {
    let mut differ = Differ::new(doc);
    for child in state.children.into_iter().flatten() {
        differ.unmount(child, false);
    }
    differ.report
}

fn excess_of(doc: &Document, parent: NodeId) -> Vec<Option<NodeId>> {
    doc.children(parent).iter().copied().map(Some).collect()
}

fn run(
    doc: &mut Document,
    host: NodeId,
    vnode: VNode,
    previous: Option<DiffState>,
    excess: Option<Vec<Option<NodeId>>>,
    hydrating: bool,
) -> DiffOutcome {
    let mut differ = Differ::new(doc);
    let mut level = Level {
        parent: host,
        excess,
        hydrating,
    };

    let old = previous.map(|state| state.children).unwrap_or_default();
    let cursor = level.first_excess().or_else(|| first_dom_of(&old));
    let (children, _) = differ.diff_children(&mut level, vnode.into_children(), old, cursor);
    differ.purge(&mut level);

    differ.finish(DiffState { children })
}

/// One DOM parent's worth of diffing context.
pub(super) struct Level {
    pub(super) parent: NodeId,
    /// Unclaimed pre-existing DOM children, during excess passes.
    pub(super) excess: Option<Vec<Option<NodeId>>>,
    pub(super) hydrating: bool,
}

impl Level {
    fn claim(&mut self, doc: &Document, mut accept: impl FnMut(&Document, NodeId) -> bool) -> Option<NodeId> {
        let excess = self.excess.as_mut()?;
        let slot = excess
            .iter_mut()
            .find(|slot| slot.is_some_and(|id| accept(doc, id)))?;
        slot.take()
    }

    fn first_excess(&self) -> Option<NodeId> {
        self.excess.as_ref()?.iter().flatten().next().copied()
    }
}

struct Boundary {
    catch: CatchFn,
    caught: Option<VNode>,
}

/// State for one reconciliation pass.
pub(super) struct Differ<'d> {
    pub(super) doc: &'d mut Document,
    pub(super) report: DiffReport,
    boundaries: Vec<Boundary>,
    errors: Vec<RenderError>,
    suspended: Vec<Suspension>,
}

impl<'d> Differ<'d> {
    fn new(doc: &'d mut Document) -> Self {
        Self {
            doc,
            report: DiffReport::default(),
            boundaries: Vec::new(),
            errors: Vec::new(),
            suspended: Vec::new(),
        }
    }

    fn finish(self, state: DiffState) -> DiffOutcome {
        let mut errors = self.errors.into_iter();
        let result = match errors.next() {
            Some(first) => {
                let dropped = errors.count();
                if dropped > 0 {
                    debug!(dropped, "more than one unhandled render error in a pass");
                }
                Err(first)
            }
            None => Ok(()),
        };

        DiffOutcome {
            state,
            report: self.report,
            result,
            suspended: self.suspended,
        }
    }

    /// Remove and free unclaimed excess children.
    fn purge(&mut self, level: &mut Level) {
        if let Some(excess) = level.excess.as_mut() {
            for id in excess.iter_mut().filter_map(Option::take) {
                self.doc.release(id);
            }
        }
    }

    /// Diff one non-empty child. Returns the mounted node and, for groups,
    /// the cursor after their content.
    pub(super) fn diff_node(
        &mut self,
        level: &mut Level,
        vnode: VNode,
        old: Option<Mounted>,
        cursor: Option<NodeId>,
    ) -> (Mounted, Option<NodeId>) {
        match vnode {
            VNode::Text(text) => (self.diff_text(level, text, old), cursor),
            VNode::Static(tree) => (self.diff_static(tree, old), cursor),
            VNode::Element(element) => (self.diff_element(level, element, old), cursor),
            VNode::Fragment(fragment) => self.diff_fragment(level, fragment, old, cursor),
            VNode::Thunk(thunk) => self.diff_thunk(level, thunk, old, cursor),
            VNode::Empty => {
                if let Some(old) = old {
                    self.unmount(old, false);
                }
                let empty = MountedNode::Fragment {
                    key: None,
                    children: Vec::new(),
                };
                (Mounted::new(empty), cursor)
            }
        }
    }

    fn discard(&mut self, node: MountedNode) {
        self.unmount(Mounted::new(node), false);
    }

    // ------------------------------------------------------------------
    // Text and static
    // ------------------------------------------------------------------

    fn diff_text(&mut self, level: &mut Level, text: Rc<str>, old: Option<Mounted>) -> Mounted {
        let dom = match old.map(|old| old.node) {
            Some(MountedNode::Text { text: old_text, dom }) => {
                if !Rc::ptr_eq(&old_text, &text) && old_text != text {
                    self.doc.set_text(dom, &text);
                }
                dom
            }
            other => {
                if let Some(other) = other {
                    self.discard(other);
                }
                match level.claim(self.doc, |doc, id| doc.is_text(id)) {
                    Some(dom) => {
                        if self.doc.text(dom) != Some(&*text) {
                            self.doc.set_text(dom, &text);
                        }
                        dom
                    }
                    None => self.doc.create_text(&text),
                }
            }
        };
        Mounted::new(MountedNode::Text { text, dom })
    }

    fn diff_static(&mut self, tree: Rc<StaticTree>, old: Option<Mounted>) -> Mounted {
        let dom = match old.map(|old| old.node) {
            Some(MountedNode::Static { tree: old_tree, dom }) if Rc::ptr_eq(&old_tree, &tree) => dom,
            other => {
                if let Some(other) = other {
                    self.discard(other);
                }
                self.build_static(&tree)
            }
        };
        Mounted::new(MountedNode::Static { tree, dom })
    }

    fn build_static(&mut self, tree: &StaticTree) -> NodeId {
        match tree {
            StaticTree::Text(text) => self.doc.create_text(text),
            StaticTree::Element {
                tag,
                attrs,
                children,
            } => {
                let dom = self.doc.create_element(tag);
                for (name, value) in attrs {
                    self.doc.set_attribute(dom, name, value);
                }
                for child in children {
                    let child = self.build_static(child);
                    self.doc.append_child(dom, child);
                }
                dom
            }
        }
    }

    // ------------------------------------------------------------------
    // Elements
    // ------------------------------------------------------------------

    fn diff_element(&mut self, level: &mut Level, element: Rc<Element>, old: Option<Mounted>) -> Mounted {
        let (dom, old_element, old_children, claimed) = match old.map(|old| old.node) {
            Some(MountedNode::Element {
                element: old_element,
                dom,
                children,
            }) => (dom, Some(old_element), children, false),
            other => {
                if let Some(other) = other {
                    self.discard(other);
                }
                match level.claim(self.doc, |doc, id| doc.tag(id) == Some(&*element.tag)) {
                    Some(dom) => (dom, None, Vec::new(), true),
                    None => (self.doc.create_element(&element.tag), None, Vec::new(), false),
                }
            }
        };

        if old_element.is_none() && element.is_custom() {
            self.report.connected.push(dom);
        }

        self.diff_attrs(dom, old_element.as_deref(), &element, claimed);
        self.diff_listeners(dom, old_element.as_deref(), &element);

        let children = if element.is_custom() {
            self.report
                .host_children
                .push((dom, element.children.clone()));
            Vec::new()
        } else {
            let mut child_level = Level {
                parent: dom,
                excess: claimed.then(|| excess_of(self.doc, dom)),
                hydrating: level.hydrating,
            };
            let cursor = child_level
                .first_excess()
                .or_else(|| first_dom_of(&old_children));
            let new_children = element
                .children
                .iter()
                .cloned()
                .flat_map(VNode::into_children)
                .collect();
            let (children, _) = self.diff_children(&mut child_level, new_children, old_children, cursor);
            self.purge(&mut child_level);
            children
        };

        self.apply_form_properties(dom, &element);

        Mounted::new(MountedNode::Element {
            element,
            dom,
            children,
        })
    }

    fn diff_attrs(&mut self, dom: NodeId, old: Option<&Element>, new: &Element, claimed: bool) {
        if let Some(old) = old {
            for (name, value) in &old.attrs {
                if new.attrs.contains_key(name) {
                    continue;
                }
                if (&**name == "value" && new.attrs.contains_key("defaultValue"))
                    || (&**name == "checked" && new.attrs.contains_key("defaultChecked"))
                {
                    continue;
                }
                self.remove_attr(dom, name, value);
            }
        } else if claimed {
            for (name, _) in self.doc.attributes(dom) {
                if !new.attrs.contains_key(&name) {
                    self.doc.remove_attribute(dom, &name);
                }
            }
        }

        for (name, value) in &new.attrs {
            if is_form_property(name) {
                continue;
            }
            if old.and_then(|old| old.attrs.get(name)) == Some(value) {
                continue;
            }
            if claimed {
                if let AttrValue::Text(text) = value {
                    if self.doc.attribute(dom, name) == Some(&**text) {
                        continue;
                    }
                }
            }
            self.set_attr(dom, name, value);
        }
    }

    fn set_attr(&mut self, dom: NodeId, name: &str, value: &AttrValue) {
        match value {
            AttrValue::Text(text) => self.doc.set_attribute(dom, name, text),
            AttrValue::Bool(true) => self.doc.set_attribute(dom, name, ""),
            AttrValue::Bool(false) => self.doc.remove_attribute(dom, name),
            AttrValue::Data(data) => self.doc.set_property(dom, name, data.clone()),
        }
    }

    fn remove_attr(&mut self, dom: NodeId, name: &str, value: &AttrValue) {
        if is_form_property(name) {
            self.doc.remove_property(dom, name);
            return;
        }
        match value {
            AttrValue::Text(_) | AttrValue::Bool(_) => self.doc.remove_attribute(dom, name),
            AttrValue::Data(_) => self.doc.remove_property(dom, name),
        }
    }

    fn diff_listeners(&mut self, dom: NodeId, old: Option<&Element>, new: &Element) {
        if let Some(old) = old {
            for name in old.listeners.keys() {
                if !new.listeners.contains_key(name) {
                    self.doc.remove_listener(dom, name);
                }
            }
        }
        for (name, handler) in &new.listeners {
            let unchanged = old
                .and_then(|old| old.listeners.get(name))
                .is_some_and(|old| Rc::ptr_eq(old, handler));
            if !unchanged {
                self.doc.set_listener(dom, name, handler.clone());
            }
        }
    }

    fn apply_form_properties(&mut self, dom: NodeId, element: &Element) {
        for name in ["value", "checked"] {
            if let Some(value) = element.attrs.get(name) {
                let value = value.to_value();
                if self.doc.property(dom, name) != Some(&value) {
                    self.doc.set_property(dom, name, value);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------

    fn diff_fragment(
        &mut self,
        level: &mut Level,
        fragment: Fragment,
        old: Option<Mounted>,
        cursor: Option<NodeId>,
    ) -> (Mounted, Option<NodeId>) {
        let old_children = match old.map(|old| old.node) {
            Some(MountedNode::Fragment { children, .. }) => children,
            Some(other) => {
                self.discard(other);
                Vec::new()
            }
            None => Vec::new(),
        };

        let children = fragment
            .children
            .into_iter()
            .flat_map(VNode::into_children)
            .collect();
        let (children, after) = self.diff_children(level, children, old_children, cursor);

        let mounted = Mounted::new(MountedNode::Fragment {
            key: fragment.key,
            children,
        });
        (mounted, after)
    }

    fn diff_thunk(
        &mut self,
        level: &mut Level,
        thunk: Rc<Thunk>,
        old: Option<Mounted>,
        cursor: Option<NodeId>,
    ) -> (Mounted, Option<NodeId>) {
        let (old_flags, old_thunk, old_children, old_kept) = match old {
            Some(Mounted {
                flags,
                node:
                    MountedNode::Thunk {
                        thunk,
                        children,
                        kept,
                    },
            }) => (flags, Some(thunk), children, kept),
            Some(other) => {
                self.unmount(other, false);
                (Flags::empty(), None, Vec::new(), None)
            }
            None => (Flags::empty(), None, Vec::new(), None),
        };

        let memo_hit = match (old_thunk.as_ref().and_then(|old| old.memo.as_ref()), thunk.memo.as_ref()) {
            (Some(previous), Some(memo)) => previous == memo,
            _ => false,
        };
        if memo_hit && !old_flags.intersects(Flags::DIRTY | Flags::MODE_SUSPENDED) {
            let after = match last_dom_of(&old_children) {
                Some(dom) => self.doc.next_sibling(dom),
                None => cursor,
            };
            let mounted = Mounted::new(MountedNode::Thunk {
                thunk,
                children: old_children,
                kept: None,
            });
            return (mounted, after);
        }

        let resuming = old_flags.contains(Flags::MODE_SUSPENDED);
        let mut resume_level = resuming.then(|| Level {
            parent: level.parent,
            excess: Some(old_kept.into_iter().map(Some).collect()),
            hydrating: old_flags.contains(Flags::MODE_HYDRATE),
        });
        let cursor = if resuming { old_kept.or(cursor) } else { cursor };
        let level = match resume_level.as_mut() {
            Some(resume) => resume,
            None => level,
        };

        let outcome = match thunk.render() {
            Ok(vnode) => {
                let boundary = thunk.catch_fn();
                let is_boundary = boundary.is_some();
                if let Some(catch) = boundary {
                    self.boundaries.push(Boundary { catch, caught: None });
                }

                let (mut children, mut after) =
                    self.diff_children(level, vnode.into_children(), old_children, cursor);

                let fallback = if is_boundary {
                    self.boundaries.pop().and_then(|boundary| boundary.caught)
                } else {
                    None
                };
                if let Some(fallback) = fallback {
                    let start = first_dom_of(&children).or(after);
                    (children, after) = self.diff_children(level, fallback.into_children(), children, start);
                }

                let mounted = Mounted::new(MountedNode::Thunk {
                    thunk,
                    children,
                    kept: None,
                });
                (mounted, after)
            }
            Err(err) => {
                let outcome = self.fail_thunk(level, thunk, &err, old_flags, old_children, old_kept, cursor);
                self.catch_error(err);
                outcome
            }
        };

        if let Some(mut resume) = resume_level {
            self.purge(&mut resume);
        }
        outcome
    }

    #[allow(clippy::too_many_arguments)]
    fn fail_thunk(
        &mut self,
        level: &mut Level,
        thunk: Rc<Thunk>,
        err: &RenderError,
        old_flags: Flags,
        old_children: Vec<Option<Mounted>>,
        old_kept: Option<NodeId>,
        cursor: Option<NodeId>,
    ) -> (Mounted, Option<NodeId>) {
        if level.excess.is_none() {
            let mut flags = old_flags & Flags::PERSISTENT;
            if !err.is_suspension() {
                flags |= Flags::DIRTY;
            }
            let after = match old_kept.or_else(|| last_dom_of(&old_children)) {
                Some(dom) => self.doc.next_sibling(dom),
                None => cursor,
            };
            let mounted = Mounted::with_flags(
                MountedNode::Thunk {
                    thunk,
                    children: old_children,
                    kept: old_kept,
                },
                flags,
            );
            return (mounted, after);
        }

        for child in old_children.into_iter().flatten() {
            self.unmount(child, false);
        }

        if err.is_suspension() {
            let mut flags = Flags::MODE_SUSPENDED;
            if level.hydrating {
                flags |= Flags::MODE_HYDRATE;
            }
            let kept = cursor.and_then(|at| level.claim(self.doc, |_, id| id == at));
            let after = match kept {
                Some(dom) => self.doc.next_sibling(dom),
                None => cursor,
            };
            let mounted = Mounted::with_flags(
                MountedNode::Thunk {
                    thunk,
                    children: Vec::new(),
                    kept,
                },
                flags,
            );
            (mounted, after)
        } else {
            self.purge(level);
            let after = cursor.filter(|&at| self.doc.parent(at) == Some(level.parent));
            let mounted = Mounted::with_flags(
                MountedNode::Thunk {
                    thunk,
                    children: Vec::new(),
                    kept: None,
                },
                Flags::DIRTY,
            );
            (mounted, after)
        }
    }

    /// Route a render error: suspensions are recorded, failures go to the
    /// innermost boundary that accepts them.
    fn catch_error(&mut self, err: RenderError) {
        if let RenderError::Suspended(suspension) = &err {
            debug!(reason = suspension.reason(), "subtree suspended");
            self.suspended.push(suspension.clone());
            return;
        }

        for boundary in self.boundaries.iter_mut().rev() {
            if boundary.caught.is_some() {
                return;
            }
            if let Some(fallback) = (boundary.catch)(&err) {
                debug!(error = %err, "render error caught by boundary");
                boundary.caught = Some(fallback);
                return;
            }
        }

        self.errors.push(err);
    }
}

fn is_form_property(name: &str) -> bool {
    name == "value" || name == "checked"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Value;
    use crate::vdom::DomOp;
    use std::cell::Cell;

    fn div(children: Vec<VNode>) -> VNode {
        Element::new("div").children(children).into()
    }

    #[test]
    fn first_render_builds_dom() {
        let mut doc = Document::new();
        let host = doc.body();
        let tree = Element::new("p")
            .attr("class", "greeting")
            .attr("hidden", false)
            .child("hello");

        let outcome = diff(&mut doc, host, tree.into(), None);

        assert!(outcome.result.is_ok());
        assert_eq!(doc.inner_html(host), r#"<p class="greeting">hello</p>"#);
        assert_eq!(outcome.state.dom_nodes().len(), 1);
    }

    #[test]
    fn changed_text_is_the_only_mutation() {
        let mut doc = Document::new();
        let host = doc.body();
        let first = diff(&mut doc, host, div(vec!["a".into(), "b".into()]), None);
        let div_node = first.state.dom_nodes()[0];
        let second_text = doc.children(div_node)[1];
        doc.clear_journal();

        diff(&mut doc, host, div(vec!["a".into(), "c".into()]), Some(first.state));

        assert_eq!(
            doc.journal(),
            &[DomOp::SetText {
                node: second_text,
                text: "c".into()
            }]
        );
    }

    #[test]
    fn attributes_are_patched() {
        let mut doc = Document::new();
        let host = doc.body();
        let first = diff(
            &mut doc,
            host,
            Element::new("a").attr("href", "/a").attr("title", "x").into(),
            None,
        );
        let link = first.state.dom_nodes()[0];
        doc.clear_journal();

        diff(
            &mut doc,
            host,
            Element::new("a").attr("href", "/b").attr("disabled", true).into(),
            Some(first.state),
        );

        assert_eq!(doc.attribute(link, "href"), Some("/b"));
        assert_eq!(doc.attribute(link, "title"), None);
        assert_eq!(doc.attribute(link, "disabled"), Some(""));
        assert_eq!(doc.journal().len(), 3);
    }

    #[test]
    fn value_survives_removal_with_default_value() {
        let mut doc = Document::new();
        let host = doc.body();
        let first = diff(&mut doc, host, Element::new("input").attr("value", "typed").into(), None);
        let input = first.state.dom_nodes()[0];
        assert_eq!(doc.property(input, "value"), Some(&Value::from("typed")));

        diff(
            &mut doc,
            host,
            Element::new("input").attr("defaultValue", "typed").into(),
            Some(first.state),
        );
        assert_eq!(doc.property(input, "value"), Some(&Value::from("typed")));
    }

    #[test]
    fn value_is_applied_after_children() {
        let mut doc = Document::new();
        let host = doc.body();
        let select = Element::new("select")
            .attr("value", "b")
            .child(Element::new("option").attr("value", "a"))
            .child(Element::new("option").attr("value", "b"));

        diff(&mut doc, host, select.into(), None);

        let last_create = doc.journal().iter().rposition(DomOp::is_create).unwrap();
        let value_set = doc
            .journal()
            .iter()
            .rposition(|op| matches!(op, DomOp::SetProperty { name, .. } if name == "value"))
            .unwrap();
        assert!(value_set > last_create);
    }

    #[test]
    fn static_subtrees_are_not_touched() {
        let mut doc = Document::new();
        let host = doc.body();
        let tree = Rc::new(StaticTree::Element {
            tag: "header".into(),
            attrs: vec![("class".into(), "top".into())],
            children: vec![StaticTree::Text("title".into())],
        });

        let first = diff(&mut doc, host, VNode::Static(tree.clone()), None);
        doc.clear_journal();
        diff(&mut doc, host, VNode::Static(tree), Some(first.state));

        assert!(doc.journal().is_empty());
        assert_eq!(doc.inner_html(host), r#"<header class="top">title</header>"#);
    }

    #[test]
    fn excess_children_are_claimed_and_purged() {
        let mut doc = Document::new();
        let host = doc.body();
        let existing = doc.create_element("p");
        let stray = doc.create_element("span");
        doc.append_child(host, existing);
        doc.append_child(host, stray);

        let outcome = diff(&mut doc, host, Element::new("p").child("x").into(), None);

        assert_eq!(outcome.state.dom_nodes(), vec![existing]);
        assert_eq!(doc.children(host), &[existing]);
        assert_eq!(doc.inner_html(host), "<p>x</p>");
    }

    #[test]
    fn suspended_hydration_keeps_dom_and_resumes() {
        let mut doc = Document::new();
        let host = doc.body();
        let server = doc.create_element("article");
        let server_text = doc.create_text("from server");
        doc.append_child(server, server_text);
        doc.append_child(host, server);

        let suspended = Thunk::new("post", || Err(RenderError::suspended("fetching post")));
        let outcome = hydrate(&mut doc, host, suspended.into());

        assert!(outcome.result.is_ok());
        assert_eq!(outcome.suspended.len(), 1);
        assert!(outcome.state.is_suspended());
        assert_eq!(doc.children(host), &[server]);

        doc.clear_journal();
        let ready = Thunk::new("post", || Ok(Element::new("article").child("from server").into()));
        let outcome = diff(&mut doc, host, ready.into(), Some(outcome.state));

        assert!(!outcome.state.is_suspended());
        assert_eq!(outcome.state.dom_nodes(), vec![server]);
        assert!(!doc.journal().iter().any(DomOp::is_create));
    }

    #[test]
    fn failure_in_excess_pass_purges_and_marks_dirty() {
        let mut doc = Document::new();
        let host = doc.body();
        let leftover = doc.create_element("div");
        doc.append_child(host, leftover);

        let broken = Thunk::new("broken", || Err(RenderError::failed("boom")));
        let outcome = diff(&mut doc, host, broken.into(), None);

        assert!(outcome.result.is_err());
        assert!(outcome.state.is_dirty());
        assert!(doc.children(host).is_empty());
    }

    #[test]
    fn failure_keeps_previous_content() {
        let mut doc = Document::new();
        let host = doc.body();
        let healthy = Thunk::new("panel", || Ok(VNode::text("ok")));
        let first = diff(&mut doc, host, healthy.into(), None);

        let broken = Thunk::new("panel", || Err(RenderError::failed("boom")));
        let outcome = diff(&mut doc, host, broken.into(), Some(first.state));

        assert!(matches!(outcome.result, Err(RenderError::Failed(_))));
        assert!(outcome.state.is_dirty());
        assert_eq!(doc.inner_html(host), "ok");
    }

    #[test]
    fn siblings_keep_rendering_after_a_failure() {
        let mut doc = Document::new();
        let host = doc.body();
        let broken = Thunk::new("broken", || Err(RenderError::failed("boom")));

        let outcome = diff(
            &mut doc,
            host,
            VNode::fragment([VNode::from(broken), VNode::text("after")]),
            None,
        );

        assert!(outcome.result.is_err());
        assert_eq!(doc.inner_html(host), "after");
    }

    #[test]
    fn boundary_renders_fallback() {
        let mut doc = Document::new();
        let host = doc.body();
        let boundary = Thunk::new("boundary", || {
            let child = Thunk::new("child", || Err(RenderError::failed("boom")));
            Ok(VNode::fragment([VNode::text("before"), child.into()]))
        })
        .catch(|err| Some(VNode::text(format!("caught: {err}"))));

        let outcome = diff(&mut doc, host, boundary.into(), None);

        assert!(outcome.result.is_ok());
        assert_eq!(doc.inner_html(host), "caught: boom");
    }

    #[test]
    fn boundary_does_not_catch_its_own_failure() {
        let mut doc = Document::new();
        let host = doc.body();
        let boundary = Thunk::new("boundary", || Err(RenderError::failed("self")))
            .catch(|_| Some(VNode::text("fallback")));

        let outcome = diff(&mut doc, host, boundary.into(), None);
        assert!(outcome.result.is_err());
    }

    #[test]
    fn memoized_thunk_skips_render() {
        let mut doc = Document::new();
        let host = doc.body();
        let renders = Rc::new(Cell::new(0));

        let make = |memo: i32| {
            let renders = renders.clone();
            Thunk::new("memo", move || {
                renders.set(renders.get() + 1);
                Ok(VNode::text("x"))
            })
            .memo(memo)
        };

        let first = diff(&mut doc, host, make(1).into(), None);
        let second = diff(&mut doc, host, make(1).into(), Some(first.state));
        assert_eq!(renders.get(), 1);

        diff(&mut doc, host, make(2).into(), Some(second.state));
        assert_eq!(renders.get(), 2);
    }

    #[test]
    fn custom_elements_are_reported() {
        let mut doc = Document::new();
        let host = doc.body();
        let card = Element::new("x-card").attr("title", "hi").child("slotted");

        let first = diff(&mut doc, host, card.into(), None);
        let card_node = first.state.dom_nodes()[0];
        assert_eq!(first.report.connected, vec![card_node]);
        assert_eq!(first.report.host_children.len(), 1);
        assert!(doc.children(card_node).is_empty());

        let report = unmount(&mut doc, first.state);
        assert_eq!(report.disconnected, vec![card_node]);
        assert!(doc.children(host).is_empty());
    }
}
