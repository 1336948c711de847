//! In-Memory Host Document
//!
//! [`Document`] is the DOM the reconciler writes to. Nodes live in an arena
//! and are addressed by [`NodeId`]. A removed node stays in the arena,
//! detached, until it is [released](Document::release). Released slots are
//! recycled under a new generation, so a stale id never aliases a live node.
//!
//! Every mutation is appended to a journal of [`DomOp`]s. A host bridge
//! drains the journal to replay the changes on a real document, and tests
//! read it to check how much work a diff did.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{trace, warn};

use super::vnode::Handler;
use crate::reactive::Value;

/// Handle to a node in a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// Arena slot. Slots are reused after release; see [`NodeId::generation`].
    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }

    fn slot(self) -> usize {
        self.index as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.generation == 0 {
            write!(f, "#{}", self.index)
        } else {
            write!(f, "#{}v{}", self.index, self.generation)
        }
    }
}

/// One recorded DOM mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum DomOp {
    CreateElement { node: NodeId, tag: String },
    CreateText { node: NodeId, text: String },
    SetText { node: NodeId, text: String },
    SetAttribute { node: NodeId, name: String, value: String },
    RemoveAttribute { node: NodeId, name: String },
    SetProperty { node: NodeId, name: String },
    RemoveProperty { node: NodeId, name: String },
    AddListener { node: NodeId, event: String },
    RemoveListener { node: NodeId, event: String },
    /// `node` was inserted into `parent` before `before` (or appended).
    Insert {
        parent: NodeId,
        node: NodeId,
        before: Option<NodeId>,
    },
    Remove { node: NodeId },
}

impl DomOp {
    /// The node the operation applies to.
    pub fn node(&self) -> NodeId {
        match self {
            Self::CreateElement { node, .. }
            | Self::CreateText { node, .. }
            | Self::SetText { node, .. }
            | Self::SetAttribute { node, .. }
            | Self::RemoveAttribute { node, .. }
            | Self::SetProperty { node, .. }
            | Self::RemoveProperty { node, .. }
            | Self::AddListener { node, .. }
            | Self::RemoveListener { node, .. }
            | Self::Insert { node, .. }
            | Self::Remove { node } => *node,
        }
    }

    /// Whether the operation creates a node.
    pub fn is_create(&self) -> bool {
        matches!(self, Self::CreateElement { .. } | Self::CreateText { .. })
    }
}

/// A dispatched event.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: Rc<str>,
    pub target: NodeId,
    pub detail: Value,
}

enum NodeKind {
    Element { tag: Rc<str> },
    Text { text: String },
}

struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attributes: IndexMap<Rc<str>, String>,
    properties: IndexMap<Rc<str>, Value>,
    listeners: IndexMap<Rc<str>, Handler>,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            attributes: IndexMap::new(),
            properties: IndexMap::new(),
            listeners: IndexMap::new(),
        }
    }
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// An arena-backed DOM tree with a mutation journal.
pub struct Document {
    slots: Vec<Slot>,
    free: Vec<u32>,
    body: NodeId,
    journal: Vec<DomOp>,
}

impl Document {
    /// Create a document with an empty `<body>`.
    pub fn new() -> Self {
        let mut doc = Self {
            slots: Vec::new(),
            free: Vec::new(),
            body: NodeId {
                index: 0,
                generation: 0,
            },
            journal: Vec::new(),
        };
        doc.body = doc.alloc(NodeKind::Element {
            tag: Rc::from("body"),
        });
        doc
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let node = Some(Node::new(kind));
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = node;
            return NodeId {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node,
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.slot())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn live_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.slot())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let node = self.live_mut(id);
        if node.is_none() {
            warn!(node = %id, "mutation on unknown node ignored");
        }
        node
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Number of live nodes, the body included.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    pub fn create_element(&mut self, tag: impl AsRef<str>) -> NodeId {
        let tag: Rc<str> = Rc::from(tag.as_ref());
        let id = self.alloc(NodeKind::Element { tag: tag.clone() });
        self.journal.push(DomOp::CreateElement {
            node: id,
            tag: tag.to_string(),
        });
        id
    }

    pub fn create_text(&mut self, text: impl AsRef<str>) -> NodeId {
        let text = text.as_ref().to_string();
        let id = self.alloc(NodeKind::Text { text: text.clone() });
        self.journal.push(DomOp::CreateText { node: id, text });
        id
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Tag name of an element, `None` for text nodes.
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.node(id)?.kind {
            NodeKind::Element { tag } => Some(tag),
            NodeKind::Text { .. } => None,
        }
    }

    /// Content of a text node, `None` for elements.
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.node(id)?.kind {
            NodeKind::Text { text } => Some(text),
            NodeKind::Element { .. } => None,
        }
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        self.text(id).is_some()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|node| node.children.as_slice()).unwrap_or(&[])
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).first().copied()
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let position = siblings.iter().position(|&child| child == id)?;
        siblings.get(position + 1).copied()
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.node(id)?.attributes.get(name).map(String::as_str)
    }

    pub fn attributes(&self, id: NodeId) -> Vec<(Rc<str>, String)> {
        self.node(id)
            .map(|node| {
                node.attributes
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn property(&self, id: NodeId, name: &str) -> Option<&Value> {
        self.node(id)?.properties.get(name)
    }

    pub fn properties(&self, id: NodeId) -> Vec<(Rc<str>, Value)> {
        self.node(id)
            .map(|node| {
                node.properties
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_listener(&self, id: NodeId, event: &str) -> bool {
        self.node(id)
            .is_some_and(|node| node.listeners.contains_key(event))
    }

    /// Walk up from `id` (exclusive) and return the first ancestor matching
    /// `predicate`.
    pub fn find_ancestor(&self, id: NodeId, mut predicate: impl FnMut(NodeId) -> bool) -> Option<NodeId> {
        let mut current = self.parent(id);
        while let Some(node) = current {
            if predicate(node) {
                return Some(node);
            }
            current = self.parent(node);
        }
        None
    }

    /// Whether `node` is `ancestor` or one of its descendants.
    pub fn is_inclusive_descendant(&self, node: NodeId, ancestor: NodeId) -> bool {
        node == ancestor || self.find_ancestor(node, |n| n == ancestor).is_some()
    }

    /// Whether the node is attached under the body.
    pub fn is_connected(&self, id: NodeId) -> bool {
        self.is_inclusive_descendant(id, self.body)
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    pub fn set_text(&mut self, id: NodeId, text: impl AsRef<str>) {
        let text = text.as_ref();
        let Some(node) = self.node_mut(id) else {
            return;
        };
        if let NodeKind::Text { text: current } = &mut node.kind {
            current.clear();
            current.push_str(text);
            self.journal.push(DomOp::SetText {
                node: id,
                text: text.to_string(),
            });
        }
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: impl AsRef<str>) {
        let value = value.as_ref().to_string();
        let Some(node) = self.node_mut(id) else {
            return;
        };
        node.attributes.insert(Rc::from(name), value.clone());
        self.journal.push(DomOp::SetAttribute {
            node: id,
            name: name.to_string(),
            value,
        });
    }

    /// Remove an attribute. Removing an absent attribute records nothing.
    pub fn remove_attribute(&mut self, id: NodeId, name: &str) {
        let Some(node) = self.node_mut(id) else {
            return;
        };
        if node.attributes.shift_remove(name).is_some() {
            self.journal.push(DomOp::RemoveAttribute {
                node: id,
                name: name.to_string(),
            });
        }
    }

    pub fn set_property(&mut self, id: NodeId, name: &str, value: Value) {
        let Some(node) = self.node_mut(id) else {
            return;
        };
        node.properties.insert(Rc::from(name), value);
        self.journal.push(DomOp::SetProperty {
            node: id,
            name: name.to_string(),
        });
    }

    pub fn remove_property(&mut self, id: NodeId, name: &str) {
        let Some(node) = self.node_mut(id) else {
            return;
        };
        if node.properties.shift_remove(name).is_some() {
            self.journal.push(DomOp::RemoveProperty {
                node: id,
                name: name.to_string(),
            });
        }
    }

    /// Install or replace a listener. Only a new event name is journaled;
    /// swapping the handler of an existing one is not a DOM mutation.
    pub fn set_listener(&mut self, id: NodeId, event: &str, handler: Handler) {
        let Some(node) = self.node_mut(id) else {
            return;
        };
        if node.listeners.insert(Rc::from(event), handler).is_none() {
            self.journal.push(DomOp::AddListener {
                node: id,
                event: event.to_string(),
            });
        }
    }

    pub fn remove_listener(&mut self, id: NodeId, event: &str) {
        let Some(node) = self.node_mut(id) else {
            return;
        };
        if node.listeners.shift_remove(event).is_some() {
            self.journal.push(DomOp::RemoveListener {
                node: id,
                event: event.to_string(),
            });
        }
    }

    /// Insert `child` into `parent` before `before`, or append when `before`
    /// is `None` or not a child of `parent`. Moves the child if it is
    /// attached elsewhere.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, before: Option<NodeId>) {
        if parent == child || self.is_inclusive_descendant(parent, child) {
            warn!(parent = %parent, child = %child, "refusing to insert a node into itself");
            return;
        }
        if self.node(parent).is_none() || self.node(child).is_none() {
            warn!(parent = %parent, child = %child, "insert with unknown node ignored");
            return;
        }

        self.detach(child);

        let Some(siblings) = self.live_mut(parent).map(|node| &mut node.children) else {
            return;
        };
        let position = before
            .and_then(|before| siblings.iter().position(|&id| id == before))
            .unwrap_or(siblings.len());
        siblings.insert(position, child);
        let before = siblings.get(position + 1).copied();
        if let Some(node) = self.live_mut(child) {
            node.parent = Some(parent);
        }

        self.journal.push(DomOp::Insert {
            parent,
            node: child,
            before,
        });
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.insert_before(parent, child, None);
    }

    /// Detach a node from its parent.
    pub fn remove(&mut self, id: NodeId) {
        if self.detach(id) {
            self.journal.push(DomOp::Remove { node: id });
        }
    }

    fn detach(&mut self, id: NodeId) -> bool {
        let Some(parent) = self.parent(id) else {
            return false;
        };
        if let Some(node) = self.live_mut(parent) {
            node.children.retain(|&child| child != id);
        }
        if let Some(node) = self.live_mut(id) {
            node.parent = None;
        }
        true
    }

    /// Free a node and its whole subtree, detaching it first if needed.
    ///
    /// Listeners, properties and attributes are dropped with the nodes and
    /// the slots are recycled. Releasing a stale id or the body does
    /// nothing. Returns the number of nodes freed.
    pub fn release(&mut self, id: NodeId) -> usize {
        if id == self.body || self.node(id).is_none() {
            return 0;
        }
        self.remove(id);

        let mut freed = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(slot) = self
                .slots
                .get_mut(current.slot())
                .filter(|slot| slot.generation == current.generation)
            else {
                continue;
            };
            let Some(node) = slot.node.take() else {
                continue;
            };
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(current.index);
            stack.extend(node.children.iter().copied());
            freed.push(node);
        }

        let count = freed.len();
        trace!(node = %id, count, "released subtree");
        drop(freed);
        count
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Handlers that a dispatch of `event` at `target` would call, in
    /// bubbling order.
    pub fn listeners_for(&self, target: NodeId, event: &str) -> Vec<Handler> {
        let mut handlers = Vec::new();
        let mut current = Some(target);
        while let Some(id) = current {
            if let Some(handler) = self.node(id).and_then(|node| node.listeners.get(event)) {
                handlers.push(handler.clone());
            }
            current = self.parent(id);
        }
        handlers
    }

    /// Dispatch an event at `target`, bubbling to the root. Returns the
    /// number of handlers that ran.
    pub fn dispatch(&self, target: NodeId, event: &str, detail: Value) -> usize {
        let handlers = self.listeners_for(target, event);
        let event = Event {
            kind: Rc::from(event),
            target,
            detail,
        };
        for handler in &handlers {
            handler(&event);
        }
        handlers.len()
    }

    // ------------------------------------------------------------------
    // Journal
    // ------------------------------------------------------------------

    pub fn journal(&self) -> &[DomOp] {
        &self.journal
    }

    pub fn take_journal(&mut self) -> Vec<DomOp> {
        std::mem::take(&mut self.journal)
    }

    pub fn clear_journal(&mut self) {
        self.journal.clear();
    }

    // ------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------

    /// Serialize a node and its subtree.
    pub fn to_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_html(id, &mut out);
        out
    }

    /// Serialize the children of a node.
    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        for &child in self.children(id) {
            self.write_html(child, &mut out);
        }
        out
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.node(id) else {
            return;
        };
        match &node.kind {
            NodeKind::Text { text } => escape_into(text, false, out),
            NodeKind::Element { tag } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in &node.attributes {
                    out.push(' ');
                    out.push_str(name);
                    if !value.is_empty() {
                        out.push_str("=\"");
                        escape_into(value, true, out);
                        out.push('"');
                    }
                }
                out.push('>');
                for &child in &node.children {
                    self.write_html(child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("nodes", &self.len())
            .field("journal", &self.journal.len())
            .finish()
    }
}

fn escape_into(text: &str, attribute: bool, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn insert_and_serialize() {
        let mut doc = Document::new();
        let list = doc.create_element("ul");
        let item = doc.create_element("li");
        let text = doc.create_text("a < b");
        doc.set_attribute(list, "class", "todo");
        doc.append_child(item, text);
        doc.append_child(list, item);
        doc.append_child(doc.body(), list);

        assert_eq!(doc.inner_html(doc.body()), r#"<ul class="todo"><li>a &lt; b</li></ul>"#);
        assert!(doc.is_connected(text));
    }

    #[test]
    fn insert_before_moves_nodes() {
        let mut doc = Document::new();
        let parent = doc.body();
        let a = doc.create_text("a");
        let b = doc.create_text("b");
        doc.append_child(parent, a);
        doc.append_child(parent, b);
        doc.clear_journal();

        doc.insert_before(parent, b, Some(a));

        assert_eq!(doc.children(parent), &[b, a]);
        assert_eq!(
            doc.journal(),
            &[DomOp::Insert {
                parent,
                node: b,
                before: Some(a)
            }]
        );
        assert_eq!(doc.next_sibling(b), Some(a));
    }

    #[test]
    fn removing_absent_attribute_is_not_recorded() {
        let mut doc = Document::new();
        let div = doc.create_element("div");
        doc.clear_journal();

        doc.remove_attribute(div, "hidden");
        assert!(doc.journal().is_empty());
    }

    #[test]
    fn events_bubble() {
        let mut doc = Document::new();
        let button = doc.create_element("button");
        doc.append_child(doc.body(), button);

        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        doc.set_listener(button, "click", Rc::new(move |_: &Event| counter.set(counter.get() + 1)));
        let counter = hits.clone();
        doc.set_listener(doc.body(), "click", Rc::new(move |_: &Event| counter.set(counter.get() + 10)));

        assert_eq!(doc.dispatch(button, "click", Value::Null), 2);
        assert_eq!(hits.get(), 11);
    }

    #[test]
    fn refuses_cycles() {
        let mut doc = Document::new();
        let outer = doc.create_element("div");
        let inner = doc.create_element("div");
        doc.append_child(outer, inner);
        doc.append_child(inner, outer);
        assert_eq!(doc.parent(outer), None);
    }

    #[test]
    fn release_frees_the_subtree_and_recycles_slots() {
        let mut doc = Document::new();
        let list = doc.create_element("ul");
        let item = doc.create_element("li");
        doc.append_child(list, item);
        doc.append_child(doc.body(), list);

        let payload = Rc::new(());
        let captured = payload.clone();
        doc.set_listener(item, "click", Rc::new(move |_: &Event| {
            let _ = &captured;
        }));
        doc.set_property(item, "data", Value::from("x"));
        assert_eq!(Rc::strong_count(&payload), 2);

        assert_eq!(doc.release(list), 2);
        assert_eq!(Rc::strong_count(&payload), 1);
        assert_eq!(doc.len(), 1);
        assert!(doc.children(doc.body()).is_empty());
        assert!(!doc.contains_node(item));

        // A recycled slot gets a new id; the stale one stays dead.
        let fresh = doc.create_element("p");
        assert_eq!(fresh.index(), item.index());
        assert_ne!(fresh, item);
        assert!(!doc.contains_node(item));
        assert_eq!(doc.tag(fresh), Some("p"));
        assert_eq!(doc.release(item), 0);
        assert_eq!(doc.release(doc.body()), 0);
    }
}
