//! Diff State
//!
//! What the reconciler remembers between passes: one [`Mounted`] per child
//! that rendered something, mirroring the shape of the last vnode tree, with
//! the DOM node each piece owns.

use std::rc::Rc;

use bitflags::bitflags;

use super::dom::NodeId;
use super::vnode::{Element, NodeType, StaticTree, Thunk};

bitflags! {
    /// Per-node reconciler flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Flags: u8 {
        /// The node must be explicitly placed before the cursor.
        const INSERT_VNODE = 1 << 0;
        /// The old node was claimed by a new sibling this pass.
        const MATCHED = 1 << 1;
        /// The node suspended while hydrating.
        const MODE_HYDRATE = 1 << 2;
        /// The node suspended and kept its server DOM in place.
        const MODE_SUSPENDED = 1 << 3;
        /// The node failed to render and must re-render next pass.
        const DIRTY = 1 << 4;
    }
}

impl Flags {
    /// Flags that survive from one pass to the next.
    pub const PERSISTENT: Flags = Flags::MODE_HYDRATE
        .union(Flags::MODE_SUSPENDED)
        .union(Flags::DIRTY);
}

/// A rendered node.
pub(crate) struct Mounted {
    pub(crate) flags: Flags,
    pub(crate) node: MountedNode,
}

pub(crate) enum MountedNode {
    Static {
        tree: Rc<StaticTree>,
        dom: NodeId,
    },
    Text {
        text: Rc<str>,
        dom: NodeId,
    },
    Element {
        element: Rc<Element>,
        dom: NodeId,
        children: Vec<Option<Mounted>>,
    },
    Fragment {
        key: Option<Rc<str>>,
        children: Vec<Option<Mounted>>,
    },
    Thunk {
        thunk: Rc<Thunk>,
        children: Vec<Option<Mounted>>,
        /// DOM left in place by a suspended hydration.
        kept: Option<NodeId>,
    },
}

impl Mounted {
    pub(crate) fn new(node: MountedNode) -> Self {
        Self {
            flags: Flags::empty(),
            node,
        }
    }

    pub(crate) fn with_flags(node: MountedNode, flags: Flags) -> Self {
        Self { flags, node }
    }

    pub(crate) fn key(&self) -> Option<&str> {
        match &self.node {
            MountedNode::Element { element, .. } => element.key.as_deref(),
            MountedNode::Fragment { key, .. } => key.as_deref(),
            MountedNode::Thunk { thunk, .. } => thunk.key.as_deref(),
            _ => None,
        }
    }

    pub(crate) fn node_type(&self) -> NodeType<'_> {
        match &self.node {
            MountedNode::Static { tree, .. } => NodeType::Static(Rc::as_ptr(tree) as usize),
            MountedNode::Text { .. } => NodeType::Text,
            MountedNode::Element { element, .. } => NodeType::Element(&element.tag),
            MountedNode::Fragment { .. } => NodeType::Fragment,
            MountedNode::Thunk { thunk, .. } => NodeType::Thunk(&thunk.name),
        }
    }

    /// The DOM node this vnode owns directly, if it is not a group.
    pub(crate) fn dom(&self) -> Option<NodeId> {
        match &self.node {
            MountedNode::Static { dom, .. }
            | MountedNode::Text { dom, .. }
            | MountedNode::Element { dom, .. } => Some(*dom),
            MountedNode::Thunk { kept, .. } => *kept,
            MountedNode::Fragment { .. } => None,
        }
    }

    pub(crate) fn is_group(&self) -> bool {
        matches!(
            self.node,
            MountedNode::Fragment { .. } | MountedNode::Thunk { .. }
        )
    }

    /// Top-level DOM nodes in document order.
    pub(crate) fn collect_doms(&self, out: &mut Vec<NodeId>) {
        match &self.node {
            MountedNode::Fragment { children, .. } => collect_children(children, out),
            MountedNode::Thunk { kept: Some(dom), .. } => out.push(*dom),
            MountedNode::Thunk { children, .. } => collect_children(children, out),
            _ => out.extend(self.dom()),
        }
    }

    pub(crate) fn first_dom(&self) -> Option<NodeId> {
        match &self.node {
            MountedNode::Fragment { children, .. }
            | MountedNode::Thunk {
                children,
                kept: None,
                ..
            } => children.iter().flatten().find_map(Mounted::first_dom),
            _ => self.dom(),
        }
    }

    pub(crate) fn last_dom(&self) -> Option<NodeId> {
        match &self.node {
            MountedNode::Fragment { children, .. }
            | MountedNode::Thunk {
                children,
                kept: None,
                ..
            } => children.iter().rev().flatten().find_map(Mounted::last_dom),
            _ => self.dom(),
        }
    }

    fn any_flag(&self, flag: Flags) -> bool {
        if self.flags.contains(flag) {
            return true;
        }
        match &self.node {
            MountedNode::Element { children, .. }
            | MountedNode::Fragment { children, .. }
            | MountedNode::Thunk { children, .. } => {
                children.iter().flatten().any(|child| child.any_flag(flag))
            }
            _ => false,
        }
    }
}

pub(crate) fn collect_children(children: &[Option<Mounted>], out: &mut Vec<NodeId>) {
    for child in children.iter().flatten() {
        child.collect_doms(out);
    }
}

pub(crate) fn first_dom_of(children: &[Option<Mounted>]) -> Option<NodeId> {
    children.iter().flatten().find_map(Mounted::first_dom)
}

pub(crate) fn last_dom_of(children: &[Option<Mounted>]) -> Option<NodeId> {
    children.iter().rev().flatten().find_map(Mounted::last_dom)
}

/// Everything the reconciler keeps about one host's rendered content.
///
/// Returned by [`diff`](super::diff) and handed back on the next call.
#[derive(Default)]
pub struct DiffState {
    pub(crate) children: Vec<Option<Mounted>>,
}

impl DiffState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Top-level DOM nodes owned by this state, in document order.
    pub fn dom_nodes(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        collect_children(&self.children, &mut out);
        out
    }

    /// Whether nothing was rendered.
    pub fn is_empty(&self) -> bool {
        self.children.iter().all(Option::is_none)
    }

    /// Whether some subtree failed and must be re-rendered.
    pub fn is_dirty(&self) -> bool {
        self.children
            .iter()
            .flatten()
            .any(|child| child.any_flag(Flags::DIRTY))
    }

    /// Whether some subtree is suspended with its old DOM kept in place.
    pub fn is_suspended(&self) -> bool {
        self.children
            .iter()
            .flatten()
            .any(|child| child.any_flag(Flags::MODE_SUSPENDED))
    }
}

impl std::fmt::Debug for DiffState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffState")
            .field("dom_nodes", &self.dom_nodes())
            .field("dirty", &self.is_dirty())
            .field("suspended", &self.is_suspended())
            .finish()
    }
}
