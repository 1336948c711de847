//! Keyed Child Reconciliation
//!
//! Matching runs in one forward pass over the new children. Each new child
//! first looks at the old child under a running `skew` (how far the old
//! list has drifted from the new one), then searches outward from there,
//! alternating left and right. Skew tracks single insertions and removals,
//! so only children that actually moved are flagged for explicit placement
//! ([`Flags::INSERT_VNODE`]).
//!
//! After matching, unmatched old children are unmounted, then every new
//! child is diffed and placed relative to a DOM cursor.

use tracing::trace;

use super::diff::{Differ, Level};
use super::dom::NodeId;
use super::state::{Flags, Mounted};
use super::vnode::VNode;

/// Where a new child came from.
struct Slot {
    old_index: Option<usize>,
    flags: Flags,
}

impl Differ<'_> {
    /// Reconcile `new` against `old` under `level.parent`, starting at
    /// `cursor`. Returns the mounted children and the cursor after them.
    pub(super) fn diff_children(
        &mut self,
        level: &mut Level,
        new: Vec<VNode>,
        mut old: Vec<Option<Mounted>>,
        mut cursor: Option<NodeId>,
    ) -> (Vec<Option<Mounted>>, Option<NodeId>) {
        let slots = match_children(&new, &mut old);

        for entry in old.iter_mut() {
            let matched = entry
                .as_ref()
                .map_or(true, |old| old.flags.contains(Flags::MATCHED));
            if matched {
                continue;
            }
            let Some(stale) = entry.take() else {
                continue;
            };

            let mut doms = Vec::new();
            stale.collect_doms(&mut doms);
            if cursor.is_some_and(|at| doms.contains(&at)) {
                cursor = stale.last_dom().and_then(|dom| self.doc.next_sibling(dom));
            }
            self.unmount(stale, false);
        }

        let mut out = Vec::with_capacity(new.len());
        for (vnode, slot) in new.into_iter().zip(slots) {
            let Some(slot) = slot else {
                out.push(None);
                continue;
            };

            let previous = slot.old_index.and_then(|index| old[index].take()).map(|mut old| {
                old.flags.remove(Flags::MATCHED);
                old
            });

            let start = cursor;
            let (mounted, after) = self.diff_node(level, vnode, previous, cursor);

            cursor = if slot.flags.contains(Flags::INSERT_VNODE) {
                self.place(level.parent, &mounted, start)
            } else if mounted.is_group() {
                after
            } else {
                match mounted.dom() {
                    Some(dom) => self.doc.next_sibling(dom),
                    None => start,
                }
            };
            out.push(Some(mounted));
        }

        (out, cursor)
    }

    /// Move `mounted`'s DOM so it sits at `cursor`. Returns the cursor after it.
    fn place(&mut self, parent: NodeId, mounted: &Mounted, cursor: Option<NodeId>) -> Option<NodeId> {
        let mut doms = Vec::new();
        mounted.collect_doms(&mut doms);

        let mut cursor = cursor.filter(|&at| self.doc.parent(at) == Some(parent));
        for dom in doms {
            if Some(dom) != cursor {
                trace!(node = %dom, "placing node");
                self.doc.insert_before(parent, dom, cursor);
            }
            cursor = self.doc.next_sibling(dom);
        }
        cursor
    }

    /// Tear down a mounted subtree. Nested DOM is freed along with the
    /// top-level node that holds it.
    pub(super) fn unmount(&mut self, mounted: Mounted, skip_remove: bool) {
        use super::state::MountedNode;

        match mounted.node {
            MountedNode::Element {
                element,
                dom,
                children,
            } => {
                if element.is_custom() {
                    self.report.disconnected.push(dom);
                }
                for child in children.into_iter().flatten() {
                    self.unmount(child, true);
                }
                if !skip_remove {
                    self.doc.release(dom);
                }
            }
            MountedNode::Text { dom, .. } | MountedNode::Static { dom, .. } => {
                if !skip_remove {
                    self.doc.release(dom);
                }
            }
            MountedNode::Fragment { children, .. } => {
                for child in children.into_iter().flatten() {
                    self.unmount(child, skip_remove);
                }
            }
            MountedNode::Thunk { children, kept, .. } => {
                for child in children.into_iter().flatten() {
                    self.unmount(child, skip_remove);
                }
                if let Some(dom) = kept.filter(|_| !skip_remove) {
                    self.doc.release(dom);
                }
            }
        }
    }
}

/// Pair each new child with an old one, flagging matched old children
/// [`Flags::MATCHED`]. Empty new children get no slot.
fn match_children(new: &[VNode], old: &mut [Option<Mounted>]) -> Vec<Option<Slot>> {
    let old_len = old.len();
    let new_len = new.len();
    let mut remaining = old_len;
    let mut skew: isize = 0;
    let mut slots = Vec::with_capacity(new_len);

    for (i, vnode) in new.iter().enumerate() {
        if vnode.is_empty() {
            slots.push(None);
            continue;
        }

        let skewed = i as isize + skew;
        let matching = find_match(vnode, old, skewed, remaining);

        let mut claimed = None;
        if let Some(index) = matching {
            remaining = remaining.saturating_sub(1);
            if let Some(old) = old[index].as_mut() {
                old.flags.insert(Flags::MATCHED);
                claimed = Some(index);
            }
        }

        let mut flags = Flags::empty();
        match claimed {
            None => {
                // A brand new node: a length difference means one list has
                // an extra entry here.
                if matching.is_none() {
                    if new_len > old_len {
                        skew -= 1;
                    } else if new_len < old_len {
                        skew += 1;
                    }
                }
                if !vnode.is_group() {
                    flags |= Flags::INSERT_VNODE;
                }
            }
            Some(index) => {
                let index = index as isize;
                if index == skewed - 1 {
                    skew -= 1;
                } else if index == skewed + 1 {
                    skew += 1;
                } else if index != skewed {
                    if index > skewed {
                        skew -= 1;
                    } else {
                        skew += 1;
                    }
                    flags |= Flags::INSERT_VNODE;
                }
            }
        }

        slots.push(Some(Slot {
            old_index: claimed,
            flags,
        }));
    }

    slots
}

/// Find the old child `vnode` can reuse: same key and node type, not yet
/// matched. An unkeyed child also matches a hole at its skewed position.
fn find_match(vnode: &VNode, old: &[Option<Mounted>], skewed: isize, remaining: usize) -> Option<usize> {
    let key = vnode.key();
    let node_type = vnode.node_type();
    let is_match = |index: usize| {
        matches!(
            &old[index],
            Some(old) if !old.flags.contains(Flags::MATCHED)
                && old.key() == key
                && old.node_type() == node_type
        )
    };

    let len = old.len() as isize;
    let at = (0..len).contains(&skewed).then_some(skewed as usize);

    let mut available = false;
    if let Some(index) = at {
        if (old[index].is_none() && key.is_none()) || is_match(index) {
            return Some(index);
        }
        available = old[index]
            .as_ref()
            .is_some_and(|old| !old.flags.contains(Flags::MATCHED));
    }

    if remaining <= usize::from(available) {
        return None;
    }

    let mut x = skewed - 1;
    let mut y = skewed + 1;
    while x >= 0 || y < len {
        if x >= 0 {
            if x < len && is_match(x as usize) {
                return Some(x as usize);
            }
            x -= 1;
        }
        if y < len {
            if y >= 0 && is_match(y as usize) {
                return Some(y as usize);
            }
            y += 1;
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use crate::vdom::{diff, Document, DomOp, Element, NodeId, VNode};

    fn list(keys: &[&str]) -> VNode {
        Element::new("ul")
            .children(
                keys.iter()
                    .map(|key| Element::new("li").key(*key).child(*key)),
            )
            .into()
    }

    fn items(doc: &Document, ul: NodeId) -> Vec<String> {
        doc.children(ul)
            .iter()
            .map(|&li| doc.inner_html(li))
            .collect()
    }

    fn count(doc: &Document, pred: impl Fn(&DomOp) -> bool) -> usize {
        doc.journal().iter().filter(|op| pred(op)).count()
    }

    fn rerender(from: &[&str], to: &[&str]) -> (Document, NodeId, Vec<NodeId>) {
        let mut doc = Document::new();
        let host = doc.body();
        let first = diff(&mut doc, host, list(from), None);
        let ul = first.state.dom_nodes()[0];
        let before = doc.children(ul).to_vec();
        doc.clear_journal();

        diff(&mut doc, host, list(to), Some(first.state));
        assert_eq!(items(&doc, ul), to);
        (doc, ul, before)
    }

    #[test]
    fn moving_one_item_to_the_end_is_one_insert() {
        let (doc, _, _) = rerender(&["a", "b", "c", "d", "e"], &["a", "c", "d", "e", "b"]);

        assert_eq!(count(&doc, |op| matches!(op, DomOp::Insert { .. })), 1);
        assert_eq!(count(&doc, DomOp::is_create), 0);
    }

    #[test]
    fn removing_one_item_is_one_remove() {
        let (doc, ul, before) = rerender(&["a", "b", "c", "d", "e"], &["a", "b", "d", "e"]);

        assert_eq!(count(&doc, |op| matches!(op, DomOp::Remove { .. })), 1);
        assert_eq!(count(&doc, DomOp::is_create), 0);
        assert_eq!(count(&doc, |op| matches!(op, DomOp::Insert { .. })), 0);

        let kept: Vec<_> = before
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != 2)
            .map(|(_, &id)| id)
            .collect();
        assert_eq!(doc.children(ul), kept.as_slice());
    }

    #[test]
    fn prepending_creates_one_item() {
        let (doc, ul, before) = rerender(&["b", "c"], &["a", "b", "c"]);

        assert_eq!(count(&doc, |op| matches!(op, DomOp::CreateElement { .. })), 1);
        assert_eq!(&doc.children(ul)[1..], before.as_slice());
    }

    #[test]
    fn reversing_reuses_every_node() {
        let (doc, ul, before) = rerender(&["a", "b", "c"], &["c", "b", "a"]);

        assert_eq!(count(&doc, DomOp::is_create), 0);
        let mut reversed = before;
        reversed.reverse();
        assert_eq!(doc.children(ul), reversed.as_slice());
    }

    #[test]
    fn swapping_ends() {
        rerender(&["a", "b", "c", "d"], &["d", "b", "c", "a"]);
    }

    #[test]
    fn replacing_everything() {
        let (doc, _, _) = rerender(&["a", "b"], &["x", "y", "z"]);
        assert_eq!(count(&doc, |op| matches!(op, DomOp::Remove { .. })), 2);
    }

    #[test]
    fn clearing_and_refilling() {
        rerender(&["a", "b", "c"], &[]);
        rerender(&[], &["a", "b", "c"]);
    }

    #[test]
    fn holes_keep_positions() {
        let mut doc = Document::new();
        let host = doc.body();
        let with_hole = |middle: VNode| {
            VNode::from(
                Element::new("div")
                    .child("first")
                    .child(middle)
                    .child("last"),
            )
        };

        let first = diff(&mut doc, host, with_hole(VNode::Empty), None);
        assert_eq!(doc.inner_html(host), "<div>firstlast</div>");

        let second = diff(&mut doc, host, with_hole("middle".into()), Some(first.state));
        assert_eq!(doc.inner_html(host), "<div>firstmiddlelast</div>");

        diff(&mut doc, host, with_hole(VNode::Empty), Some(second.state));
        assert_eq!(doc.inner_html(host), "<div>firstlast</div>");
    }

    #[test]
    fn groups_move_as_a_unit() {
        let mut doc = Document::new();
        let host = doc.body();
        let render = |order: &[&str]| {
            VNode::fragment(order.iter().map(|key| VNode::keyed_group(*key, [format!("{key}1"), format!("{key}2")])))
        };

        let first = diff(&mut doc, host, render(&["a", "b"]), None);
        assert_eq!(doc.inner_html(host), "a1a2b1b2");

        diff(&mut doc, host, render(&["b", "a"]), Some(first.state));
        assert_eq!(doc.inner_html(host), "b1b2a1a2");
    }
}
