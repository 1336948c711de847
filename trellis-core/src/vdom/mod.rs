//! Virtual DOM
//!
//! Render functions describe content as [`VNode`] trees. [`diff`] compares a
//! new tree with the [`DiffState`] left by the previous pass and applies the
//! minimal set of mutations to a [`Document`].
//!
//! The document is an in-memory arena that records every mutation in a
//! journal ([`DomOp`]), so a host can replay the operations onto a real DOM
//! and tests can assert on exactly what changed.

mod children;
mod diff;
mod dom;
mod state;
mod vnode;

pub use diff::{diff, hydrate, unmount, DiffOutcome, DiffReport};
pub use dom::{Document, DomOp, Event, NodeId};
pub use state::{DiffState, Flags};
pub use vnode::{AttrValue, CatchFn, Element, Fragment, Handler, RenderFn, StaticTree, Thunk, VNode};

pub(crate) use vnode::is_custom_tag;
