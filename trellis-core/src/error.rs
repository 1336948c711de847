//! Error Types
//!
//! Errors are split by where they surface:
//!
//! - [`Error`]: returned from the public runtime API (flush, components).
//! - [`RenderError`]: produced while turning a render function's output into
//!   a vnode tree, and funneled through error boundaries.
//! - [`TemplateError`]: operation-tree decoding and slot resolution.

use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::vdom::NodeId;

/// Result alias for the crate-level error.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error("flush exceeded {limit} iterations, discarded {discarded} pending effects")]
    FlushLimitExceeded { limit: usize, discarded: usize },

    #[error("invalid runtime configuration: {0}")]
    Config(#[source] serde_json::Error),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("component `{component}` failed to render: {source}")]
    Render {
        component: String,
        #[source]
        source: RenderError,
    },

    #[error("`{0}` is not a valid custom element name")]
    InvalidTagName(String),

    #[error("a component is already registered for `{0}`")]
    AlreadyDefined(String),

    #[error("no component registered for `{0}`")]
    UnknownComponent(String),

    #[error("component `{component}` has no method `{method}`")]
    UnknownMethod { component: String, method: String },

    #[error("node {0} is not a mounted component host")]
    NotMounted(NodeId),

    #[error("node {0} does not exist in the document")]
    MissingNode(NodeId),
}

/// A pending async dependency raised by a render.
///
/// This is what a render returns instead of content when part of its input
/// is not available yet. Diffing treats it as "leave the current DOM alone
/// and try again later".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suspension {
    reason: Rc<str>,
}

impl Suspension {
    pub fn new(reason: impl AsRef<str>) -> Self {
        Self {
            reason: Rc::from(reason.as_ref()),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for Suspension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

/// Error raised while producing a vnode tree.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("render suspended: {0}")]
    Suspended(Suspension),

    #[error("{0}")]
    Failed(Rc<str>),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

impl RenderError {
    pub fn failed(message: impl AsRef<str>) -> Self {
        Self::Failed(Rc::from(message.as_ref()))
    }

    pub fn suspended(reason: impl AsRef<str>) -> Self {
        Self::Suspended(Suspension::new(reason))
    }

    /// Whether this error is a suspension rather than a failure.
    pub fn is_suspension(&self) -> bool {
        matches!(self, Self::Suspended(_))
    }
}

/// Error raised by the template contract.
#[derive(Debug, Clone, Error)]
pub enum TemplateError {
    #[error("invalid template operation tree: {0}")]
    Decode(Rc<str>),

    #[error("slot {index} is out of range ({len} values supplied)")]
    MissingSlot { index: usize, len: usize },

    #[error("slot {index} must hold {expected}")]
    SlotKind { index: usize, expected: &'static str },
}

impl From<serde_json::Error> for TemplateError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(Rc::from(err.to_string()))
    }
}
