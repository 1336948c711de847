//! Components
//!
//! Components tie the reactive system to the virtual DOM. A definition
//! ([`ComponentDef`]) is registered under a custom element tag; whenever an
//! element with that tag is connected, [`App`] creates a [`Component`] for
//! it, starts its render effect and links it under the nearest component
//! ancestor in the document.
//!
//! Rendering is coordinated per tree rather than per component. See
//! [`coordinator`](self::App::schedule_coordinated_render) for the protocol.

mod coordinator;
mod descriptor;
mod host;

pub use coordinator::{App, Disposer};
pub use descriptor::{
    is_valid_tag_name, ComponentDef, ErrorHook, Hook, Method, Renderer, StateFactory, View,
};
pub use host::{Component, DEFAULT_SLOT};
