//! Trellis Core
//!
//! This crate provides the core runtime for the Trellis UI framework.
//! It implements:
//!
//! - Fine-grained reactive state (tracked objects, arrays, sets and maps)
//! - Effects with batched, re-entrancy safe flushing
//! - A keyed virtual DOM reconciler with suspense and error boundaries
//! - Components coordinated into depth-first tree renders
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: Dependency graph storage (targets, keys, edges)
//! - `reactive`: Tracked values, effects, and the flush scheduler
//! - `vdom`: Virtual nodes, the in-memory document, and the diff engine
//! - `template`: Compiled templates and slot resolution
//! - `component`: Component definitions, instances, and render coordination
//!
//! # Example
//!
//! ```rust
//! use trellis_core::reactive::{create_effect, reactive, run_microtasks, Value};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let state = reactive(Value::object([("count", Value::from(0))]));
//! let seen = Rc::new(RefCell::new(Vec::new()));
//!
//! let log = seen.clone();
//! let reader = state.clone();
//! let _effect = create_effect(move || log.borrow_mut().push(reader.get("count")));
//!
//! state.as_object().unwrap().set("count", 1);
//! run_microtasks();
//!
//! assert_eq!(*seen.borrow(), vec![Value::from(0), Value::from(1)]);
//! ```

pub mod component;
pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;
pub mod template;
pub mod vdom;

pub use component::{App, Component, ComponentDef, View};
pub use config::RuntimeConfig;
pub use error::{Error, RenderError, Result, Suspension, TemplateError};
pub use reactive::{create_effect, flush_effects, reactive, untracked, Effect, Value};
pub use template::{Html, Slot, Template};
pub use vdom::{diff, Document, Element, NodeId, VNode};
