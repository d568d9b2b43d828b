//! # trellis-ui
//!
//! Declarative UI rendering core for Rust.
//!
//! Applications describe interfaces as trees of lightweight
//! [`Element`] descriptors (tag + props + children). The crate keeps a
//! persistent shadow tree of *views* behind each render container,
//! drives user-supplied component logic to produce child elements, and
//! reconciles the result against the previously committed tree so the
//! output medium is mutated as little as possible.
//!
//! ## Architecture
//!
//! ```text
//! render(element, container)
//!   └─ RootView ── reconcile ──▶ ComponentView / IntrinsicView / text
//!                                    │ (recursively, per child slot)
//!   commit ◀── flattened node lists ─┘
//! ```
//!
//! Reconciliation walks down the tree building and updating views;
//! commit flows back up, each view collapsing its children into a flat
//! list of renderable leaves until the root splices them into the
//! container.
//!
//! Components come in four shapes - plain functions, async functions,
//! stateful iterators, and stateful async iterators - built through the
//! [`Component`] constructors. Asynchronous updates run on a
//! thread-local cooperative scheduler pumped by [`flush`].
//!
//! ## Modules
//!
//! - [`element`] - element descriptors, props, the `create_element`/`h` factory
//! - [`component`] - component shapes, the controller, the iterator protocol
//! - [`view`] - the shadow tree: reconciliation, commit, lifecycle
//! - [`dom`] - the default output medium, an in-memory browser-style DOM
//! - [`schedule`] - the cooperative scheduler behind async updates
//! - [`error`] - the failure taxonomy
//!
//! ## Example
//!
//! ```ignore
//! use trellis_ui::{h, render, NodeRef, Props};
//!
//! let body = NodeRef::container("body");
//! render(
//!     h("div", Props::new(), h("h1", Props::new(), "Hello world")),
//!     &body,
//! )?;
//! assert_eq!(body.inner_html(), "<div><h1>Hello world</h1></div>");
//! ```

pub mod component;
pub mod dom;
pub mod element;
pub mod error;
pub mod schedule;
pub mod view;

// Re-export commonly used items
pub use component::{
    AsyncRenderIter, Component, Controller, PropsIter, PropsStream, RenderIter, Rendered,
};

pub use dom::{take_mutations, Mutation, NodeRef, OutputNode, WeakNodeRef};

pub use element::{create_element, h, Child, Children, Element, PropValue, Props, Tag};

pub use error::{RenderError, RenderResult};

pub use schedule::flush;

pub use view::intrinsic::{
    register_intrinsic, IntrinsicController, IntrinsicDriver, IntrinsicFactory, IntrinsicProps,
    Snapshots,
};

pub use view::root::{render, RenderOutcome, RootHandle};

pub use view::Pending;
